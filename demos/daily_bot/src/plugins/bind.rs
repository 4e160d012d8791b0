//! Binds a 9-digit game UID to a chat user over a short conversation.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use switchyard::prelude::*;
use tracing::info;

#[derive(Debug, Default)]
pub struct Bind {
    uids: Mutex<HashMap<i64, u64>>,
}

#[triggers]
impl Bind {
    #[command("bind", entry)]
    async fn start(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        info!(user = ?update.sender_id(), "waiting for UID");
        Ok(Flow::goto("UID"))
    }

    #[text(r"^\d{9}$", state = "UID")]
    async fn uid(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        let user = update.sender_id().ok_or("binding needs a known sender")?;
        let uid: u64 = update.text().unwrap_or_default().parse()?;
        self.uids.lock().insert(user, uid);
        info!(user, uid, "UID bound");
        Ok(Flow::End)
    }

    #[text(r"^[^/]", state = "UID")]
    async fn retry(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
        info!("not a UID, expecting 9 digits");
        Ok(Flow::Continue)
    }

    #[shared(cancel_descriptor())]
    async fn cancel(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        info!(user = ?update.sender_id(), "binding cancelled");
        Ok(Flow::End)
    }

    #[command("whoami")]
    async fn whoami(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        let user = update.sender_id().ok_or("whoami needs a known sender")?;
        let uid = self.uids.lock().get(&user).copied();
        info!(user, ?uid, "whoami");
        Ok(Flow::Continue)
    }
}

impl Plugin for Bind {
    const NAME: &'static str = "bind";

    fn conversation() -> Option<ConversationOptions> {
        Some(
            ConversationOptions::new()
                .name("bind-uid")
                .idle_timeout(Duration::from_secs(300)),
        )
    }
}

register_plugin!(Bind);
