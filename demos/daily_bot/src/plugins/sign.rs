//! Daily sign-in with points.
//!
//! ```toml
//! [plugins.sign]
//! reward = 10
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use switchyard::prelude::*;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SignConfig {
    reward: u32,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self { reward: 5 }
    }
}

#[derive(Debug, Default)]
pub struct Sign {
    reward: AtomicU32,
    signed_today: Mutex<HashSet<i64>>,
    points: Mutex<HashMap<i64, u32>>,
}

#[triggers]
impl Sign {
    #[command("sign")]
    #[callback("^sign:")]
    async fn sign(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        let user = update
            .sender_id()
            .ok_or("sign-in needs a known sender")?;

        if !self.signed_today.lock().insert(user) {
            info!(user, "already signed in today");
            return Ok(Flow::Continue);
        }

        let reward = self.reward.load(Ordering::Relaxed);
        let total = {
            let mut points = self.points.lock();
            let total = points.entry(user).or_default();
            *total += reward;
            *total
        };
        info!(user, reward, total, "signed in");
        Ok(Flow::Continue)
    }

    #[command("points")]
    async fn points(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        let user = update.sender_id().ok_or("points needs a known sender")?;
        let total = self.points.lock().get(&user).copied().unwrap_or_default();
        info!(user, total, "points");
        Ok(Flow::Continue)
    }

    #[command("reset_sign", admin)]
    async fn force_reset(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        let cleared = self.clear();
        info!(admin = ?update.sender_id(), cleared, "sign-in reset by admin");
        Ok(Flow::Continue)
    }

    #[job(daily = "00:00", name = "sign.reset")]
    async fn midnight(self: Arc<Self>, ctx: JobContext) -> Result<(), BoxError> {
        let cleared = self.clear();
        info!(job = %ctx.name, cleared, "daily sign-in reset");
        Ok(())
    }

    fn clear(&self) -> usize {
        let mut signed = self.signed_today.lock();
        let cleared = signed.len();
        signed.clear();
        cleared
    }
}

#[async_trait]
impl Plugin for Sign {
    const NAME: &'static str = "sign";

    async fn initialize(&self, ctx: &LoadContext) -> Result<(), BoxError> {
        let config: SignConfig = ctx.config();
        self.reward.store(config.reward, Ordering::Relaxed);
        info!(reward = config.reward, "sign plugin ready");
        Ok(())
    }

    async fn release(&self) -> Result<(), BoxError> {
        self.clear();
        Ok(())
    }
}

register_plugin!(Sign);
