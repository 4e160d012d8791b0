//! Observes unhandled updates and handler failures.

use std::sync::atomic::{AtomicUsize, Ordering};

use switchyard::prelude::*;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct Audit {
    unhandled: AtomicUsize,
    failures: AtomicUsize,
}

#[triggers]
impl Audit {
    #[catch_all(block = false)]
    async fn observe(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
        self.unhandled.fetch_add(1, Ordering::Relaxed);
        debug!(chat = ?update.chat_id(), text = ?update.text(), "unhandled update");
        Ok(Flow::Continue)
    }

    #[on_error]
    async fn on_error(self: Arc<Self>, report: Arc<ErrorReport>) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(plugin = report.plugin, error = %report.error, "handler failed");
    }

    #[job(repeating = 3600, name = "audit.summary")]
    async fn summary(self: Arc<Self>, _ctx: JobContext) -> Result<(), BoxError> {
        self.log_summary();
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            unhandled = self.unhandled.load(Ordering::Relaxed),
            failures = self.failures.load(Ordering::Relaxed),
            "audit summary"
        );
    }
}

#[async_trait]
impl Plugin for Audit {
    const NAME: &'static str = "audit";

    async fn release(&self) -> Result<(), BoxError> {
        self.log_summary();
        Ok(())
    }
}

register_plugin!(Audit);
