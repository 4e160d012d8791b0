//! Daily Bot Example
//!
//! Three plugins registered through the catalog:
//!
//! - `sign`: `/sign`, `/points`, admin-only `/reset_sign`, and a midnight reset job
//! - `bind`: a `/bind` conversation asking for a 9-digit UID, abortable with `/cancel`
//! - `audit`: a catch-all observer and an error interceptor
//!
//! There is no chat platform behind it; a scripted batch of updates is fed
//! straight into an in-memory dispatch table.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package daily-bot -- --config demos/daily_bot/switchyard.toml
//! cargo run --package daily-bot -- --wait   # keep jobs running until Ctrl+C
//! ```

mod plugins;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use switchyard::core::ChatKind;
use switchyard::prelude::*;
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "daily-bot", about = "Switchyard demo bot")]
struct Args {
    /// Configuration file; defaults to searching for `switchyard.toml`.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,

    /// Keep running after the script until Ctrl+C.
    #[arg(long)]
    wait: bool,
}

const GROUP: i64 = -100_200;

fn script() -> Vec<Update> {
    vec![
        Update::message("/sign").with_chat(GROUP, ChatKind::Group).with_sender(1, false),
        Update::message("/sign").with_chat(GROUP, ChatKind::Group).with_sender(1, false),
        Update::callback("sign:button").with_chat(GROUP, ChatKind::Group).with_sender(2, false),
        Update::message("/points").with_sender(1, false),
        Update::message("/bind").with_sender(3, false),
        Update::message("hello").with_sender(3, false),
        Update::message("123456789").with_sender(3, false),
        Update::message("/whoami").with_sender(3, false),
        Update::message("/bind").with_sender(4, false),
        Update::message("/cancel").with_sender(4, false),
        Update::message("/sign"),
        Update::message("/reset_sign").with_sender(1, false),
        Update::message("/reset_sign").with_sender(9, true),
        Update::message("good morning").with_chat(GROUP, ChatKind::Group).with_sender(5, false),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = Runtime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }

    let table = Arc::new(MemoryDispatchTable::new());
    let runtime = builder.build(table.clone())?;
    info!(plugins = ?runtime.plugin_names(), "daily bot created");

    runtime.start().await?;
    info!(
        entries = table.entry_count(),
        error_entries = table.error_count(),
        groups = table.groups().len(),
        "plugins installed"
    );

    for update in script() {
        let text = update.text().map(str::to_owned);
        let handled = table.dispatch(update).await;
        debug!(?text, handled, "update dispatched");
    }

    runtime.reload("sign").await?;

    if args.wait {
        runtime.run().await?;
    } else {
        runtime.shutdown().await?;
    }
    Ok(())
}
