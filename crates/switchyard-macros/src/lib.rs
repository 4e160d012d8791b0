//! Procedural macros for the Switchyard bot framework.
//!
//! This crate provides:
//!
//! - `#[triggers]` - Turns marker attributes on methods into a `Declare` impl
//!
//! ```rust,ignore
//! use switchyard::prelude::*;
//!
//! #[derive(Default)]
//! struct Bind;
//!
//! #[triggers]
//! impl Bind {
//!     #[command("bind", entry)]
//!     async fn start(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
//!         Ok(Flow::goto("UID"))
//!     }
//!
//!     #[text(r"^\d{9}$", state = "UID")]
//!     async fn uid(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
//!         Ok(Flow::End)
//!     }
//!
//!     #[shared(cancel_descriptor())]
//!     async fn cancel(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
//!         Ok(Flow::End)
//!     }
//! }
//! ```

mod triggers;

use proc_macro::TokenStream;
use syn::{ItemImpl, parse_macro_input};

/// Generates `impl Declare` from method-level marker attributes.
///
/// # Attributes
///
/// - `#[command("name")]`, `#[text("regex")]`, `#[callback("regex")]`
/// - `#[membership(joined | left | any)]`, `#[inline_query]`, `#[catch_all]`
/// - `#[shared(expr)]` - mark with a shared `Arc<TriggerDescriptor>`
/// - `#[on_error]` - error interceptor
/// - `#[job(...)]` - scheduled job
///
/// Trigger attributes accept `entry`, `fallback` (or `role = entry` /
/// `role = fallback`), `state = "KEY"`, `admin` and `block = bool`. Any other
/// `key = value` pair becomes a descriptor option. Several attributes on one
/// method accumulate.
///
/// Generated paths default to `::switchyard::core`; crates depending on
/// `switchyard-core` directly can write `#[triggers(crate = ::switchyard_core)]`.
#[proc_macro_attribute]
pub fn triggers(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as triggers::TriggersArgs);
    let item = parse_macro_input!(item as ItemImpl);

    match triggers::expand(args, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
