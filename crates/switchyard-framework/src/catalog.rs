//! Process-wide catalog of plugin types.
//!
//! Plugins register themselves next to their definition with
//! [`register_plugin!`](crate::register_plugin); bootstrap walks the catalog
//! once with [`all`]. The backing store is a `linkme` distributed slice, so
//! no central list has to know every plugin in advance.
//!
//! ```rust,ignore
//! register_plugin!(Sign);                 // uses `Sign::default()`
//! register_plugin!(Daily, Daily::new);    // custom constructor
//! ```

use std::collections::HashSet;

use linkme::distributed_slice;
use tracing::warn;

use crate::host::{HostSetup, Lifecycle};

/// Builds a host for one concrete plugin type.
pub type CreateFn = fn(HostSetup) -> Box<dyn Lifecycle>;

/// One catalog entry.
#[derive(Clone, Copy)]
pub struct PluginFactory {
    pub name: &'static str,
    pub create: CreateFn,
}

impl PluginFactory {
    pub fn create(&self, setup: HostSetup) -> Box<dyn Lifecycle> {
        (self.create)(setup)
    }
}

impl std::fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFactory").field("name", &self.name).finish()
    }
}

/// Every factory contributed with `register_plugin!`, in link order.
#[distributed_slice]
pub static PLUGIN_CATALOG: [PluginFactory];

/// Registered plugins, one per name.
///
/// A name registered twice is reported and only its first registration is
/// kept.
pub fn all() -> Vec<&'static PluginFactory> {
    let mut seen = HashSet::new();
    PLUGIN_CATALOG
        .iter()
        .filter(|factory| {
            let fresh = seen.insert(factory.name);
            if !fresh {
                warn!(plugin = factory.name, "duplicate plugin registration ignored");
            }
            fresh
        })
        .collect()
}

/// Looks up a registered plugin by name.
pub fn find(name: &str) -> Option<&'static PluginFactory> {
    PLUGIN_CATALOG.iter().find(|factory| factory.name == name)
}

/// Adds a plugin type to the catalog.
///
/// The one-argument form builds the plugin with `Default::default()`; the
/// two-argument form takes a constructor `fn() -> T`.
#[macro_export]
macro_rules! register_plugin {
    ($ty:ty) => {
        $crate::register_plugin!($ty, <$ty as ::core::default::Default>::default);
    };
    ($ty:ty, $ctor:expr) => {
        const _: () = {
            #[$crate::__linkme::distributed_slice($crate::catalog::PLUGIN_CATALOG)]
            #[linkme(crate = $crate::__linkme)]
            static FACTORY: $crate::catalog::PluginFactory = $crate::catalog::PluginFactory {
                name: <$ty as $crate::Plugin>::NAME,
                create: |setup| {
                    ::std::boxed::Box::new($crate::PluginHost::<$ty>::from_setup(($ctor)(), setup))
                },
            };
        };
    };
}
