//! Process-unique identifiers.
//!
//! Dispatch tables and schedulers compare entries by identity; these ids
//! give every materialised object one without relying on pointer values.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $prefix:literal) => {
        static $counter: AtomicU64 = AtomicU64::new(1);

        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Allocates the next id.
            pub fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identity of one materialised dispatch or error entry.
    EntryId,
    NEXT_ENTRY_ID,
    "entry"
);

define_id!(
    /// Identity of one scheduled job.
    JobId,
    NEXT_JOB_ID,
    "job"
);

define_id!(
    /// Identity of one live plugin instance. Derives its dispatch group.
    InstanceId,
    NEXT_INSTANCE_ID,
    "instance"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = EntryId::next();
        let b = EntryId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert!(InstanceId::next().to_string().starts_with("instance#"));
    }
}
