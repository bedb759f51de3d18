//! Identifiers minted by the chat pipeline.
//!
//! Ids are ULIDs rendered with a short type prefix (`msg_01J...`), so they
//! sort by creation time and say what they name. They are only ever minted
//! here; ids that arrive from clients stay opaque strings.

use serde::{Serialize, Serializer};
use std::fmt;
use ulid::Ulid;

macro_rules! prefixed_id {
    ($(#[$meta:meta])* $name:ident = $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Ulid);

        impl $name {
            /// Mints a fresh id.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        // On the wire an id is its prefixed display form.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
    };
}

prefixed_id!(
    /// An assistant message produced by a chat run.
    MessageId = "msg"
);

prefixed_id!(
    /// One orchestration run of the chat pipeline.
    ChatRunId = "chat"
);
