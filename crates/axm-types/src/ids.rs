//! Identifier newtypes
//!
//! Every entity is keyed by a UUID. The newtypes keep a run id from being
//! passed where a task id is expected.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a random (v4) identifier
            #[inline]
            #[must_use]
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Underlying UUID
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|e| {
                    ValidationError::new($field, format!("malformed uuid '{s}': {e}"))
                        .with_hint("expected a hyphenated UUID such as 3f2b8c1e-0c4a-4f7e-9a57-2d0c5b1e9f10")
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Agent profile identifier
    ProfileId,
    "agentProfileId"
);
uuid_id!(
    /// Task identifier
    TaskId,
    "taskId"
);
uuid_id!(
    /// Run identifier
    RunId,
    "runId"
);
uuid_id!(
    /// Run event identifier
    EventId,
    "eventId"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_display() {
        let raw = "3f2b8c1e-0c4a-4f7e-9a57-2d0c5b1e9f10";
        let id: RunId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn malformed_id_reports_field() {
        let err = "not-a-uuid".parse::<TaskId>().unwrap_err();
        assert_eq!(err.field, "taskId");
        assert!(err.hint.is_some());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ProfileId::new_v4();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
