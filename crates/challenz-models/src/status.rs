use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Declares a lowercase string enum stored verbatim in the `status` column.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let normalized = raw.trim().to_ascii_lowercase();
                match normalized.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: raw.to_string(),
                        expected: Self::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    }),
                }
            }
        }
    };
}

pub(crate) use string_enum;

string_enum!(
    /// Moderation state of a platform account.
    UserStatus, "user status", {
        Active => "active",
        Suspended => "suspended",
        Banned => "banned",
    }
);

string_enum!(
    ChallengeStatus, "challenge status", {
        Draft => "draft",
        Active => "active",
        Completed => "completed",
        Archived => "archived",
    }
);

string_enum!(
    /// Lifecycle of a time-boxed discount on a single product.
    FlashSaleStatus, "flash sale status", {
        Scheduled => "scheduled",
        Live => "live",
        Ended => "ended",
        Cancelled => "cancelled",
    }
);

string_enum!(
    ReturnStatus, "return status", {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Refunded => "refunded",
    }
);

string_enum!(
    ReportStatus, "report status", {
        Open => "open",
        Reviewing => "reviewing",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Suspended".parse::<UserStatus>(), Ok(UserStatus::Suspended));
        assert_eq!(" live ".parse::<FlashSaleStatus>(), Ok(FlashSaleStatus::Live));
    }

    #[test]
    fn unknown_value_lists_expected_variants() {
        let err = "deleted".parse::<ReturnStatus>().unwrap_err();
        assert_eq!(err.kind, "return status");
        assert_eq!(err.value, "deleted");
        assert_eq!(err.expected, "pending, approved, rejected, refunded");
    }

    #[test]
    fn serializes_as_stored_text() {
        let json = serde_json::to_value(ReportStatus::Reviewing).unwrap();
        assert_eq!(json, serde_json::json!("reviewing"));
    }
}
