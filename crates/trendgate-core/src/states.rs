use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            #[must_use]
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

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Confidence tier derived from TCS and supporting-signal count.
    ///
    /// Variants are declared low to high so `Ord` follows confidence.
    Tier, "tier", {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

impl PartialOrd for Tier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

string_enum!(
    /// Lifecycle of an approval record. `Approved` and `Rejected` are terminal.
    ApprovalState, "approval state", {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

impl ApprovalState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalState::Pending)
    }
}

string_enum!(
    RunStatus, "run status", {
        Running => "running",
        Success => "success",
        Failed => "failed",
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Per-adapter outcome inside one collection run.
    SourceStatus, "source status", {
        Ok => "ok",
        Unavailable => "unavailable",
        RateLimited => "rate_limited",
        Skipped => "skipped",
    }
);
