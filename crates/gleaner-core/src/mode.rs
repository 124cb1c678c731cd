//! Operating modes and the per-key skip/fetch/overwrite decision.
//!
//! This module is pure business logic: it never touches a store. The
//! orchestrator gathers a [`StoreState`] and acts on the returned
//! [`Resolution`].

use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// How a harvest run treats keys that already have results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Fetch only keys with no result, snapshot or ledger entry.
    #[default]
    Append,
    /// Re-fetch keys with results and replace their rows.
    Overwrite,
    /// Clear every store, then behave as `Append`.
    Scratch,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::Scratch => write!(f, "scratch"),
        }
    }
}

impl FromStr for Mode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "overwrite" => Ok(Self::Overwrite),
            "scratch" => Ok(Self::Scratch),
            _ => Err(AppError::Generic(format!(
                "Unknown mode: '{}'. Valid options: append, overwrite, scratch",
                s
            ))),
        }
    }
}

/// Presence of one key in each of the three stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreState {
    pub in_results: bool,
    pub in_snapshots: bool,
    pub in_ledger: bool,
}

/// What to do with one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    Fetch,
    /// Fetch, then replace the existing row for the key.
    FetchAndReplace,
}

/// Decision for a key, with the side effect the orchestrator must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub action: Action,
    /// A snapshot exists for a ledgered key and must be removed.
    pub delete_snapshot: bool,
    /// Human-readable reason for the decision.
    pub reason: &'static str,
}

/// Decides the action for one key from its store state.
///
/// Ledgered keys are skipped in every mode; their snapshot, if any, is
/// flagged for deletion.
pub fn resolve(mode: Mode, state: &StoreState) -> Resolution {
    if state.in_ledger {
        return Resolution {
            action: Action::Skip,
            delete_snapshot: state.in_snapshots,
            reason: "previously failed",
        };
    }

    match mode {
        Mode::Append | Mode::Scratch => {
            if state.in_results || state.in_snapshots {
                Resolution {
                    action: Action::Skip,
                    delete_snapshot: false,
                    reason: "already harvested",
                }
            } else {
                Resolution {
                    action: Action::Fetch,
                    delete_snapshot: false,
                    reason: "new key",
                }
            }
        }
        Mode::Overwrite => Resolution {
            action: Action::FetchAndReplace,
            delete_snapshot: false,
            reason: if state.in_results {
                "overwriting existing result"
            } else {
                "new key"
            },
        },
    }
}
