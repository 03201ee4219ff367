//! Log-and-drop helpers.
//!
//! A few failures must never change a saga's outcome: a notification sink
//! that errors, the best-effort FAILED write after a fatal stage, a summary
//! that cannot be serialized. These are logged at the call site with the
//! caller's source location and then passed through untouched, so the caller
//! can still fall back (`unwrap_or_else`) or discard them (`let _ =`).

use std::fmt::Display;
use std::panic::Location;

fn location(caller: &Location<'_>) -> String {
    format!("{}:{}", caller.file(), caller.line())
}

/// Log the error of a `Result` without consuming it.
pub trait ResultExt<T, E> {
    /// `context` names what was being attempted, e.g. `"recording failed status"`.
    ///
    /// ```ignore
    /// let _ = store.upsert(&account_id, &patch).await.log("recording failed status");
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            tracing::error!(
                target: "termination_saga",
                error = %e,
                at = %location(Location::caller()),
                context = %context.to_string(),
                "Dropped error"
            );
        }
        self
    }
}

/// Warn when a value the saga expected is absent.
pub trait OptionResultExt<T> {
    /// Used where a successful stage returned no payload.
    fn log_none<S: ToString>(self, context: S) -> Option<T>;
}

impl<T> OptionResultExt<T> for Option<T> {
    #[track_caller]
    fn log_none<S: ToString>(self, context: S) -> Option<T> {
        if self.is_none() {
            tracing::warn!(
                target: "termination_saga",
                at = %location(Location::caller()),
                context = %context.to_string(),
                "Missing value"
            );
        }
        self
    }
}
