//! Session executor abstraction and account model.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::Failure;

/// One roster entry. Opaque to the scheduler beyond its identifier.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier (typically a login name).
    pub identifier: String,
    /// Secret passed through to the executor untouched.
    pub credential: String,
}

impl Account {
    /// Create an account.
    pub fn new(identifier: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            credential: credential.into(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("identifier", &self.identifier)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// What the executor should do with the remote switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Inspect and turn the switch on when it is off.
    #[default]
    Toggle,
    /// Inspect only.
    CheckOnly,
}

impl RunMode {
    /// Lowercase name passed to external programs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::CheckOnly => "check_only",
        }
    }
}

/// Successful session result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Switch state after the session.
    pub enabled: bool,
    /// The session changed the switch.
    pub changed: bool,
}

/// Performs the per-account session task.
///
/// Implementations must be safe to call again after a failure and must
/// release their resources when the returned future is dropped, because
/// attempts that exceed their deadline are cancelled that way.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use roster_scheduler::core::{Account, Failure, RunMode, SessionExecutor, SessionOutcome};
///
/// struct AlwaysOn;
///
/// #[async_trait]
/// impl SessionExecutor for AlwaysOn {
///     async fn run(&self, _account: &Account, _mode: RunMode) -> Result<SessionOutcome, Failure> {
///         Ok(SessionOutcome { enabled: true, changed: false })
///     }
/// }
/// ```
#[async_trait]
pub trait SessionExecutor: Send + Sync + 'static {
    /// Run one session for `account`.
    ///
    /// # Errors
    ///
    /// Returns a [`Failure`] describing what went wrong; it is classified
    /// and possibly retried by the caller.
    async fn run(&self, account: &Account, mode: RunMode) -> Result<SessionOutcome, Failure>;

    /// Release shared resources at shutdown.
    async fn close(&self) {}
}
