//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │     Loading     │ (initial)
//! └───┬─────────┬───┘
//!     │         │ NothingStored / LoggedOut
//!     │         ▼
//!     │   ┌─────────────────┐
//!     │   │ Unauthenticated │ ◄──────────┐
//!     │   └────────┬────────┘            │
//!     │            │ LoginSucceeded      │ LoggedOut
//!     │ Restored / ▼                     │
//!     │ Login ┌─────────────────┐        │
//!     └──────►│  Authenticated  │────────┘
//!             └─────────────────┘
//!               ▲   │ TokensRefreshed / LoginSucceeded
//!               └───┘
//! ```

use credential_store::{Tokens, User};
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::fmt;

// Generates `session_machine::{State, Input, StateMachine}`.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Loading)

    Loading => {
        Restored => Authenticated,
        NothingStored => Unauthenticated,
        LoginSucceeded => Authenticated,
        LoggedOut => Unauthenticated
    },
    Unauthenticated => {
        LoginSucceeded => Authenticated,
        LoggedOut => Unauthenticated
    },
    Authenticated => {
        // Re-login replaces the user and tokens wholesale
        LoginSucceeded => Authenticated,
        TokensRefreshed => Authenticated,
        LoggedOut => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session status exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Persisted credentials have not been restored yet.
    Loading,
    Unauthenticated,
    Authenticated,
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Loading => "loading",
            SessionStatus::Unauthenticated => "unauthenticated",
            SessionStatus::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SessionMachineState> for SessionStatus {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Loading => SessionStatus::Loading,
            SessionMachineState::Unauthenticated => SessionStatus::Unauthenticated,
            SessionMachineState::Authenticated => SessionStatus::Authenticated,
        }
    }
}

/// Consistent copy of the session's status, user, and tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip)]
    pub tokens: Option<Tokens>,
}

impl SessionSnapshot {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(User::subject)
    }

    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().and_then(User::email)
    }

    /// Access token expiry (unix seconds), if known.
    pub fn expires_at(&self) -> Option<i64> {
        self.tokens.as_ref().and_then(|tokens| tokens.expires_at)
    }
}
