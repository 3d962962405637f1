//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Lifecycle state of a probe session.
///
/// ```text
/// Launching ──▶ AwaitingPrompt ──▶ PromptSeen
///                     │                 │
///                     └──▶ Finalizing ◀─┘
/// ```
///
/// `PromptSeen` is entered at most once, and only the session timeout leads
/// to `Finalizing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// PTY pair is being created and the child spawned
    #[default]
    Launching,
    /// Child is running; no recognition pattern seen yet
    AwaitingPrompt,
    /// A pattern matched and the command has been injected
    PromptSeen,
    /// Timeout elapsed; dumping output and killing the child
    Finalizing,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Launching, AwaitingPrompt)
                | (AwaitingPrompt, PromptSeen)
                | (AwaitingPrompt, Finalizing)
                | (PromptSeen, Finalizing)
        )
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if self.can_advance_to(next) {
            debug!("Session state: {:?} → {:?}", self, next);
            *self = next;
            true
        } else {
            warn!("Rejected session transition: {:?} → {:?}", self, next);
            false
        }
    }

    /// Whether the session has reached its terminal state.
    pub fn is_terminal(self) -> bool {
        self == SessionState::Finalizing
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Launching => "launching",
            SessionState::AwaitingPrompt => "awaiting-prompt",
            SessionState::PromptSeen => "prompt-seen",
            SessionState::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}
