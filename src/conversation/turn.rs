use serde::Serialize;
use std::fmt;

/// Progress of the most recent turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingFirstChunk,
    Streaming,
    Settled,
}

impl TurnState {
    pub fn is_in_flight(self) -> bool {
        matches!(self, TurnState::AwaitingFirstChunk | TurnState::Streaming)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::AwaitingFirstChunk => write!(f, "awaiting first chunk"),
            TurnState::Streaming => write!(f, "streaming"),
            TurnState::Settled => write!(f, "settled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing to send; no state was touched.
    Rejected,
    Settled {
        message_id: String,
        content: String,
    },
    /// The source failed. Whatever arrived before the failure is kept.
    Failed {
        message_id: String,
        partial: String,
        error: String,
    },
    /// A newer turn, a session switch or a shutdown took over; late
    /// fragments from this turn were discarded.
    Superseded {
        message_id: String,
    },
}

/// Identity of one in-flight stream. A fragment is only applied while the
/// controller still carries the same generation and session.
#[derive(Debug, Clone)]
pub(crate) struct TurnHandle {
    pub generation: u64,
    pub session_id: String,
    pub placeholder_id: String,
}
