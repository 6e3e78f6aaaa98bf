use serde::{ Deserialize, Serialize };

/// Notifications published by the conversation controller. A `TurnFailed`
/// is the only place a streaming error surfaces; it never enters the transcript.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ConversationEvent {
    #[serde(rename = "session_activated")] SessionActivated {
        session_id: String,
        model_id: String,
    },
    #[serde(rename = "turn_started")] TurnStarted {
        session_id: String,
        user_message_id: String,
        message_id: String,
    },
    #[serde(rename = "fragment")] Fragment {
        message_id: String,
        content: String,
    },
    #[serde(rename = "turn_settled")] TurnSettled {
        message_id: String,
        content: String,
    },
    #[serde(rename = "turn_failed")] TurnFailed {
        message_id: String,
        error: String,
    },
    #[serde(rename = "turn_abandoned")] TurnAbandoned {
        message_id: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StoreEvent {
    #[serde(rename = "upserted")] Upserted {
        id: String,
        created: bool,
    },
    #[serde(rename = "renamed")] Renamed {
        id: String,
        title: String,
    },
    #[serde(rename = "pin_toggled")] PinToggled {
        id: String,
        pinned: bool,
    },
    #[serde(rename = "deleted")] Deleted {
        id: String,
    },
    #[serde(rename = "cleared")]
    Cleared,
    #[serde(rename = "restored")] Restored {
        count: usize,
    },
}
