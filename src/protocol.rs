//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Challenge, ChallengeSource, Phase, Verdict};
use crate::workflow::WorkflowSnapshot;

/// Messages the client can send over WebSocket. One workflow session per
/// connection; no session id on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NewChallenge {
        difficulty: String,
    },
    Edit {
        text: String,
    },
    Submit,
    Hint,
}

/// Messages the server sends back over WebSocket. `State` is also pushed
/// unprompted whenever an async completion changes the workflow.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State {
        state: SnapshotOut,
    },
    Hint {
        text: String,
    },
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for challenge delivery.
#[derive(Debug, Serialize)]
pub struct ChallengeOut {
    pub id: String,
    pub difficulty: String,
    pub language: String,
    pub source: ChallengeSource,
    pub prompt: String,
    #[serde(rename = "keyPoints")]
    pub key_points: Vec<String>,
}

/// Read-only workflow view: phase, challenge, draft, verdict (or failure
/// reason), and any surfaced source error.
#[derive(Debug, Serialize)]
pub struct SnapshotOut {
    pub phase: Phase,
    pub challenge: Option<ChallengeOut>,
    pub draft: String,
    pub verdict: Option<Verdict>,
    #[serde(rename = "sourceError")]
    pub source_error: Option<String>,
}

/// Convert full `Challenge` (internal) to the public DTO.
pub fn to_out(c: &Challenge) -> ChallengeOut {
    ChallengeOut {
        id: c.id.clone(),
        difficulty: c.difficulty.clone(),
        language: c.language.clone(),
        source: c.source.clone(),
        prompt: c.prompt.clone(),
        key_points: c.key_points.clone(),
    }
}

pub fn snapshot_out(s: &WorkflowSnapshot) -> SnapshotOut {
    SnapshotOut {
        phase: s.phase,
        challenge: s.challenge.as_ref().map(to_out),
        draft: s.draft.clone(),
        verdict: s.verdict.clone(),
        source_error: s.source_error.clone(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NewChallengeIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub difficulty: Option<String>,
}

#[derive(Deserialize)]
pub struct EditIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct SubmitIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Serialize)]
pub struct HintOut {
    pub text: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
