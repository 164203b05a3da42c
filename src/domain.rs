//! Domain models used by the backend: challenges, verdicts, submission tokens.

use serde::{Deserialize, Serialize};

/// Where did we get the challenge from?
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeSource {
  LocalBank,   // from user-provided TOML bank
  Generated,   // generated via OpenAI and cached in memory
  Seed,  // built-in seeds (last resort)
}

/// Optional checklist used for local heuristic judging (and echoed to the AI judge).
#[derive(Clone, Debug, Deserialize, Default, Serialize)]
pub struct Checklist {
  #[serde(default)] pub min_chars: Option<usize>,
  #[serde(default)] pub must_include: Option<Vec<String>>,
  #[serde(default)] pub avoid: Option<Vec<String>>,
}

/// Core challenge structure held in-memory.
/// Immutable once created; replaced wholesale when a new challenge is requested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub difficulty: String,   // free-form (e.g., "easy", "medium", "hard")
  pub language: String,     // target language hint (e.g., "rust", "any")
  pub source: ChallengeSource,

  /// The task statement shown to the user.
  pub prompt: String,
  /// What a good solution should demonstrate; feeds the judge prompt.
  #[serde(default)] pub key_points: Vec<String>,
  #[serde(default)] pub checklist: Option<Checklist>,
}

/// Outcome of evaluating one (challenge, solution-text) pair.
///
/// `EvaluationFailed` is a gateway/processing failure. It is a distinct
/// outcome from a judged `Rejected` and leaves the draft available for retry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
  Accepted { score: f32, explanation: String },
  Rejected { score: f32, explanation: String },
  EvaluationFailed { reason: String },
}

impl Verdict {
  pub fn is_accepted(&self) -> bool {
    matches!(self, Verdict::Accepted { .. })
  }
}

/// Immutable snapshot identifying exactly which challenge+text a verdict
/// applies to. A verdict whose token no longer matches the current draft
/// snapshot is discarded as stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionToken {
  pub challenge_id: String,
  pub text: String,
}

/// Phase tag of the challenge workflow.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Idle,
  Loading,
  Active,
  Submitting,
  Resolved,
}
