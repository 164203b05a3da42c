//! Evaluator Gateway boundary: judging a (challenge, solution-text) pair.
//!
//! The workflow only sees the `EvaluatorGateway` trait. A transport or
//! processing failure is an `Err(GatewayError)` and is a different animal
//! from a judged rejection; the session maps it to
//! `Verdict::EvaluationFailed` so the user can retry with the draft intact.
//!
//! Two concrete judges:
//!   - `HeuristicJudge`: checklist scoring, fully local, never fails
//!   - `OpenAiJudge`: AI-backed judging via the chat API

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use crate::config::Prompts;
use crate::domain::Challenge;
use crate::openai::OpenAI;

/// Transport or processing failure on the judge side. Carries the reason
/// shown to the user inside `Verdict::EvaluationFailed`.
#[derive(Clone, Debug, Error)]
#[error("evaluator failure: {0}")]
pub struct GatewayError(pub String);

/// A completed judgment. `accepted` is the binary outcome; score and
/// explanation are shown to the user verbatim.
#[derive(Clone, Debug)]
pub struct Judgment {
  pub accepted: bool,
  pub score: f32,
  pub explanation: String,
}

/// Asynchronous, possibly-failing judge. Implementations must be safe to
/// call twice with the same pair; duplicate responses are defused upstream
/// by the submission-token comparison, so no idempotency bookkeeping is
/// needed here.
#[async_trait]
pub trait EvaluatorGateway: Send + Sync {
  async fn evaluate(&self, challenge: &Challenge, solution: &str) -> Result<Judgment, GatewayError>;
}

/// Local checklist scoring. Used when no API key is configured, and in tests.
pub struct HeuristicJudge;

impl HeuristicJudge {
  pub fn score(challenge: &Challenge, solution: &str) -> Judgment {
    let mut score = 50.0_f32;
    let mut notes = vec![];

    if let Some(cl) = &challenge.checklist {
      if let Some(min_chars) = cl.min_chars {
        if solution.chars().count() >= min_chars { score += 15.0; }
        else { notes.push(format!("Too short (< {})", min_chars)); }
      }
      if let Some(req) = &cl.must_include {
        for w in req {
          if solution.contains(w) { score += 5.0; }
          else { notes.push(format!("Missing '{}'", w)); }
        }
      }
      if let Some(avoid) = &cl.avoid {
        for w in avoid {
          if solution.contains(w) { score -= 10.0; notes.push(format!("Avoid '{}' present", w)); }
        }
      }
    } else {
      // No checklist: reward solutions that at least name the key points.
      for kp in &challenge.key_points {
        if solution.to_lowercase().contains(&kp.to_lowercase()) { score += 5.0; }
      }
    }

    score = score.clamp(0.0, 100.0);
    let accepted = score >= 60.0;
    let mut explanation = if notes.is_empty() { "Looks okay.".to_string() } else { notes.join("; ") };
    explanation.push_str(&format!(" (Score: {:.1}/100)", score));
    Judgment { accepted, score, explanation }
  }
}

#[async_trait]
impl EvaluatorGateway for HeuristicJudge {
  async fn evaluate(&self, challenge: &Challenge, solution: &str) -> Result<Judgment, GatewayError> {
    let j = Self::score(challenge, solution);
    info!(target: "challenge", id = %challenge.id, accepted = j.accepted, score = %format!("{:.1}", j.score), "Local heuristic judgment");
    Ok(Judgment {
      explanation: format!("(local) {}", j.explanation),
      ..j
    })
  }
}

/// AI-backed judge. Transport and parse failures surface as `GatewayError`
/// (shown to the user as an evaluation failure, retryable), never as a
/// rejection.
pub struct OpenAiJudge {
  pub openai: OpenAI,
  pub prompts: Prompts,
}

#[async_trait]
impl EvaluatorGateway for OpenAiJudge {
  async fn evaluate(&self, challenge: &Challenge, solution: &str) -> Result<Judgment, GatewayError> {
    match self.openai.judge_solution(&self.prompts, challenge, solution).await {
      Ok((accepted, score, explanation)) => {
        info!(target: "challenge", id = %challenge.id, accepted, score = %format!("{:.1}", score), "OpenAI judgment");
        Ok(Judgment { accepted, score, explanation })
      }
      Err(e) => {
        error!(target: "challenge", id = %challenge.id, error = %e, "OpenAI judge_solution failed");
        Err(GatewayError(e))
      }
    }
  }
}
