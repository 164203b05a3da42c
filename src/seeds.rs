//! Seed data and small utilities related to default content.

use uuid::Uuid;

use crate::domain::{Challenge, ChallengeSource, Checklist};

/// Minimal set of built-in challenges that guarantee the app
/// is useful even without external config or OpenAI.
pub fn seed_challenges() -> Vec<Challenge> {
  vec![
    Challenge {
      id: "p101".into(),
      difficulty: "easy".into(),
      language: "any".into(),
      source: ChallengeSource::Seed,
      prompt: "Given a sorted array and a target sum, find a pair adding up to the target using the two-pointer pattern (no nested loops).".into(),
      key_points: vec!["two pointers".into(), "single pass".into()],
      checklist: Some(Checklist {
        min_chars: Some(60),
        must_include: Some(vec!["while".into()]),
        avoid: None,
      }),
    },
    Challenge {
      id: "p102".into(),
      difficulty: "medium".into(),
      language: "any".into(),
      source: ChallengeSource::Seed,
      prompt: "Compute the maximum sum of any window of size k using the sliding-window pattern in O(n).".into(),
      key_points: vec!["sliding window".into(), "incremental update".into()],
      checklist: Some(Checklist {
        min_chars: Some(80),
        must_include: None,
        avoid: None,
      }),
    },
    Challenge {
      id: "p103".into(),
      difficulty: "medium".into(),
      language: "rust".into(),
      source: ChallengeSource::Seed,
      prompt: "Design a config struct with several optional fields and construct it with the builder pattern, validating in build().".into(),
      key_points: vec!["builder".into(), "method chaining".into(), "validation in build".into()],
      checklist: Some(Checklist {
        min_chars: Some(80),
        must_include: Some(vec!["fn build".into()]),
        avoid: Some(vec!["unwrap()".into()]),
      }),
    },
  ]
}

/// Absolute last-resort fallback: if all stores are empty, we inject this.
pub fn hard_fallback_challenge(difficulty: String) -> Challenge {
  Challenge {
    id: Uuid::new_v4().to_string(),
    difficulty,
    language: "any".into(),
    source: ChallengeSource::Seed,
    prompt: "Reverse the words of a sentence in place, using the two-pass reverse pattern.".into(),
    key_points: vec!["reverse whole, then each word".into()],
    checklist: Some(Checklist {
      min_chars: Some(40),
      must_include: None,
      avoid: None,
    }),
  }
}
