//! Loading trainer configuration (prompts + optional challenge bank) from TOML.
//!
//! See `TrainerConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use tracing::{info, error};

use crate::domain::Checklist;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TrainerConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub challenges: Vec<ChallengeCfg>,
}

/// Challenge entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ChallengeCfg {
  #[serde(default)] pub id: Option<String>,
  pub difficulty: String,
  #[serde(default)] pub language: Option<String>,
  #[serde(default)] pub prompt: Option<String>,
  #[serde(default)] pub key_points: Option<Vec<String>>,
  #[serde(default)] pub checklist: Option<Checklist>,
}

/// Prompts used by the OpenAI client. Defaults are sensible for
/// coding-pattern practice. Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Challenge generation
  pub generation_system: String,
  pub generation_user_template: String,
  // Solution judging
  pub judge_system: String,
  pub judge_user_template: String,
  // Hints
  pub hint_system: String,
  pub hint_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: "You are a coding-pattern exercise generator. Respond ONLY with strict JSON.".into(),
      generation_user_template: "Generate one coding-pattern challenge at difficulty '{difficulty}'. Return JSON with fields: prompt (the task statement), language (target language or 'any'), key_points (array of 2-4 things a good solution demonstrates). Keep the prompt short and concrete.".into(),
      judge_system: "You are a strict but fair code reviewer judging practice solutions. Output JSON only.".into(),
      judge_user_template: "Task: {prompt}\nTarget language: {language}\nKey points: {key_points}\nUser solution:\n{solution}\n\nReturn JSON: {\"correct\": boolean, \"score\": number, \"explanation\": string}\nScoring: 0-100. 'correct' = true if score >= 60. Judge the pattern, not style nits.".into(),
      hint_system: "You are a coding coach. Keep hints short and do NOT reveal a full solution.".into(),
      hint_user_template: "Task: {prompt}\nGive ONE concise hint (< 25 words), e.g., which data structure or loop shape to reach for.".into(),
    }
  }
}

/// Attempt to load `TrainerConfig` from TRAINER_CONFIG_PATH. On any
/// parsing/IO error, returns None.
pub fn load_trainer_config_from_env() -> Option<TrainerConfig> {
  let path = std::env::var("TRAINER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TrainerConfig>(&s) {
      Ok(cfg) => {
        info!(target: "patterngym", %path, "Loaded trainer config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "patterngym", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "patterngym", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
