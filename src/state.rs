//! Application state: collaborator wiring and the per-session registry.
//!
//! This module owns:
//!   - the challenge bank (TOML config entries + built-in seeds)
//!   - the pattern source and evaluator gateway instances
//!   - the prompts struct (from TOML or defaults)
//!   - optional OpenAI client
//!   - one workflow session per connected user (no cross-session sharing)

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::{load_trainer_config_from_env, Prompts};
use crate::domain::{Challenge, ChallengeSource};
use crate::gateway::{EvaluatorGateway, HeuristicJudge, OpenAiJudge};
use crate::openai::OpenAI;
use crate::seeds::seed_challenges;
use crate::session::Session;
use crate::source::{BankSource, PatternSource, TrainerSource};

pub struct AppState {
    pub source: Arc<dyn PatternSource>,
    pub gateway: Arc<dyn EvaluatorGateway>,
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl AppState {
    /// Build state from env: load config, seed challenges, init OpenAI,
    /// pick the judge.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        // Load TOML config if provided (prompts + optional local bank).
        let cfg_opt = load_trainer_config_from_env();
        let prompts = cfg_opt
            .as_ref()
            .map(|c| c.prompts.clone())
            .unwrap_or_default();

        let mut initial: Vec<Challenge> = Vec::new();

        // Config-bank challenges first so their ids win over seeds.
        if let Some(cfg) = &cfg_opt {
            for cc in &cfg.challenges {
                let id = cc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
                let prompt = match &cc.prompt {
                    Some(s) if !s.is_empty() => s.clone(),
                    _ => {
                        error!(target: "challenge", %id, difficulty = %cc.difficulty, "Skipping bank item: missing prompt.");
                        continue;
                    }
                };
                initial.push(Challenge {
                    id,
                    difficulty: cc.difficulty.clone(),
                    language: cc.language.clone().unwrap_or_else(|| "any".into()),
                    source: ChallengeSource::LocalBank,
                    prompt,
                    key_points: cc.key_points.clone().unwrap_or_default(),
                    checklist: cc.checklist.clone(),
                });
            }
        }
        initial.extend(seed_challenges());

        let bank = Arc::new(BankSource::new(initial));

        // Build optional OpenAI client (if API key present) and pick the
        // judge accordingly. Without a key, both generation and judging run
        // on the local machinery.
        let openai = OpenAI::from_env();
        let gateway: Arc<dyn EvaluatorGateway> = match &openai {
            Some(oa) => {
                info!(target: "patterngym", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Arc::new(OpenAiJudge { openai: oa.clone(), prompts: prompts.clone() })
            }
            None => {
                info!(target: "patterngym", "OpenAI disabled (no OPENAI_API_KEY). Using local heuristic judge.");
                Arc::new(HeuristicJudge)
            }
        };

        let source: Arc<dyn PatternSource> = Arc::new(TrainerSource {
            openai: openai.clone(),
            prompts: prompts.clone(),
            bank: bank.clone(),
        });

        Self {
            source,
            gateway,
            openai,
            prompts,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a fresh workflow session and register it under a new id.
    #[instrument(level = "info", skip(self))]
    pub async fn open_session(&self) -> (String, Arc<Session>) {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(self.source.clone(), self.gateway.clone());
        self.sessions.write().await.insert(id.clone(), session.clone());
        info!(target: "patterngym", session_id = %id, "Session opened");
        (id, session)
    }

    pub async fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    #[instrument(level = "info", skip(self), fields(session_id = %id))]
    pub async fn close_session(&self, id: &str) {
        if self.sessions.write().await.remove(id).is_some() {
            info!(target: "patterngym", session_id = %id, "Session closed");
        }
    }

    /// Hint for the session's active challenge. AI-backed when available,
    /// local one-liner otherwise. Does not touch the workflow phase.
    #[instrument(level = "info", skip(self, session))]
    pub async fn hint(&self, session: &Session) -> String {
        let ch = match session.snapshot().challenge {
            Some(c) => c,
            None => return "No hint: no active challenge.".into(),
        };

        if let Some(oa) = &self.openai {
            match oa.pattern_hint(&self.prompts, &ch).await {
                Ok(t) => return t,
                Err(e) => {
                    error!(target: "challenge", id = %ch.id, error = %e, "OpenAI pattern_hint failed; using local hint.");
                }
            }
        }
        local_hint(&ch)
    }
}

fn local_hint(ch: &Challenge) -> String {
    if !ch.key_points.is_empty() {
        format!("Think about: {}.", ch.key_points.join(", "))
    } else {
        "Restate the task, pick the loop shape, then handle the edge cases.".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_isolated_and_closable() {
        let state = AppState::new();
        let (id_a, sess_a) = state.open_session().await;
        let (id_b, _sess_b) = state.open_session().await;
        assert_ne!(id_a, id_b);

        sess_a.request_challenge("easy".into()).await;
        let mut sub = sess_a.subscribe();
        let snap = sub
            .wait_for(|s| s.phase == crate::domain::Phase::Active)
            .await
            .unwrap()
            .clone();
        assert!(snap.challenge.is_some());

        // the other session never left Idle
        let other = state.session(&id_b).await.unwrap();
        assert_eq!(other.snapshot().phase, crate::domain::Phase::Idle);

        state.close_session(&id_a).await;
        assert!(state.session(&id_a).await.is_none());
    }

    #[test]
    fn local_hint_prefers_key_points() {
        let ch = Challenge {
            id: "x".into(),
            difficulty: "easy".into(),
            language: "any".into(),
            source: ChallengeSource::Seed,
            prompt: "p".into(),
            key_points: vec!["two pointers".into()],
            checklist: None,
        };
        assert!(local_hint(&ch).contains("two pointers"));
    }
}
