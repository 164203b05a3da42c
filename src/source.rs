//! Pattern Source boundary: where challenges come from.
//!
//! The workflow only sees the `PatternSource` trait: one single-shot async
//! fetch that yields a challenge or fails. Transport is the collaborator's
//! concern. This module carries the two concrete sources:
//!   - `BankSource`: in-memory stores fed by the TOML bank and built-in seeds
//!   - `TrainerSource`: generation-first policy (OpenAI when configured,
//!     bank rotation otherwise, hard fallback as the last resort)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Prompts;
use crate::domain::{Challenge, ChallengeSource};
use crate::openai::OpenAI;
use crate::seeds::hard_fallback_challenge;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("pattern source unavailable: {0}")]
pub struct SourceUnavailable(pub String);

/// Single-shot asynchronous challenge fetch. No ordering guarantee between
/// successive calls; the same challenge may legitimately come back twice.
#[async_trait]
pub trait PatternSource: Send + Sync {
    async fn fetch_challenge(&self, difficulty: &str) -> Result<Challenge, SourceUnavailable>;
}

/// In-memory challenge stores (by id, by difficulty, last-served-by-difficulty).
pub struct BankSource {
    by_id: RwLock<HashMap<String, Challenge>>,
    by_diff: RwLock<HashMap<String, Vec<String>>>,
    last_by_diff: RwLock<HashMap<String, String>>,
}

impl BankSource {
    pub fn new(initial: Vec<Challenge>) -> Self {
        let mut id_map = HashMap::<String, Challenge>::new();
        let mut diff_map = HashMap::<String, Vec<String>>::new();
        for c in initial {
            let id = c.id.clone();
            diff_map.entry(c.difficulty.clone()).or_default().push(id.clone());
            id_map.entry(id).or_insert(c);
        }

        // Inventory summary by difficulty/source.
        let mut count_by_diff: HashMap<String, (usize, usize, usize)> = HashMap::new();
        for ch in id_map.values() {
            let entry = count_by_diff.entry(ch.difficulty.clone()).or_insert((0, 0, 0));
            match ch.source {
                ChallengeSource::LocalBank => entry.0 += 1,
                ChallengeSource::Generated => entry.1 += 1,
                ChallengeSource::Seed => entry.2 += 1,
            }
        }
        for (diff, (bank, gen, seed)) in count_by_diff {
            info!(target: "challenge", %diff, local_bank = bank, generated = gen, seed = seed, "Startup challenge inventory");
        }

        Self {
            by_id: RwLock::new(id_map),
            by_diff: RwLock::new(diff_map),
            last_by_diff: RwLock::new(HashMap::new()),
        }
    }

    /// Insert challenge into stores (by_id and by_diff).
    pub async fn insert(&self, c: Challenge) {
        let mut by_id = self.by_id.write().await;
        let mut by_diff = self.by_diff.write().await;
        let id = c.id.clone();
        let diff = c.difficulty.clone();
        by_id.insert(id.clone(), c);
        by_diff.entry(diff).or_default().push(id);
    }

    /// Read-only access to a challenge by id.
    #[allow(dead_code)]
    pub async fn get(&self, id: &str) -> Option<Challenge> {
        self.by_id.read().await.get(id).cloned()
    }

    async fn mark_served(&self, difficulty: &str, id: &str) {
        self.last_by_diff
            .write()
            .await
            .insert(difficulty.to_string(), id.to_string());
    }

    /// Pick a challenge for the difficulty, avoiding serving the same item
    /// twice in a row when there is a choice.
    pub async fn pick(&self, difficulty: &str) -> Option<Challenge> {
        let ids = self.by_diff.read().await.get(difficulty).cloned()?;
        if ids.is_empty() {
            return None;
        }
        let last = { self.last_by_diff.read().await.get(difficulty).cloned() };
        let candidates: Vec<&String> = match &last {
            Some(last_id) if ids.len() > 1 => ids.iter().filter(|id| *id != last_id).collect(),
            _ => ids.iter().collect(),
        };
        let chosen_id = candidates
            .choose(&mut rand::thread_rng())
            .map(|s| (*s).clone())?;
        let ch = self.by_id.read().await.get(&chosen_id).cloned()?;
        self.mark_served(difficulty, &chosen_id).await;
        Some(ch)
    }
}

#[async_trait]
impl PatternSource for BankSource {
    async fn fetch_challenge(&self, difficulty: &str) -> Result<Challenge, SourceUnavailable> {
        self.pick(difficulty).await.ok_or_else(|| {
            SourceUnavailable(format!("no challenges available for difficulty '{difficulty}'"))
        })
    }
}

/// Selection policy:
/// Generate a fresh pattern challenge via OpenAI when available.
/// Otherwise serve from the bank, and as an absolute last resort inject the
/// hard fallback so the tool stays usable offline.
pub struct TrainerSource {
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub bank: Arc<BankSource>,
}

#[async_trait]
impl PatternSource for TrainerSource {
    async fn fetch_challenge(&self, difficulty: &str) -> Result<Challenge, SourceUnavailable> {
        if let Some(oa) = &self.openai {
            match oa.generate_challenge(&self.prompts, difficulty).await {
                Ok(c) => {
                    self.bank.insert(c.clone()).await;
                    self.bank.mark_served(difficulty, &c.id).await;
                    info!(target: "challenge", %difficulty, chosen = %c.id, origin = "openai_generated_new", "Generated fresh challenge");
                    return Ok(c);
                }
                Err(e) => {
                    error!(target: "challenge", %difficulty, error = %e, "OpenAI generation failed; falling back to bank");
                }
            }
        }

        if let Some(ch) = self.bank.pick(difficulty).await {
            warn!(target: "challenge", %difficulty, chosen = %ch.id, origin = "existing_pool", "Serving existing challenge");
            return Ok(ch);
        }

        let c = hard_fallback_challenge(difficulty.to_string());
        self.bank.insert(c.clone()).await;
        self.bank.mark_served(difficulty, &c.id).await;
        warn!(target: "challenge", %difficulty, chosen = %c.id, origin = "hard_fallback", "Inserted hard fallback challenge");
        Ok(c)
    }
}
