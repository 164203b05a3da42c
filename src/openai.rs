//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions and request either plain text or a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{instrument, info, error};

use crate::config::Prompts;
use crate::domain::{Challenge, ChallengeSource};
use crate::util::fill_template;
use uuid::Uuid;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

#[derive(Deserialize)]
struct Gen {
  prompt: String,
  #[serde(default)] language: Option<String>,
  #[serde(default)] key_points: Vec<String>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// Plain-text chat completion. Used for hints.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_plain(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: None,
      max_tokens: None,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "patterngym-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.get(0)
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    Ok(text)
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "patterngym-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.get(0)
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }

  // --- High-level helpers (domain-specialized) ---

  /// Generate a new coding-pattern challenge.
  #[instrument(
    level = "info",
    skip(self, prompts, difficulty),
    fields(%difficulty, model = %self.strong_model, cfg_len = prompts.generation_user_template.len())
  )]
  pub async fn generate_challenge(
    &self,
    prompts: &Prompts,
    difficulty: &str,
  ) -> Result<Challenge, String> {
    let system = fill_template(&prompts.generation_system, &[("difficulty", difficulty)]);
    let user = fill_template(&prompts.generation_user_template, &[("difficulty", difficulty)]);
    let start = std::time::Instant::now();
    let result = self.chat_json::<Gen>(&self.strong_model, &system, &user, 0.95).await;
    let elapsed = start.elapsed();

    match &result {
      Ok(_) => info!(?elapsed, "Model response received successfully"),
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during challenge generation");
        return Err(format!("Model generation failed: {e}"));
      }
    }

    let gen = result?;
    if gen.prompt.trim().is_empty() {
      return Err("Model returned an empty prompt".into());
    }
    let ch = Challenge {
      id: Uuid::new_v4().to_string(),
      difficulty: difficulty.to_string(),
      language: gen.language.unwrap_or_else(|| "any".into()),
      source: ChallengeSource::Generated,
      prompt: gen.prompt,
      key_points: gen.key_points,
      checklist: None,
    };

    info!(
      challenge_id = %ch.id,
      prompt_preview = %ch.prompt.chars().take(60).collect::<String>(),
      key_points = ch.key_points.len(),
      "Pattern challenge successfully generated"
    );

    Ok(ch)
  }

  /// Judge a user solution against a challenge (returns correct, score, explanation).
  #[instrument(level = "info", skip(self, prompts, challenge, solution),
               fields(challenge_id = %challenge.id, solution_len = solution.len()))]
  pub async fn judge_solution(
    &self,
    prompts: &Prompts,
    challenge: &Challenge,
    solution: &str,
  ) -> Result<(bool, f32, String), String> {
    #[derive(Deserialize)]
    struct Val { correct: bool, score: f32, explanation: String }

    let key_points = challenge.key_points.join("; ");
    let user = fill_template(
      &prompts.judge_user_template,
      &[
        ("prompt",     &challenge.prompt),
        ("language",   &challenge.language),
        ("key_points", &key_points),
        ("solution",   solution),
      ],
    );

    let v: Val = self.chat_json(&self.strong_model, &prompts.judge_system, &user, 0.2).await?;
    Ok((v.correct, v.score, v.explanation))
  }

  #[instrument(level = "info", skip(self, prompts, challenge), fields(challenge_id = %challenge.id))]
  pub async fn pattern_hint(
    &self,
    prompts: &Prompts,
    challenge: &Challenge,
  ) -> Result<String, String> {
    let user = fill_template(&prompts.hint_user_template, &[("prompt", &challenge.prompt)]);
    self.chat_plain(&self.fast_model, &prompts.hint_system, &user, 0.2).await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
