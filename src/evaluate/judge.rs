// src/evaluate/judge.rs
//! Judge clients: a local Ollama model and hosted chat APIs.
//!
//! Each client turns a rendered prompt into reply text. Interpreting that
//! text is `response`'s job; failover and breakers live in `Evaluator`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ApiLlmConfig, ApiProvider, JudgeKind, LlmConfig, LocalLlmConfig};
use crate::http::{build_client, send_with_retry, HttpError};

const JUDGE_RETRIES: u32 = 1;
const JUDGE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_OUTPUT_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.1;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const SYSTEM_PROMPT: &str = "You evaluate shopping deals against a user's interests. Answer RELEVANT or NOT RELEVANT, then a short reason.";

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("failed to decode {provider} response: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{0} returned an empty response")]
    Empty(&'static str),
    #[error("judge failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub latency: Duration,
    pub tokens_used: Option<u64>,
}

#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, prompt: &str) -> Result<JudgeResponse, JudgeError>;

    /// "provider/model", used in logs and breaker names.
    fn name(&self) -> String;

    /// Cheap reachability check; never an error, just a yes/no.
    async fn probe(&self) -> bool {
        true
    }
}

// ------------------------------------------------------------
// Local (Ollama)
// ------------------------------------------------------------

pub struct LocalJudge {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl LocalJudge {
    pub fn new(cfg: &LocalLlmConfig) -> Result<Self, HttpError> {
        Ok(Self {
            http: build_client(Duration::from_secs(cfg.timeout_secs))?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
        })
    }
}

#[async_trait]
impl Judge for LocalJudge {
    async fn evaluate(&self, prompt: &str) -> Result<JudgeResponse, JudgeError> {
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            top_p: f32,
            num_predict: u32,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            response: String,
            #[serde(default)]
            eval_count: Option<u64>,
        }

        let req = Req {
            model: &self.model,
            prompt,
            stream: false,
            options: Options {
                temperature: TEMPERATURE,
                top_p: 0.9,
                num_predict: MAX_OUTPUT_TOKENS,
            },
        };
        let url = format!("{}/api/generate", self.base_url);
        let t0 = Instant::now();
        let rsp = send_with_retry(
            || self.http.post(&url).json(&req),
            JUDGE_RETRIES,
            JUDGE_BACKOFF,
            "ollama",
        )
        .await?;
        let body: Resp = rsp.json().await.map_err(|source| JudgeError::Decode {
            provider: "ollama",
            source,
        })?;
        let content = body.response.trim().to_string();
        if content.is_empty() {
            return Err(JudgeError::Empty("ollama"));
        }
        Ok(JudgeResponse {
            content,
            provider: "ollama".into(),
            model: self.model.clone(),
            latency: t0.elapsed(),
            tokens_used: body.eval_count,
        })
    }

    fn name(&self) -> String {
        format!("ollama/{}", self.model)
    }

    async fn probe(&self) -> bool {
        #[derive(Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<Tag>,
        }
        #[derive(Deserialize)]
        struct Tag {
            name: String,
        }

        let url = format!("{}/api/tags", self.base_url);
        let tags: Tags = match self.http.get(&url).send().await {
            Ok(rsp) if rsp.status().is_success() => match rsp.json().await {
                Ok(t) => t,
                Err(e) => {
                    warn!(target: "evaluator", error = %e, "ollama tags unreadable");
                    return false;
                }
            },
            Ok(rsp) => {
                warn!(target: "evaluator", status = %rsp.status(), "ollama probe failed");
                return false;
            }
            Err(e) => {
                warn!(target: "evaluator", error = %e, "ollama unreachable");
                return false;
            }
        };
        let tagged = format!("{}:", self.model);
        let present = tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(&tagged));
        if !present {
            warn!(target: "evaluator", model = %self.model, "model not pulled on ollama host");
        }
        present
    }
}

// ------------------------------------------------------------
// Hosted APIs (OpenAI / Anthropic / Google)
// ------------------------------------------------------------

pub struct ApiJudge {
    http: reqwest::Client,
    provider: ApiProvider,
    model: String,
    api_key: String,
    base_url: String,
}

fn default_base_url(provider: ApiProvider) -> &'static str {
    match provider {
        ApiProvider::OpenAi => "https://api.openai.com/v1",
        ApiProvider::Anthropic => "https://api.anthropic.com/v1",
        ApiProvider::Google => "https://generativelanguage.googleapis.com/v1beta",
    }
}

impl ApiJudge {
    pub fn new(cfg: &ApiLlmConfig) -> Result<Self, HttpError> {
        let base_url = cfg
            .base_url
            .as_deref()
            .unwrap_or(default_base_url(cfg.provider))
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http: build_client(Duration::from_secs(cfg.timeout_secs))?,
            provider: cfg.provider,
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            base_url,
        })
    }

    async fn call_openai(&self, prompt: &str) -> Result<(String, Option<u64>), JudgeError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Option<Usage>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Usage {
            total_tokens: u64,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let rsp = send_with_retry(
            || self.http.post(&url).bearer_auth(&self.api_key).json(&req),
            JUDGE_RETRIES,
            JUDGE_BACKOFF,
            "openai",
        )
        .await?;
        let body: Resp = rsp.json().await.map_err(|source| JudgeError::Decode {
            provider: "openai",
            source,
        })?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok((content, body.usage.map(|u| u.total_tokens)))
    }

    async fn call_anthropic(&self, prompt: &str) -> Result<(String, Option<u64>), JudgeError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            content: Vec<Block>,
            #[serde(default)]
            usage: Option<Usage>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(default)]
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct Usage {
            #[serde(default)]
            input_tokens: u64,
            #[serde(default)]
            output_tokens: u64,
        }

        let req = Req {
            model: &self.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            system: SYSTEM_PROMPT,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };
        let url = format!("{}/messages", self.base_url);
        let rsp = send_with_retry(
            || {
                self.http
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&req)
            },
            JUDGE_RETRIES,
            JUDGE_BACKOFF,
            "anthropic",
        )
        .await?;
        let body: Resp = rsp.json().await.map_err(|source| JudgeError::Decode {
            provider: "anthropic",
            source,
        })?;
        let content = body
            .content
            .into_iter()
            .find_map(|b| b.text)
            .unwrap_or_default();
        Ok((
            content,
            body.usage.map(|u| u.input_tokens + u.output_tokens),
        ))
    }

    async fn call_google(&self, prompt: &str) -> Result<(String, Option<u64>), JudgeError> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            temperature: f32,
            max_output_tokens: u32,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
            #[serde(default)]
            usage_metadata: Option<UsageMeta>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: CandidateContent,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            #[serde(default)]
            parts: Vec<CandidatePart>,
        }
        #[derive(Deserialize)]
        struct CandidatePart {
            #[serde(default)]
            text: Option<String>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct UsageMeta {
            #[serde(default)]
            total_token_count: u64,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let rsp = send_with_retry(
            || {
                self.http
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&req)
            },
            JUDGE_RETRIES,
            JUDGE_BACKOFF,
            "google",
        )
        .await?;
        let body: Resp = rsp.json().await.map_err(|source| JudgeError::Decode {
            provider: "google",
            source,
        })?;
        let content = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .unwrap_or_default();
        Ok((content, body.usage_metadata.map(|u| u.total_token_count)))
    }
}

#[async_trait]
impl Judge for ApiJudge {
    async fn evaluate(&self, prompt: &str) -> Result<JudgeResponse, JudgeError> {
        let t0 = Instant::now();
        let (content, tokens_used) = match self.provider {
            ApiProvider::OpenAi => self.call_openai(prompt).await?,
            ApiProvider::Anthropic => self.call_anthropic(prompt).await?,
            ApiProvider::Google => self.call_google(prompt).await?,
        };
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(JudgeError::Empty(self.provider.as_str()));
        }
        debug!(target: "evaluator", provider = self.provider.as_str(), ?tokens_used, "judge replied");
        Ok(JudgeResponse {
            content,
            provider: self.provider.as_str().into(),
            model: self.model.clone(),
            latency: t0.elapsed(),
            tokens_used,
        })
    }

    fn name(&self) -> String {
        format!("{}/{}", self.provider.as_str(), self.model)
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let req = self.http.get(&url);
        let req = match self.provider {
            ApiProvider::OpenAi => req.bearer_auth(&self.api_key),
            ApiProvider::Anthropic => req
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ApiProvider::Google => req.header("x-goog-api-key", &self.api_key),
        };
        match req.send().await {
            Ok(rsp) if rsp.status().is_success() => true,
            Ok(rsp) => {
                warn!(target: "evaluator", provider = self.provider.as_str(), status = %rsp.status(), "judge probe rejected");
                false
            }
            Err(e) => {
                warn!(target: "evaluator", provider = self.provider.as_str(), error = %e, "judge probe failed");
                false
            }
        }
    }
}

// ------------------------------------------------------------
// Config-driven construction
// ------------------------------------------------------------

pub enum JudgeClient {
    Local(LocalJudge),
    Api(ApiJudge),
}

impl JudgeClient {
    pub fn local(cfg: &LocalLlmConfig) -> Result<Self, HttpError> {
        LocalJudge::new(cfg).map(JudgeClient::Local)
    }

    pub fn api(cfg: &ApiLlmConfig) -> Result<Self, HttpError> {
        ApiJudge::new(cfg).map(JudgeClient::Api)
    }

    /// Primary judge per `llm.type`, plus the other section as secondary.
    pub fn from_config(llm: &LlmConfig) -> anyhow::Result<(Self, Option<Self>)> {
        let local = llm.local.as_ref().map(Self::local).transpose()?;
        let api = llm.api.as_ref().map(Self::api).transpose()?;
        let pair = match llm.kind {
            JudgeKind::Local => (local, api),
            JudgeKind::Api => (api, local),
        };
        match pair {
            (Some(primary), secondary) => {
                info!(
                    target: "evaluator",
                    primary = %primary.name(),
                    secondary = ?secondary.as_ref().map(|s| s.name()),
                    "judges configured"
                );
                Ok((primary, secondary))
            }
            (None, _) => anyhow::bail!("llm section for the primary judge is missing"),
        }
    }
}

#[async_trait]
impl Judge for JudgeClient {
    async fn evaluate(&self, prompt: &str) -> Result<JudgeResponse, JudgeError> {
        match self {
            JudgeClient::Local(j) => j.evaluate(prompt).await,
            JudgeClient::Api(j) => j.evaluate(prompt).await,
        }
    }

    fn name(&self) -> String {
        match self {
            JudgeClient::Local(j) => j.name(),
            JudgeClient::Api(j) => j.name(),
        }
    }

    async fn probe(&self) -> bool {
        match self {
            JudgeClient::Local(j) => j.probe().await,
            JudgeClient::Api(j) => j.probe().await,
        }
    }
}

// ------------------------------------------------------------
// Test double
// ------------------------------------------------------------

/// Scripted judge for tests and dry runs: replies with a fixed text, or
/// fails every call when `reply` is `None`.
pub struct MockJudge {
    pub name: String,
    pub reply: Option<String>,
    pub delay: Duration,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl MockJudge {
    pub fn replying(text: &str) -> Self {
        Self {
            name: "mock".into(),
            reply: Some(text.to_string()),
            delay: Duration::ZERO,
            calls: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            name: "mock-failing".into(),
            reply: None,
            delay: Duration::ZERO,
            calls: Default::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for MockJudge {
    async fn evaluate(&self, _prompt: &str) -> Result<JudgeResponse, JudgeError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Some(text) => Ok(JudgeResponse {
                content: text.clone(),
                provider: "mock".into(),
                model: self.name.clone(),
                latency: self.delay,
                tokens_used: None,
            }),
            None => Err(JudgeError::Failed(format!("{} is scripted to fail", self.name))),
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
