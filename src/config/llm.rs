// src/config/llm.rs
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const ENV_OLLAMA_URL: &str = "OLLAMA_BASE_URL";

fn default_local_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}
fn default_local_timeout() -> u64 {
    60
}
fn default_api_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeKind {
    Local,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    OpenAi,
    Anthropic,
    Google,
}

impl ApiProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "openai",
            ApiProvider::Anthropic => "anthropic",
            ApiProvider::Google => "google",
        }
    }

    pub fn key_env_var(self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "OPENAI_API_KEY",
            ApiProvider::Anthropic => "ANTHROPIC_API_KEY",
            ApiProvider::Google => "GOOGLE_API_KEY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalLlmConfig {
    pub model: String,
    #[serde(default = "default_local_url")]
    pub base_url: String,
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiLlmConfig {
    pub provider: ApiProvider,
    pub model: String,
    /// Literal key, or "ENV" to read the provider's env var.
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

/// `type` selects the primary judge; the other section, when present,
/// becomes the secondary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "type")]
    pub kind: JudgeKind,
    #[serde(default)]
    pub local: Option<LocalLlmConfig>,
    #[serde(default)]
    pub api: Option<ApiLlmConfig>,
}

impl LlmConfig {
    /// Resolve env overrides ("ENV" keys, `$OLLAMA_BASE_URL`) and check the
    /// primary section exists.
    pub fn resolve(mut self) -> Result<Self> {
        match self.kind {
            JudgeKind::Local if self.local.is_none() => {
                bail!("llm.local section is required when llm.type = \"local\"")
            }
            JudgeKind::Api if self.api.is_none() => {
                bail!("llm.api section is required when llm.type = \"api\"")
            }
            _ => {}
        }

        if let Some(local) = self.local.as_mut() {
            if local.model.trim().is_empty() {
                bail!("llm.local.model cannot be empty");
            }
            if let Ok(url) = env::var(ENV_OLLAMA_URL) {
                if !url.trim().is_empty() {
                    local.base_url = url.trim().to_string();
                }
            }
            local.base_url = local.base_url.trim_end_matches('/').to_string();
        }

        if let Some(api) = self.api.as_mut() {
            if api.model.trim().is_empty() {
                bail!("llm.api.model cannot be empty");
            }
            if api.api_key.trim().eq_ignore_ascii_case("env") {
                let var = api.provider.key_env_var();
                api.api_key = env::var(var).map_err(|_| anyhow!("Missing {var} env var"))?;
            }
            if api.api_key.trim().is_empty() {
                bail!("llm.api.api_key cannot be empty");
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn api_cfg(key: &str) -> LlmConfig {
        LlmConfig {
            kind: JudgeKind::Api,
            local: None,
            api: Some(ApiLlmConfig {
                provider: ApiProvider::Anthropic,
                model: "claude-3-haiku-20240307".into(),
                api_key: key.into(),
                base_url: None,
                timeout_secs: 30,
            }),
        }
    }

    #[test]
    #[serial]
    fn env_key_is_resolved_per_provider() {
        env::set_var("ANTHROPIC_API_KEY", "sk-test");
        let cfg = api_cfg("ENV").resolve().unwrap();
        assert_eq!(cfg.api.unwrap().api_key, "sk-test");

        env::remove_var("ANTHROPIC_API_KEY");
        let err = api_cfg("env").resolve().unwrap_err().to_string();
        assert!(err.contains("ANTHROPIC_API_KEY"), "{err}");
    }

    #[test]
    #[serial]
    fn ollama_url_env_overrides_config() {
        env::set_var(ENV_OLLAMA_URL, "http://gpu-box:11434/");
        let cfg = LlmConfig {
            kind: JudgeKind::Local,
            local: Some(LocalLlmConfig {
                model: "llama3.2:3b".into(),
                base_url: default_local_url(),
                timeout_secs: 60,
            }),
            api: None,
        }
        .resolve()
        .unwrap();
        env::remove_var(ENV_OLLAMA_URL);
        assert_eq!(cfg.local.unwrap().base_url, "http://gpu-box:11434");
    }

    #[test]
    fn primary_section_must_exist() {
        let cfg = LlmConfig {
            kind: JudgeKind::Local,
            local: None,
            api: None,
        };
        assert!(cfg.resolve().unwrap_err().to_string().contains("llm.local"));
    }

    #[test]
    fn provider_names_deserialize_lowercase() {
        let p: ApiProvider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(p, ApiProvider::OpenAi);
    }
}
