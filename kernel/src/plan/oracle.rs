// Plan Oracle
//
// External generative planner. Given a compact incident snapshot it
// returns a plan; the response is untrusted and parsed strictly.

use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{parse_plan, Plan, PlannerError};
use crate::incident::snapshot::IncidentSnapshot;

/// Producer of remediation plans.
pub trait PlanOracle: Send + Sync {
    fn propose(&self, snapshot: &IncidentSnapshot) -> Result<Plan, PlannerError>;
}

/// Default system prompt when no prompt file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a Kubernetes incident responder. Read the incident context and answer with a single JSON object:
{\"summary\": string, \"diagnosis\": string,
 \"plan\": [{\"cmd\": [kubectl args without the binary], \"namespace\": string|null, \"read_only\": bool}],
 \"recommended_fix\": {\"cmd\": [...], \"namespace\": string|null, \"read_only\": bool} | null}
Prefer read-only diagnostics. Mark every mutating command read_only=false.";

/// Planner endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub keep_alive: String,
    pub timeout_secs: u64,
    /// Optional file overriding the built-in system prompt.
    pub prompt_path: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "qwen2.5:7b".to_string(),
            temperature: 0.2,
            num_predict: 350,
            keep_alive: "30m".to_string(),
            timeout_secs: 600,
            prompt_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Planner backed by an Ollama chat endpoint.
pub struct OllamaPlanner {
    config: OracleConfig,
    system_prompt: String,
    client: reqwest::blocking::Client,
}

impl OllamaPlanner {
    pub fn new(config: OracleConfig) -> Result<Self, PlannerError> {
        if !config.provider.eq_ignore_ascii_case("ollama") {
            return Err(PlannerError::UnsupportedProvider(config.provider));
        }

        let system_prompt = match &config.prompt_path {
            Some(path) => fs::read_to_string(path).map_err(|source| PlannerError::Prompt {
                path: path.clone(),
                source,
            })?,
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlannerError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            system_prompt,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, snapshot: &IncidentSnapshot) -> Result<serde_json::Value, PlannerError> {
        let incident_json = serde_json::to_string_pretty(snapshot)
            .map_err(PlannerError::Encode)?;
        let user = format!("Incident context JSON:\n{incident_json}\n\nReturn ONLY valid JSON.");

        Ok(json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": user },
            ],
            "stream": false,
            "format": "json",
            "keep_alive": self.config.keep_alive,
            "options": {
                "num_predict": self.config.num_predict,
                "temperature": self.config.temperature,
            },
        }))
    }
}

impl PlanOracle for OllamaPlanner {
    fn propose(&self, snapshot: &IncidentSnapshot) -> Result<Plan, PlannerError> {
        let body = self.request_body(snapshot)?;
        info!(model = %self.config.model, pods = snapshot.pods.len(), "requesting plan");

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .map_err(|e| PlannerError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PlannerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|e| PlannerError::Http(format!("unreadable chat response: {e}")))?;
        let content = chat
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        debug!(len = content.len(), "planner responded");

        parse_plan(&content)
    }
}
