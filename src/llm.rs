//! Language model abstraction and the chat-completions client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{ModelConfig, ModelProvider};
use crate::error::{OncoError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolDescription;

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> OncoError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return OncoError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    OncoError::LanguageModel(format!("{provider} request failed with {}: {body}", status))
}

fn serialize_tool_arguments(args: &Value) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| args.to_string())
}

/// How requests are addressed and authenticated.
#[derive(Clone, Debug, PartialEq)]
enum Endpoint {
    Azure {
        resource: String,
        deployment: String,
        api_version: String,
    },
    OpenAI {
        base_url: String,
    },
}

/// Client for the chat-completions protocol, on Azure OpenAI or an
/// OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            OncoError::Config("missing API key in model config (AZURE_OPENAI_API_KEY)".into())
        })?;
        let endpoint = match cfg.provider {
            ModelProvider::Azure => {
                let resource = cfg.endpoint.clone().ok_or_else(|| {
                    OncoError::Config(
                        "missing Azure endpoint in model config (AZURE_OPENAI_ENDPOINT)".into(),
                    )
                })?;
                Endpoint::Azure {
                    resource: resource.trim_end_matches('/').to_string(),
                    deployment: cfg.model.clone(),
                    api_version: cfg.api_version.clone(),
                }
            }
            ModelProvider::OpenAI => Endpoint::OpenAI {
                base_url: cfg
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
        };
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .map_err(|err| OncoError::LanguageModel(format!("http client error: {err}")))?,
            endpoint,
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }

    fn provider_label(&self) -> &'static str {
        match self.endpoint {
            Endpoint::Azure { .. } => "azure-openai",
            Endpoint::OpenAI { .. } => "openai",
        }
    }

    fn completions_url(&self) -> String {
        match &self.endpoint {
            Endpoint::Azure {
                resource,
                deployment,
                api_version,
            } => format!(
                "{resource}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            ),
            Endpoint::OpenAI { base_url } => format!("{base_url}/chat/completions"),
        }
    }

    fn build_payload(&self, messages: &[Message], tools: &[ToolDescription]) -> Value {
        let mut payload = json!({
            "messages": to_openai_messages(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if let Endpoint::OpenAI { .. } = self.endpoint {
            payload["model"] = Value::String(self.model.clone());
        }
        if let Some(tools) = to_openai_tools(tools) {
            payload["tools"] = serde_json::to_value(tools).unwrap_or(Value::Null);
            payload["tool_choice"] = Value::String("auto".to_string());
        }
        payload
    }
}

fn to_openai_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
    messages
        .iter()
        .map(|message| {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            }
            .to_string();

            let tool_calls = message.tool_call.as_ref().map(|call| {
                vec![OpenAiToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: serialize_tool_arguments(&call.arguments),
                    },
                }]
            });

            // Assistant turns that only carry a tool call have no user-visible text.
            let content = if tool_calls.is_some() {
                None
            } else {
                Some(message.content.clone())
            };

            OpenAiMessage {
                role,
                content,
                tool_call_id: message
                    .tool_result
                    .as_ref()
                    .and_then(|result| result.tool_call_id.clone()),
                tool_calls,
            }
        })
        .collect()
}

fn to_openai_tools(tools: &[ToolDescription]) -> Option<Vec<OpenAiTool>> {
    if tools.is_empty() {
        return None;
    }

    Some(
        tools
            .iter()
            .map(|tool| OpenAiTool {
                r#type: "function".to_string(),
                function: OpenAiFunction {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect(),
    )
}

fn completion_from_response(body: OpenAiResponse) -> Result<ModelCompletion> {
    let first = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OncoError::LanguageModel("model returned no choices".into()))?;

    let tool_calls = first
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            arguments: serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| Value::String(call.function.arguments.clone())),
            id: call.id,
            name: call.function.name,
        })
        .collect();

    Ok(ModelCompletion {
        content: first.message.content,
        tool_calls,
    })
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let provider = self.provider_label();
        let mut builder = self
            .http
            .post(self.completions_url())
            .json(&self.build_payload(messages, tools));
        builder = match self.endpoint {
            Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
            Endpoint::OpenAI { .. } => builder.header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            ),
        };

        let resp = builder
            .send()
            .await
            .map_err(|err| OncoError::LanguageModel(format!("{provider} request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, provider));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            OncoError::LanguageModel(format!("{provider} response parse error: {err}"))
        })?;
        completion_from_response(body)
    }
}

/// A deterministic model used for tests and demos.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond { content: String },
    CallTool { name: String, arguments: Value },
    Silent,
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let raw = self
            .responses
            .lock()
            .map_err(|_| OncoError::LanguageModel("stub model poisoned".into()))?
            .pop_front()
            .ok_or_else(|| {
                OncoError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => Ok(ModelCompletion {
                content: Some(content),
                tool_calls: Vec::new(),
            }),
            Ok(StubDirective::CallTool { name, arguments }) => Ok(ModelCompletion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: None,
                    name,
                    arguments,
                }],
            }),
            Ok(StubDirective::Silent) => Ok(ModelCompletion {
                content: None,
                tool_calls: Vec::new(),
            }),
            Err(_) => Ok(ModelCompletion {
                content: Some(raw),
                tool_calls: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn azure_config() -> ModelConfig {
        ModelConfig {
            api_key: Some("key".into()),
            endpoint: Some("https://example.openai.azure.com/".into()),
            model: "onco-gpt4o".into(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn builds_azure_deployment_url() {
        let client = OpenAIClient::from_config(&azure_config()).unwrap();
        assert_eq!(
            client.completions_url(),
            "https://example.openai.azure.com/openai/deployments/onco-gpt4o/chat/completions?api-version=2024-08-01-preview"
        );
    }

    #[test]
    fn azure_requires_endpoint_and_key() {
        let missing_endpoint = ModelConfig {
            endpoint: None,
            ..azure_config()
        };
        assert!(matches!(
            OpenAIClient::from_config(&missing_endpoint),
            Err(OncoError::Config(_))
        ));

        let missing_key = ModelConfig {
            api_key: None,
            ..azure_config()
        };
        assert!(matches!(
            OpenAIClient::from_config(&missing_key),
            Err(OncoError::Config(_))
        ));
    }

    #[test]
    fn payload_carries_sampling_limits_and_tools() {
        let cfg = ModelConfig {
            provider: ModelProvider::OpenAI,
            endpoint: None,
            ..azure_config()
        };
        let client = OpenAIClient::from_config(&cfg).unwrap();
        assert_eq!(
            client.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );

        let tools = vec![ToolDescription {
            name: "pubmed_search".into(),
            description: "Search PubMed".into(),
            parameters: None,
        }];
        let payload = client.build_payload(&[Message::user("hi")], &tools);

        assert_eq!(payload["temperature"], json!(0.0));
        assert_eq!(payload["max_tokens"], json!(1000));
        assert_eq!(payload["model"], json!("onco-gpt4o"));
        assert_eq!(payload["tools"][0]["function"]["name"], json!("pubmed_search"));
        assert_eq!(payload["tool_choice"], json!("auto"));
    }

    #[test]
    fn maps_tool_traffic_to_openai_shape() {
        let call = ToolCall {
            id: Some("call-1".into()),
            name: "pubmed_search".into(),
            arguments: json!({"query": "TMB NSCLC"}),
        };
        let messages = vec![
            Message::system("persona"),
            Message::assistant_tool_call(call),
            Message::tool_with_call("pubmed_search", json!("Title: x"), Some("call-1".into())),
        ];

        let built = to_openai_messages(&messages);

        assert_eq!(built[0].role, "system");
        assert!(built[1].content.is_none());
        let calls = built[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"query":"TMB NSCLC"}"#);
        assert_eq!(built[2].role, "tool");
        assert_eq!(built[2].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(built[2].content.as_deref(), Some("Title: x"));
    }

    #[test]
    fn parses_completion_with_tool_calls() {
        let body: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-9",
                        "type": "function",
                        "function": {"name": "pubmed_search", "arguments": "{\"query\":\"BRCA\"}"}
                    }]
                }
            }]
        }))
        .unwrap();

        let completion = completion_from_response(body).unwrap();
        assert!(completion.content.is_none());
        assert_eq!(completion.tool_calls[0].id.as_deref(), Some("call-9"));
        assert_eq!(completion.tool_calls[0].arguments, json!({"query": "BRCA"}));
    }

    #[test]
    fn empty_choices_is_an_error() {
        let body: OpenAiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(completion_from_response(body).is_err());
    }

    #[test]
    fn rate_limit_is_called_out() {
        let err = coalesce_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down", "openai");
        assert!(err.to_string().contains("rate limit"));
    }
}
