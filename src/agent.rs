use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::{LanguageModel, OpenAIClient};
use crate::message::{Message, Role};
use crate::tool::ToolRegistry;
use crate::tools::literature_toolkit;

/// Context handed to the agent for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentInput {
    Question(String),
    Transcript(Vec<Message>),
}

impl AgentInput {
    fn into_messages(self) -> Vec<Message> {
        match self {
            AgentInput::Question(question) => vec![Message::user(question)],
            AgentInput::Transcript(messages) => messages,
        }
    }
}

/// Outcome of one agent invocation.
///
/// `messages` holds what the agent produced during the run (tool traffic and
/// the final reply, in order); the last entry is the answer. `error` is set
/// when the run ended without finishing normally.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentResponse {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The capability the dispatcher talks to: one opaque invocation per question.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn invoke(&self, input: AgentInput) -> Result<AgentResponse>;
}

/// A reasoning + tool-call loop over a chat model.
pub struct Agent<M: LanguageModel> {
    system_prompt: String,
    model: Arc<M>,
    tools: ToolRegistry,
    max_steps: usize,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            model,
            tools: ToolRegistry::new(),
            max_steps: 8,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop until the model replies without calling a tool.
    pub async fn run(&self, input: AgentInput) -> Result<AgentResponse> {
        let mut context = vec![Message::system(&self.system_prompt)];
        context.extend(
            input
                .into_messages()
                .into_iter()
                .filter(|m| m.role != Role::System),
        );
        let mut produced: Vec<Message> = Vec::new();
        let tools = self.tools.describe();

        for step in 0..self.max_steps {
            let mut request = context.clone();
            request.extend(produced.iter().cloned());
            let completion = self.model.complete_chat(&request, &tools).await?;

            if !completion.tool_calls.is_empty() {
                for mut call in completion.tool_calls {
                    if call.id.is_none() {
                        call.id = Some(format!("call-{step}-{}", produced.len()));
                    }
                    let call_id = call.id.clone();
                    let name = call.name.clone();
                    let arguments = call.arguments.clone();
                    produced.push(Message::assistant_tool_call(call));

                    tracing::info!(tool = %name, %arguments, "agent calling tool");
                    let output = match self.tools.call(&name, arguments).await {
                        Ok(value) => value,
                        Err(err) => {
                            tracing::warn!(tool = %name, error = %err, "tool call failed");
                            json!({ "error": err.to_string() })
                        }
                    };
                    produced.push(Message::tool_with_call(&name, output, call_id));
                }
                continue;
            }

            return Ok(match completion.content {
                Some(content) if !content.is_empty() => {
                    produced.push(Message::assistant(content));
                    AgentResponse {
                        messages: produced,
                        error: None,
                    }
                }
                _ => {
                    tracing::warn!(step, "model returned neither content nor tool calls");
                    AgentResponse::default()
                }
            });
        }

        Ok(AgentResponse {
            messages: produced,
            error: Some(format!(
                "agent reached the step limit ({}) without returning a response",
                self.max_steps
            )),
        })
    }
}

#[async_trait]
impl<M: LanguageModel + 'static> AgentRunner for Agent<M> {
    async fn invoke(&self, input: AgentInput) -> Result<AgentResponse> {
        self.run(input).await
    }
}

/// Build the production agent: configured chat model, persona prompt and
/// the PubMed search tool.
pub fn build_agent(cfg: &AppConfig) -> Result<Arc<dyn AgentRunner>> {
    let model = Arc::new(OpenAIClient::from_config(&cfg.model)?);
    let agent = Agent::new(model)
        .with_system_prompt(cfg.assistant.system_prompt.clone())
        .with_tools(literature_toolkit(&cfg.pubmed))
        .with_max_steps(cfg.assistant.max_steps);
    tracing::debug!(
        model = %cfg.model.model,
        tools = ?agent.tools().names(),
        "agent created"
    );
    Ok(Arc::new(agent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::error::OncoError;
    use crate::llm::{ModelCompletion, StubModel};
    use crate::tool::{Tool, ToolDescription};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the `text` field back"
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input["text"].clone())
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(OncoError::Protocol("upstream unavailable".into()))
        }
    }

    fn echo_tools() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools
    }

    #[tokio::test]
    async fn returns_llm_response_without_tools() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"Hello!"}"#.into()]);
        let agent = Agent::new(model);

        let response = agent.run(AgentInput::Question("hi".into())).await.unwrap();

        assert_eq!(response.error, None);
        assert_eq!(response.messages, vec![Message::assistant("Hello!")]);
    }

    #[tokio::test]
    async fn executes_tool_then_replies() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"echo","arguments":{"text":"ping"}}"#.into(),
            r#"{"action":"respond","content":"Echoed your request."}"#.into(),
        ]);
        let agent = Agent::new(model).with_tools(echo_tools());

        let response = agent.run(AgentInput::Question("say ping".into())).await.unwrap();

        assert_eq!(response.messages.len(), 3);
        assert_eq!(response.messages[1].role, Role::Tool);
        assert_eq!(response.messages[1].content, "ping");
        assert_eq!(
            response.messages.last().unwrap().content,
            "Echoed your request."
        );
    }

    #[tokio::test]
    async fn tool_failure_is_fed_back_to_the_model() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"broken","arguments":{}}"#.into(),
            r#"{"action":"respond","content":"I could not search right now."}"#.into(),
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(BrokenTool);
        let agent = Agent::new(model).with_tools(tools);

        let response = agent.run(AgentInput::Question("q".into())).await.unwrap();

        let tool_msg = &response.messages[1];
        assert!(tool_msg.content.contains("upstream unavailable"));
        assert_eq!(response.error, None);
    }

    #[tokio::test]
    async fn silent_model_yields_empty_response() {
        let model = StubModel::new(vec![r#"{"action":"silent"}"#.into()]);
        let agent = Agent::new(model);

        let response = agent.run(AgentInput::Question("q".into())).await.unwrap();

        assert!(response.messages.is_empty());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn whitespace_reply_is_kept() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":" \n"}"#.into()]);
        let agent = Agent::new(model);

        let response = agent.run(AgentInput::Question("q".into())).await.unwrap();

        assert_eq!(response.messages, vec![Message::assistant(" \n")]);
    }

    #[tokio::test]
    async fn step_limit_sets_error() {
        let call = r#"{"action":"call_tool","name":"echo","arguments":{"text":"again"}}"#;
        let model = StubModel::new(vec![call.into(), call.into()]);
        let agent = Agent::new(model)
            .with_tools(echo_tools())
            .with_max_steps(2);

        let response = agent.run(AgentInput::Question("loop".into())).await.unwrap();

        assert_eq!(response.messages.len(), 4);
        assert!(response.error.unwrap().contains("step limit"));
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let agent = Agent::new(StubModel::new(Vec::new()));
        let err = agent.run(AgentInput::Question("q".into())).await.unwrap_err();
        assert!(matches!(err, OncoError::LanguageModel(_)));
    }

    #[tokio::test]
    async fn request_includes_persona_and_input_context() {
        #[derive(Default)]
        struct RecordingModel {
            requests: std::sync::Mutex<Vec<Vec<Message>>>,
        }

        #[async_trait]
        impl LanguageModel for RecordingModel {
            async fn complete_chat(
                &self,
                messages: &[Message],
                _tools: &[ToolDescription],
            ) -> Result<ModelCompletion> {
                self.requests.lock().unwrap().push(messages.to_vec());
                Ok(ModelCompletion {
                    content: Some("ok".into()),
                    tool_calls: Vec::new(),
                })
            }
        }

        let model = Arc::new(RecordingModel::default());
        let agent = Agent::new(model.clone()).with_system_prompt("Be kind.");

        let input = AgentInput::Transcript(vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
        ]);
        agent.run(input).await.unwrap();

        let requests = model.requests.lock().unwrap();
        let request = requests.first().expect("request captured");
        assert_eq!(request[0], Message::system("Be kind."));
        assert_eq!(request.len(), 4);
        assert_eq!(request[3].content, "second");
    }

    #[test]
    fn build_agent_requires_credentials() {
        let cfg = AppConfig::default();
        assert!(matches!(build_agent(&cfg), Err(OncoError::Config(_))));
    }
}
