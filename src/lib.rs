//! A medical-information chat assistant.
//!
//! The crate provides:
//! - A session store holding one chat transcript (`SessionStore`).
//! - A dispatcher that sends each question to the agent exactly once and
//!   always returns displayable text (`Dispatcher`).
//! - A tool-calling `Agent` over a chat-completions model, equipped with a
//!   PubMed literature search tool.
//! - An axum web front end (feature `server`).

mod agent;
mod config;
mod dispatcher;
mod error;
mod llm;
mod logging;
mod message;
mod prompt;
#[cfg(feature = "server")]
pub mod server;
mod session;
mod store;
mod tool;
pub mod tools;

pub use agent::{build_agent, Agent, AgentInput, AgentResponse, AgentRunner};
pub use config::{
    AppConfig, AssistantConfig, BrandingConfig, LoggingConfig, ModelConfig, ModelProvider,
    PubmedConfig, ServerConfig,
};
pub use dispatcher::{ContextPolicy, Dispatcher, FALLBACK_ERROR, FALLBACK_NO_ANSWER};
pub use error::{OncoError, Result};
pub use llm::{LanguageModel, ModelCompletion, OpenAIClient, StubModel};
pub use logging::init_logging;
pub use message::{Message, Role, ToolCall, ToolResult};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, SAMPLE_QUESTIONS};
pub use session::{config_agent_factory, AgentFactory, Session};
pub use store::SessionStore;
pub use tool::{Tool, ToolDescription, ToolRegistry};
