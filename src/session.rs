use std::sync::Arc;

use crate::agent::{build_agent, AgentRunner};
use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{OncoError, Result};
use crate::message::Message;
use crate::store::SessionStore;

/// Creates the agent a session talks to. Called lazily, and again after
/// [`Session::reset_agent`].
pub type AgentFactory = Arc<dyn Fn() -> Result<Arc<dyn AgentRunner>> + Send + Sync>;

/// Factory backed by the application configuration.
pub fn config_agent_factory(cfg: Arc<AppConfig>) -> AgentFactory {
    Arc::new(move || build_agent(&cfg))
}

/// One interactive chat session: its transcript, its dispatcher and its
/// agent binding. Operations are strictly sequential; `&mut self` on
/// [`Session::submit`] rules out overlapping dispatches.
pub struct Session {
    store: SessionStore,
    dispatcher: Dispatcher,
    factory: AgentFactory,
    agent: Option<Arc<dyn AgentRunner>>,
    samples: Vec<String>,
}

impl Session {
    pub fn new(dispatcher: Dispatcher, factory: AgentFactory) -> Self {
        Self {
            store: SessionStore::new(),
            dispatcher,
            factory,
            agent: None,
            samples: Vec::new(),
        }
    }

    pub fn from_config(cfg: &AppConfig, factory: AgentFactory) -> Self {
        Self::new(Dispatcher::new(cfg.assistant.context_policy), factory)
            .with_sample_questions(cfg.assistant.sample_questions.clone())
    }

    pub fn with_sample_questions(mut self, samples: Vec<String>) -> Self {
        self.samples = samples;
        self
    }

    pub fn transcript(&self) -> &[Message] {
        self.store.read()
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn sample_questions(&self) -> &[String] {
        &self.samples
    }

    fn agent(&mut self) -> Result<Arc<dyn AgentRunner>> {
        if let Some(agent) = &self.agent {
            return Ok(Arc::clone(agent));
        }
        let agent = (self.factory)()?;
        self.agent = Some(Arc::clone(&agent));
        Ok(agent)
    }

    /// Submit a question and wait for the reply.
    ///
    /// Blank input is ignored and returns `None`. Otherwise the user message
    /// and exactly one assistant message are appended, and the assistant
    /// message is returned.
    pub async fn submit(&mut self, text: &str) -> Option<&Message> {
        if text.trim().is_empty() {
            return None;
        }
        let question = text.to_string();
        tracing::info!(question = %question, "user question received");

        let prior = self.store.read().to_vec();
        self.push(Message::user(question.clone()));
        self.store.request_input_clear();

        let answer = match self.agent() {
            Ok(agent) => {
                self.dispatcher
                    .answer(agent.as_ref(), &question, &prior)
                    .await
            }
            Err(err) => self.dispatcher.classify(Err(err)),
        };
        tracing::info!(answer = %answer, "assistant answer recorded");
        self.push(Message::assistant(answer));
        self.store.read().last()
    }

    /// Submit one of the configured sample questions.
    pub async fn ask_sample(&mut self, index: usize) -> Result<Option<&Message>> {
        let question = self.samples.get(index).cloned().ok_or_else(|| {
            OncoError::Protocol(format!(
                "sample question {index} out of range (have {})",
                self.samples.len()
            ))
        })?;
        tracing::info!(index, "sample question selected");
        Ok(self.submit(&question).await)
    }

    pub fn clear_chat(&mut self) {
        self.store.reset();
        tracing::info!("chat cleared");
    }

    /// Drop the cached agent; the next submission builds a fresh one.
    pub fn reset_agent(&mut self) {
        self.agent = None;
        tracing::info!("agent reset");
    }

    fn push(&mut self, message: Message) {
        // Only user and assistant messages are pushed from here.
        if let Err(err) = self.store.append(message) {
            tracing::error!(error = %err, "failed to record message");
        }
    }
}
