//! Turns one user question into one assistant reply.
//!
//! The dispatcher is where every failure is contained: whatever happens
//! inside the agent, [`Dispatcher::answer`] returns text fit for the chat
//! window. Failure detail goes to the log only.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentInput, AgentResponse, AgentRunner};
use crate::error::{OncoError, Result};
use crate::message::Message;

/// Reply used when the agent ran but produced nothing usable.
pub const FALLBACK_NO_ANSWER: &str = "Sorry, I couldn't find an answer.";

/// Reply used when the agent invocation itself failed.
pub const FALLBACK_ERROR: &str = "Sorry, an error occurred while processing your question.";

/// What the agent gets to see for each question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContextPolicy {
    /// Only the new question; no conversational memory.
    #[default]
    #[serde(rename = "stateless")]
    StatelessPerCall,
    /// The whole transcript so far, ending with the new question.
    #[serde(rename = "full_transcript")]
    FullTranscript,
}

impl FromStr for ContextPolicy {
    type Err = OncoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stateless" | "stateless_per_call" => Ok(Self::StatelessPerCall),
            "full_transcript" | "full" | "transcript" => Ok(Self::FullTranscript),
            other => Err(OncoError::Config(format!("unknown context policy `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    policy: ContextPolicy,
}

impl Dispatcher {
    pub fn new(policy: ContextPolicy) -> Self {
        Self { policy }
    }

    fn build_input(&self, question: &str, prior: &[Message]) -> AgentInput {
        match self.policy {
            ContextPolicy::StatelessPerCall => AgentInput::Question(question.to_string()),
            ContextPolicy::FullTranscript => {
                let mut messages = prior.to_vec();
                messages.push(Message::user(question));
                AgentInput::Transcript(messages)
            }
        }
    }

    /// Invoke the agent exactly once and classify the outcome.
    ///
    /// `prior` is the transcript before `question` was submitted.
    pub async fn answer(
        &self,
        runner: &dyn AgentRunner,
        question: &str,
        prior: &[Message],
    ) -> String {
        let input = self.build_input(question, prior);
        tracing::info!(policy = ?self.policy, "dispatching question to agent");
        let outcome = runner.invoke(input).await;
        self.classify(outcome)
    }

    /// Map an invocation outcome to the text shown to the user.
    pub fn classify(&self, outcome: Result<AgentResponse>) -> String {
        match outcome {
            Err(err) => {
                tracing::error!(error = %err, "agent invocation failed");
                FALLBACK_ERROR.to_string()
            }
            Ok(AgentResponse {
                error: Some(detail),
                messages,
            }) => {
                tracing::error!(
                    error = %detail,
                    produced = messages.len(),
                    "agent reported a failed run"
                );
                FALLBACK_ERROR.to_string()
            }
            Ok(AgentResponse { messages, .. }) => match messages.last() {
                Some(last) if !last.content.is_empty() => {
                    tracing::info!(chars = last.content.len(), "agent answered");
                    last.content.clone()
                }
                _ => {
                    tracing::warn!("agent returned no usable answer");
                    FALLBACK_NO_ANSWER.to_string()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Replays one canned outcome and records the input it was given.
    struct ScriptedAgent {
        outcome: Mutex<Option<Result<AgentResponse>>>,
        seen: Mutex<Vec<AgentInput>>,
    }

    impl ScriptedAgent {
        fn new(outcome: Result<AgentResponse>) -> Self {
            Self {
                outcome: Mutex::new(Some(outcome)),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn replying(messages: Vec<Message>) -> Self {
            Self::new(Ok(AgentResponse {
                messages,
                error: None,
            }))
        }
    }

    #[async_trait]
    impl AgentRunner for ScriptedAgent {
        async fn invoke(&self, input: AgentInput) -> Result<AgentResponse> {
            self.seen.lock().unwrap().push(input);
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(OncoError::Protocol("invoked twice".into())))
        }
    }

    #[tokio::test]
    async fn returns_last_message_verbatim() {
        let agent = ScriptedAgent::replying(vec![
            Message::tool_with_call("pubmed_search", "Title: x".into(), None),
            Message::assistant("  Early signs include...\n"),
        ]);

        let answer = Dispatcher::default().answer(&agent, "q", &[]).await;

        assert_eq!(answer, "  Early signs include...\n");
    }

    #[tokio::test]
    async fn empty_result_uses_no_answer_fallback() {
        let agent = ScriptedAgent::replying(Vec::new());
        let answer = Dispatcher::default().answer(&agent, "q", &[]).await;
        assert_eq!(answer, FALLBACK_NO_ANSWER);
    }

    #[tokio::test]
    async fn whitespace_last_message_is_returned_verbatim() {
        let agent = ScriptedAgent::replying(vec![Message::assistant(" \n")]);
        let answer = Dispatcher::default().answer(&agent, "q", &[]).await;
        assert_eq!(answer, " \n");
    }

    #[tokio::test]
    async fn empty_last_message_uses_no_answer_fallback() {
        let agent = ScriptedAgent::replying(vec![
            Message::assistant("draft"),
            Message::assistant(""),
        ]);
        let answer = Dispatcher::default().answer(&agent, "q", &[]).await;
        assert_eq!(answer, FALLBACK_NO_ANSWER);
    }

    #[tokio::test]
    async fn invocation_failure_uses_error_fallback() {
        let agent = ScriptedAgent::new(Err(OncoError::LanguageModel("connection reset".into())));
        let answer = Dispatcher::default().answer(&agent, "q", &[]).await;
        assert_eq!(answer, FALLBACK_ERROR);
    }

    #[tokio::test]
    async fn reported_error_uses_error_fallback() {
        let agent = ScriptedAgent::new(Ok(AgentResponse {
            messages: vec![Message::assistant("partial")],
            error: Some("step limit".into()),
        }));
        let answer = Dispatcher::default().answer(&agent, "q", &[]).await;
        assert_eq!(answer, FALLBACK_ERROR);
    }

    #[tokio::test]
    async fn stateless_policy_sends_only_the_question() {
        let agent = ScriptedAgent::replying(vec![Message::assistant("ok")]);
        let prior = vec![Message::user("earlier"), Message::assistant("before")];

        Dispatcher::new(ContextPolicy::StatelessPerCall)
            .answer(&agent, "now?", &prior)
            .await;

        let seen = agent.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[AgentInput::Question("now?".into())]);
    }

    #[tokio::test]
    async fn full_transcript_policy_appends_question_to_history() {
        let agent = ScriptedAgent::replying(vec![Message::assistant("ok")]);
        let prior = vec![Message::user("earlier"), Message::assistant("before")];

        Dispatcher::new(ContextPolicy::FullTranscript)
            .answer(&agent, "now?", &prior)
            .await;

        let seen = agent.seen.lock().unwrap();
        let AgentInput::Transcript(messages) = &seen[0] else {
            panic!("expected transcript input, got {:?}", seen[0]);
        };
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], Message::user("now?"));
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(
            "stateless".parse::<ContextPolicy>().unwrap(),
            ContextPolicy::StatelessPerCall
        );
        assert_eq!(
            " Full_Transcript ".parse::<ContextPolicy>().unwrap(),
            ContextPolicy::FullTranscript
        );
        assert!("sometimes".parse::<ContextPolicy>().is_err());
    }
}
