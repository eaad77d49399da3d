//! Tool-calling conversational agent.
//!
//! One [`ToolAgent::respond`] call is one user turn:
//!
//! 1. The user text is appended to the [`Session`].
//! 2. The model is asked for a reply, with a system prompt describing the
//!    profile schema, the tools, and the `TOOL_CALL:` format.
//! 3. A reply without markers is the answer. Otherwise every well-formed
//!    call is dispatched and the results are sent back for a final answer.
//! 4. The answer is appended to the session and returned.
//!
//! Completion failures produce [`FALLBACK_ANSWER`]; nothing is raised.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use crate::completion::{CompletionClient, CompletionRequest, Message};
use crate::config::Config;
use crate::error::CompletionError;
use crate::protocol::{contains_tool_calls, extract_tool_calls, ToolKind, ToolResult};
use crate::query_gen::PROFILE_SCHEMA;
use crate::session::Session;
use crate::tools::ToolDispatcher;

/// Returned when a completion request fails at either step.
pub const FALLBACK_ANSWER: &str = "I'm experiencing some technical difficulties accessing the \
oceanographic database. Please try again in a moment, or rephrase your question about ARGO float data.";

/// Conversational front end that lets the model call ARGO tools itself.
///
/// Unlike [`Pipeline`](crate::pipeline::Pipeline), the agent does not
/// classify the query; the model decides which tools to call, if any.
/// At most one round of tool calls is made per turn.
pub struct ToolAgent {
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolDispatcher>,
    temperature: f32,
    max_tokens: u32,
    history_turns: usize,
    system_prompt: String,
}

impl ToolAgent {
    /// Temperature, token budget and history depth come from `config`.
    pub fn new(client: Arc<dyn CompletionClient>, tools: Arc<ToolDispatcher>, config: &Config) -> Self {
        Self {
            client,
            tools,
            temperature: config.completion.agent_temperature,
            max_tokens: config.completion.max_agent_tokens,
            history_turns: config.retrieval.history_turns,
            system_prompt: system_prompt(),
        }
    }

    /// Handle one user turn.
    ///
    /// # Arguments
    ///
    /// * `session` - Conversation state. `text` and the answer are both
    ///   appended to it, including when the turn fails.
    /// * `text` - The user's message.
    ///
    /// # Returns
    ///
    /// The model's answer. If the first reply contains `TOOL_CALL:` markers,
    /// this is the follow-up reply written after the tool results were
    /// sent back. Failed tool calls are reported to the model, not to the
    /// caller. A failed completion request yields [`FALLBACK_ANSWER`].
    pub async fn respond(&self, session: &mut Session, text: &str) -> String {
        session.push_user(text);

        let answer = match self.run(session, text).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, session = %session.id(), "agent turn failed");
                FALLBACK_ANSWER.to_string()
            }
        };

        session.push_assistant(answer.clone());
        answer
    }

    async fn run(&self, session: &Session, text: &str) -> Result<String, CompletionError> {
        // The current user turn is the last history entry; send it as the
        // request's user content instead.
        let mut history = session.recent(self.history_turns + 1);
        history.pop();

        let first = self
            .client
            .complete(&self.request(history.clone(), text.to_string()))
            .await?;
        if !contains_tool_calls(&first) {
            return Ok(first);
        }

        let calls = extract_tool_calls(&first);
        debug!(calls = calls.len(), "agent requested tools");
        let results = self.tools.dispatch_all(&calls).await;

        history.push(Message::user(text));
        history.push(Message::assistant(first));
        self.client
            .complete(&self.request(history, follow_up_prompt(&results)))
            .await
    }

    fn request(&self, history: Vec<Message>, user: String) -> CompletionRequest {
        CompletionRequest::new(self.system_prompt.clone(), user)
            .with_history(history)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

fn system_prompt() -> String {
    let mut tools = String::new();
    for (i, kind) in ToolKind::ALL.iter().enumerate() {
        let schema = kind.parameters_schema();
        let params: Vec<String> = schema["properties"]
            .as_object()
            .map(|props| {
                props
                    .keys()
                    .map(|name| {
                        if kind.required_arguments().contains(&name.as_str()) {
                            format!("{} (required)", name)
                        } else {
                            format!("{} (optional)", name)
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        tools.push_str(&format!(
            "{}. {} - {}\n   Parameters: {}\n",
            i + 1,
            kind.name(),
            kind.description(),
            params.join(", ")
        ));
    }

    format!(
        "You are an expert oceanographic data analyst specializing in ARGO float data.\n\n\
         {}\n\n\
         AVAILABLE TOOLS:\n{}\n\
         Relate findings to regional context (monsoon seasonality, thermocline structure, \
         freshwater inputs) and use proper oceanographic units.\n\n\
         When you need to use a tool, format your response as:\n\
         TOOL_CALL: {{\"tool\": \"toolName\", \"arguments\": {{...}}, \"call_id\": \"unique_id\"}}",
        PROFILE_SCHEMA, tools
    )
}

/// Serialize tool results for the second model call. Failed results carry
/// only their error.
pub fn follow_up_prompt(results: &[ToolResult]) -> String {
    let summary: Vec<_> = results
        .iter()
        .map(|r| {
            if r.success {
                json!({ "call_id": r.call_id, "success": true, "data": r.data, "metadata": r.metadata })
            } else {
                json!({ "call_id": r.call_id, "success": false, "error": r.error })
            }
        })
        .collect();

    format!(
        "Based on the tool execution results below, provide a comprehensive answer to the user's query.\n\n\
         TOOL RESULTS:\n{}\n\n\
         Synthesize the data into a coherent response, highlight key findings, mention data \
         quality where relevant, and use proper units.",
        serde_json::to_string_pretty(&summary).unwrap_or_default()
    )
}
