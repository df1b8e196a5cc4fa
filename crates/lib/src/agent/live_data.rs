//! Live-data agent: a bounded function-calling loop over the Chess.com tools.

use serde_json::Value;

use super::{history_messages, AgentError, AgentOutcome};
use crate::config::AgentsConfig;
use crate::llm::{ChatMessage, LlmBackend, ToolCall, ToolDefinition};
use crate::prompts::Prompts;
use crate::session::SessionMessage;
use crate::tools::{validate_args, ToolExecutor};

pub(crate) struct LiveDataAgent<'a> {
    pub llm: &'a dyn LlmBackend,
    pub tools: &'a dyn ToolExecutor,
    pub prompts: &'a Prompts,
    pub limits: &'a AgentsConfig,
}

fn system_prompt(base: &str, username: Option<&str>) -> String {
    match username {
        Some(u) => format!(
            "{}\n\nThe user's Chess.com username from earlier in this conversation is \"{}\". \
             Use it when they ask about themselves or their own games.",
            base, u
        ),
        None => base.to_string(),
    }
}

/// Username argument of a tool call, when present and non-empty.
fn username_arg(args: &Value) -> Option<String> {
    args.get("username")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

impl LiveDataAgent<'_> {
    /// Validate then run one call. Returns the tool message content and whether it succeeded.
    async fn run_tool(&self, defs: &[ToolDefinition], call: &ToolCall) -> (String, bool) {
        let name = call.function.name.as_str();
        let args = &call.function.arguments;
        let checked = match defs.iter().find(|d| d.function.name == name) {
            None => Err(format!("unknown tool: {}", name)),
            Some(def) => validate_args(def, args),
        };
        let result = match checked {
            Ok(()) => self.tools.execute(name, args).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(out) => (out, true),
            Err(e) => {
                log::warn!("agent: tool {} failed: {}", name, e);
                (format!("error: {}", e), false)
            }
        }
    }

    pub async fn answer(
        &self,
        query: &str,
        history: &[SessionMessage],
        username: Option<&str>,
    ) -> Result<AgentOutcome, AgentError> {
        let mut messages = vec![ChatMessage::system(system_prompt(
            &self.prompts.live_data,
            username,
        ))];
        messages.extend(history_messages(history, self.limits.history_messages));
        messages.push(ChatMessage::user(query));

        let defs = self.tools.definitions();
        let mut learned_username: Option<String> = None;

        for round in 0..self.limits.max_tool_rounds {
            let res = self.llm.chat(messages.clone(), Some(defs.clone())).await?;
            let mut calls = res.tool_calls().to_vec();
            if calls.is_empty() {
                return Ok(AgentOutcome {
                    username: learned_username,
                    ..AgentOutcome::text(res.content().trim())
                });
            }
            log::debug!("agent: round {} with {} tool call(s)", round + 1, calls.len());
            for (i, call) in calls.iter_mut().enumerate() {
                if call.id.is_empty() {
                    call.id = format!("call_{}_{}", round, i);
                }
            }

            let mut assistant = ChatMessage::assistant(res.content());
            assistant.tool_calls = Some(calls.clone());
            messages.push(assistant);
            for call in &calls {
                let (content, ok) = self.run_tool(&defs, call).await;
                if ok {
                    if let Some(u) = username_arg(&call.function.arguments) {
                        learned_username = Some(u);
                    }
                }
                messages.push(ChatMessage::tool(call.id.clone(), content));
            }
        }

        log::debug!(
            "agent: max tool rounds ({}) reached, asking for a final answer",
            self.limits.max_tool_rounds
        );
        let res = self.llm.chat(messages, None).await?;
        Ok(AgentOutcome {
            username: learned_username,
            ..AgentOutcome::text(res.content().trim())
        })
    }
}
