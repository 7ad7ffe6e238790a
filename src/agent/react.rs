//! Zero-shot ReAct agent: the model alternates Thought/Action/Observation
//! steps against the tool registry until it emits a `Final Answer:`.

use super::traits::Agent;
use crate::memory::{Speaker, Turn};
use crate::providers::{ChatMessage, Provider};
use crate::tools::Tool;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::fmt::Write;
use std::sync::{Arc, OnceLock};

const FINAL_ANSWER_MARKER: &str = "Final Answer:";

static ACTION_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn action_re() -> Option<&'static Regex> {
    ACTION_RE
        .get_or_init(|| {
            Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)").ok()
        })
        .as_ref()
}

/// One parsed model step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Final(String),
    Action { tool: String, input: String },
}

/// Parse a model reply into the next step.
///
/// A `Final Answer:` marker wins. Otherwise an `Action:`/`Action Input:` pair
/// names a tool call. A reply with neither is treated as the answer itself.
pub(crate) fn parse_step(reply: &str) -> Step {
    // Drop anything the model invented past its own action.
    let reply = reply
        .split("\nObservation:")
        .next()
        .unwrap_or(reply)
        .trim();

    if let Some(idx) = reply.find(FINAL_ANSWER_MARKER) {
        return Step::Final(reply[idx + FINAL_ANSWER_MARKER.len()..].trim().to_string());
    }

    if let Some(caps) = action_re().and_then(|re| re.captures(reply)) {
        let tool = caps.get(1).map_or("", |m| m.as_str()).trim();
        let input = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .trim()
            .trim_matches('"');
        if !tool.is_empty() {
            return Step::Action {
                tool: tool.to_string(),
                input: input.to_string(),
            };
        }
    }

    Step::Final(reply.to_string())
}

pub struct ReactAgent {
    provider: Arc<dyn Provider>,
    tools: Vec<Arc<dyn Tool>>,
    model: String,
    temperature: f64,
    max_iterations: usize,
    instructions: Option<String>,
}

impl ReactAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Vec<Arc<dyn Tool>>,
        model: impl Into<String>,
        temperature: f64,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature,
            max_iterations: 10,
            instructions: None,
        }
    }

    /// Set the maximum model calls per message. `0` keeps the default of 10.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        if max_iterations > 0 {
            self.max_iterations = max_iterations;
        }
        self
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions.filter(|s| !s.trim().is_empty());
        self
    }

    fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub(crate) fn system_prompt(&self) -> String {
        let mut prompt = String::new();
        if let Some(instructions) = &self.instructions {
            prompt.push_str(instructions.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Have a conversation with a human, answering the following questions as best you can. \
             You have access to the following tools:\n\n",
        );
        for tool in &self.tools {
            let _ = writeln!(prompt, "{}: {}", tool.name(), tool.description());
        }
        let _ = write!(
            prompt,
            "\nUse the following format:\n\n\
             Question: the input question you must answer\n\
             Thought: you should always think about what to do\n\
             Action: the action to take, should be one of [{names}]\n\
             Action Input: the input to the action\n\
             Observation: the result of the action\n\
             ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
             Thought: I now know the final answer\n\
             Final Answer: the final answer to the original input question",
            names = self.tool_names().join(", ")
        );
        prompt
    }

    fn history_messages(history: &[Turn]) -> Vec<ChatMessage> {
        history
            .iter()
            .map(|turn| match turn.speaker {
                Speaker::User => ChatMessage::user(turn.content.clone()),
                Speaker::Agent => ChatMessage::assistant(turn.content.clone()),
            })
            .collect()
    }

    async fn observe(&self, tool_name: &str, input: &str) -> String {
        let Some(tool) = self
            .tools
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(tool_name))
        else {
            return format!(
                "{tool_name} is not a valid tool, try one of [{}].",
                self.tool_names().join(", ")
            );
        };

        match tool.execute(input).await {
            Ok(result) => result.as_observation(),
            Err(e) => {
                let detail = crate::providers::sanitize_api_error(&format!("{e:#}"));
                tracing::warn!(tool = tool.name(), "Tool call failed: {detail}");
                format!("Error: {detail}")
            }
        }
    }

    async fn answer_plain(&self, input: &str, history: &[Turn]) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(instructions) = &self.instructions {
            messages.push(ChatMessage::system(instructions.clone()));
        }
        messages.extend(Self::history_messages(history));
        messages.push(ChatMessage::user(input));
        let reply = self
            .provider
            .chat_with_history(&messages, &self.model, self.temperature)
            .await?;
        Ok(reply.trim().to_string())
    }
}

#[async_trait]
impl Agent for ReactAgent {
    async fn respond(&self, input: &str, history: &[Turn]) -> Result<String> {
        if self.tools.is_empty() {
            return self.answer_plain(input, history).await;
        }

        let system = ChatMessage::system(self.system_prompt());
        let prior = Self::history_messages(history);
        let mut scratchpad = String::new();

        for iteration in 1..=self.max_iterations {
            let mut messages = Vec::with_capacity(prior.len() + 2);
            messages.push(system.clone());
            messages.extend(prior.iter().cloned());
            messages.push(ChatMessage::user(format!(
                "Question: {input}\n{scratchpad}Thought:"
            )));

            let reply = self
                .provider
                .chat_with_history(&messages, &self.model, self.temperature)
                .await?;

            match parse_step(&reply) {
                Step::Final(answer) => {
                    tracing::debug!(iteration, "Agent reached final answer");
                    return Ok(answer);
                }
                Step::Action { tool, input: tool_input } => {
                    tracing::debug!(iteration, %tool, "Agent invoking tool");
                    let observation = self.observe(&tool, &tool_input).await;
                    let thought = reply.split("\nObservation:").next().unwrap_or(&reply);
                    let thought = thought.trim().trim_start_matches("Thought:").trim_start();
                    let _ = write!(
                        scratchpad,
                        "Thought: {thought}\nObservation: {}\n",
                        observation.trim()
                    );
                }
            }
        }

        anyhow::bail!("agent stopped after {} iterations", self.max_iterations)
    }

    fn name(&self) -> &str {
        "react"
    }
}
