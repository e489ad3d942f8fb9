//! The dispatch loop.
//!
//! One user turn: build prompt → request completion → parse → validate →
//! execute → fold the result back → repeat, bounded three ways. Parse and
//! validation failures drive correction re-prompts invisible to the user;
//! tool failures are folded into the conversation as information; only an
//! exhausted budget or an unavailable model produces an apology. The user's
//! busy gate is held for the whole turn and released on every exit path.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use taskwren_bus::BusPublisher;
use taskwren_provider::{ChatMessage, CompletionRequest, LlmProvider};
use taskwren_schema::{BusMessage, InboundMessage, OutboundMessage, UserId};

use crate::config::CoreConfig;
use crate::error::DispatchError;
use crate::gate::SessionGate;
use crate::parser::{parse_completion, ParsedOutput};
use crate::prompt;
use crate::session::{SessionStore, Turn, TurnRole};
use crate::tool::ToolRegistry;

const FALLBACK_REPLY: &str = "I'm not sure how to help with that.";

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    gate: SessionGate,
    bus: BusPublisher,
    config: CoreConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        gate: SessionGate,
        bus: BusPublisher,
        config: CoreConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            sessions,
            gate,
            bus,
            config,
        }
    }

    /// Drop the user's conversation history (the `/start` path).
    pub async fn reset_session(&self, user: UserId) -> bool {
        self.sessions.reset(user).await
    }

    /// Process one live user turn. Queued behind any in-flight turn for the
    /// same user; never fails outward, errors become an apology reply.
    pub async fn handle_inbound(&self, inbound: InboundMessage) -> OutboundMessage {
        let user = inbound.user;
        let _guard = self.gate.acquire(user).await;

        tracing::info!(%user, trace_id = %inbound.trace_id, "handling turn");
        self.sessions.append(user, Turn::user(&inbound.text)).await;

        let reply = match self.run_turn(user).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%user, error = %err, "turn failed");
                let _ = self
                    .bus
                    .publish(BusMessage::TurnFailed {
                        trace_id: inbound.trace_id,
                        error: err.to_string(),
                    })
                    .await;
                format!(
                    "Sorry, I ran into a problem ({}). Please try again.",
                    err.kind()
                )
            }
        };

        self.sessions.append(user, Turn::assistant(&reply)).await;

        let outbound = OutboundMessage::reply_to(&inbound, reply);
        let _ = self
            .bus
            .publish(BusMessage::ReplyReady {
                outbound: outbound.clone(),
            })
            .await;
        outbound
    }

    async fn run_turn(&self, user: UserId) -> Result<String, DispatchError> {
        let limits = self.config.limits.clone();
        let mut rounds = 0usize;
        let mut parse_failures = 0usize;
        let mut validation_failures = 0usize;
        let mut correction: Option<String> = None;

        // Every branch either returns or bumps one of the bounded counters,
        // so the loop terminates.
        loop {
            let messages = self.build_messages(user, correction.take(), true).await;
            let completion = self.complete(messages).await?;

            match parse_completion(&completion) {
                Err(failure) => {
                    parse_failures += 1;
                    tracing::debug!(%user, attempt = parse_failures, reason = %failure.reason, "parse failure");
                    if parse_failures > limits.parse_retries {
                        return Err(DispatchError::ToolCallParse(failure.reason));
                    }
                    correction = Some(prompt::parse_correction(&failure.reason));
                }
                Ok(ParsedOutput::Reply(text)) => {
                    return Ok(if text.is_empty() {
                        FALLBACK_REPLY.to_string()
                    } else {
                        text
                    });
                }
                Ok(ParsedOutput::Call(call)) => match self.registry.validate(&call) {
                    Err(err) => {
                        validation_failures += 1;
                        tracing::debug!(%user, attempt = validation_failures, error = %err, "validation failure");
                        if validation_failures > limits.validation_retries {
                            return Err(err);
                        }
                        correction = Some(prompt::validation_correction(&err));
                    }
                    Ok(validated) => {
                        let tool = validated.tool.clone();
                        let turn = match self.registry.execute(&validated).await {
                            Ok(result) => {
                                tracing::info!(%user, %tool, "tool executed");
                                Turn::tool_result(
                                    json!({"tool": tool, "ok": true, "result": result})
                                        .to_string(),
                                    true,
                                )
                            }
                            Err(err) => {
                                tracing::warn!(%user, %tool, error = %err, "tool failed");
                                Turn::tool_result(
                                    json!({
                                        "tool": tool,
                                        "ok": false,
                                        "error": {"kind": err.kind(), "message": err.to_string()}
                                    })
                                    .to_string(),
                                    false,
                                )
                            }
                        };
                        self.sessions.append(user, turn).await;
                        rounds += 1;
                        if rounds >= limits.max_tool_rounds {
                            tracing::warn!(%user, rounds, "tool-round budget exhausted, forcing finalization");
                            return self.finalize(user).await;
                        }
                    }
                },
            }
        }
    }

    /// Ask for a plain-text summary with no tools on offer. Whatever comes
    /// back ends the turn; a stray call shape falls back to a stock reply.
    async fn finalize(&self, user: UserId) -> Result<String, DispatchError> {
        let messages = self
            .build_messages(user, Some(prompt::finalize_instruction()), false)
            .await;
        let completion = self.complete(messages).await?;
        match parse_completion(&completion) {
            Ok(ParsedOutput::Reply(text)) if !text.is_empty() => Ok(text),
            _ => Ok(FALLBACK_REPLY.to_string()),
        }
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, DispatchError> {
        let model = &self.config.model;
        let request = CompletionRequest {
            model: model.model.clone(),
            messages,
            max_tokens: model.max_tokens,
        };
        let budget = std::time::Duration::from_secs(model.timeout_secs);
        match tokio::time::timeout(budget, self.provider.complete(request)).await {
            Err(_) => Err(DispatchError::ModelUnavailable(format!(
                "no completion within {}s",
                model.timeout_secs
            ))),
            Ok(Err(err)) => Err(DispatchError::ModelUnavailable(err.to_string())),
            Ok(Ok(text)) => Ok(text),
        }
    }

    async fn build_messages(
        &self,
        user: UserId,
        correction: Option<String>,
        with_tools: bool,
    ) -> Vec<ChatMessage> {
        let now = Utc::now();
        let system = if with_tools {
            prompt::system_prompt(now, &self.registry.catalog())
        } else {
            prompt::finalize_prompt(now)
        };

        let mut messages = vec![ChatMessage::system(system)];
        for turn in self.sessions.history(user).await {
            messages.push(match turn.role {
                TurnRole::User => ChatMessage::user(turn.text),
                TurnRole::Assistant => ChatMessage::assistant(turn.text),
                TurnRole::ToolResult { .. } => {
                    ChatMessage::user(format!("Tool result: {}", turn.text))
                }
                TurnRole::Proactive => ChatMessage::assistant(turn.text),
            });
        }
        if let Some(hint) = correction {
            messages.push(ChatMessage::system(hint));
        }
        messages
    }
}
