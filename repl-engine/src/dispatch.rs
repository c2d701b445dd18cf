//! The dispatcher: two-stage tool pipeline plus the trampoline that keeps
//! re-invoking the model until it produces pure text.

use std::sync::Arc;

use repl_context::ContextManager;
use repl_sandbox::{Sandbox, parse_call, tool_declarations};
use repl_session::{EntryDraft, EntryMetadata, EntryType, SessionStore};
use repl_types::{
    GenerateRequest, ModelResponse, Provider, Role, TokenUsage, ToolCall, ToolDecision, TurnError,
};

use crate::config::Config;
use crate::decision::DecisionEngine;
use crate::rate::RateController;

/// One tool execution within a turn, in execution order.
#[derive(Debug, Clone)]
pub struct ToolUseRecord {
    /// The executed call.
    pub call: ToolCall,
    /// Whether it succeeded.
    pub ok: bool,
}

/// What a completed turn hands back to the shell.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The assistant's final text.
    pub text: String,
    /// Tool executions, in order.
    pub tool_uses: Vec<ToolUseRecord>,
    /// Token usage across the turn's model calls, when reported.
    pub usage: Option<TokenUsage>,
    /// Wall-clock duration of the turn.
    pub duration_ms: u64,
    /// Whether the trampoline cap cut the turn short.
    pub trampoline_limited: bool,
}

/// Drives one user turn end to end.
///
/// Stage one asks the decision engine whether the utterance needs a tool
/// and, if so, executes it and folds the result into an enhanced prompt.
/// Stage two sends the context to the model and trampolines any
/// function-call parts it returns, bounded by a hard iteration cap.
pub struct Dispatcher<P> {
    provider: Arc<P>,
    rate: Arc<RateController>,
    decisions: DecisionEngine<P>,
    sandbox: Sandbox,
    model: String,
    system_prompt: String,
    max_iterations: usize,
    preview_limit: usize,
}

impl<P: Provider> Dispatcher<P> {
    /// Wire a dispatcher from the resolved configuration.
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        rate: Arc<RateController>,
        sandbox: Sandbox,
        config: &Config,
    ) -> Self {
        let decisions = DecisionEngine::new(provider.clone(), rate.clone(), config);
        Self {
            provider,
            rate,
            decisions,
            sandbox,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_iterations: config.max_trampoline_iterations,
            preview_limit: config.preview_limit,
        }
    }

    /// Run one user turn: journal the utterance, classify, execute tools,
    /// trampoline, and journal the assistant's answer.
    ///
    /// Tool failures inside the turn become tool-result messages so the
    /// model can recover; only transport-level failures (after the retry
    /// policy) and journaling failures surface as errors.
    pub async fn run_turn(
        &self,
        context: &mut ContextManager,
        store: &mut SessionStore,
        utterance: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let started = std::time::Instant::now();
        let mut usage = TokenUsage::default();
        let mut saw_usage = false;
        let mut tool_uses = Vec::new();

        store.append(EntryDraft::user(utterance)).await?;
        context.add(Role::User, utterance);

        let decision = self.decisions.analyze(utterance).await?;
        tracing::debug!(
            requires_tool = decision.requires_tool_call(),
            reasoning = decision.reasoning(),
            "utterance classified"
        );

        if let ToolDecision::UseTool { call, .. } = &decision {
            let result_text = self.execute_and_journal(call, store, &mut tool_uses).await?;
            context.rewrite_last_user(format!(
                "{utterance}\n\n--- {} result ---\n{}",
                call.name(),
                truncate_preview(&result_text, self.preview_limit)
            ));
        }

        let mut response = self.call_model(context).await?;
        if let Some(reported) = &response.usage {
            usage.accumulate(reported);
            saw_usage = true;
        }

        let mut iterations = 0;
        let mut limited = false;
        while response.has_function_calls() {
            if iterations >= self.max_iterations {
                tracing::warn!(iterations, "trampoline cap reached");
                limited = true;
                break;
            }
            iterations += 1;

            // execute in the order the model emitted the calls
            for (name, args) in response.function_calls() {
                let result_text = match parse_call(name, args) {
                    Ok(call) => self.execute_and_journal(&call, store, &mut tool_uses).await?,
                    Err(parse_err) => {
                        store
                            .append(EntryDraft {
                                entry_type: EntryType::ToolUse,
                                message: None,
                                metadata: EntryMetadata {
                                    tool: Some(name.to_string()),
                                    args: Some(args.clone()),
                                    error: Some(parse_err.to_string()),
                                    ..EntryMetadata::default()
                                },
                            })
                            .await?;
                        format!("error: {parse_err}")
                    }
                };
                context.add_tool_result(name, result_text);
            }

            response = self.call_model(context).await?;
            if let Some(reported) = &response.usage {
                usage.accumulate(reported);
                saw_usage = true;
            }
        }

        let mut text = response.text();
        if limited {
            text.push_str("\n(trampoline limit reached)");
        }

        context.add(Role::Assistant, &text);
        let duration_ms = started.elapsed().as_millis() as u64;
        store
            .append(
                EntryDraft::assistant(&text)
                    .with_accounting(saw_usage.then_some(usage), duration_ms),
            )
            .await?;

        Ok(TurnOutcome {
            text,
            tool_uses,
            usage: saw_usage.then_some(usage),
            duration_ms,
            trampoline_limited: limited,
        })
    }

    /// Execute a tool call, journal the `tool_use` entry, and return the
    /// text destined for the model (the result, or the error description).
    async fn execute_and_journal(
        &self,
        call: &ToolCall,
        store: &mut SessionStore,
        tool_uses: &mut Vec<ToolUseRecord>,
    ) -> Result<String, TurnError> {
        match self.sandbox.execute(call).await {
            Ok(result) => {
                store
                    .append(EntryDraft::tool_use(
                        call,
                        truncate_preview(&result, self.preview_limit),
                    ))
                    .await?;
                tool_uses.push(ToolUseRecord {
                    call: call.clone(),
                    ok: true,
                });
                Ok(result)
            }
            Err(tool_err) => {
                tracing::debug!(tool = call.name(), error = %tool_err, "tool call failed");
                store
                    .append(EntryDraft::tool_error(call, tool_err.to_string()))
                    .await?;
                tool_uses.push(ToolUseRecord {
                    call: call.clone(),
                    ok: false,
                });
                Ok(format!("error: {tool_err}"))
            }
        }
    }

    async fn call_model(&self, context: &ContextManager) -> Result<ModelResponse, TurnError> {
        let request = GenerateRequest {
            model: self.model.clone(),
            messages: context.snapshot(),
            system: Some(self.system_prompt.clone()),
            tools: tool_declarations(),
        };
        self.rate
            .execute(&self.model, || self.provider.generate(request.clone()))
            .await
    }
}

/// Cap tool output destined for prompts and previews, marking the cut.
pub(crate) fn truncate_preview(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{cut}…(truncated)")
}
