//! The controller: session lifecycle, single-flight turn guard, timeout,
//! and cancellation.

use std::sync::Arc;

use repl_context::ContextManager;
use repl_sandbox::Sandbox;
use repl_session::{
    EntryDraft, EntryType, Layout, SessionEntry, SessionStore, SessionSummary, SessionTarget,
};
use repl_types::{Message, Provider, TurnError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::{Dispatcher, TurnOutcome};
use crate::rate::{RateController, RateEvent};

/// CLI surface the shell passes through to the core.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// `--name <s>`: open (or create) a named session.
    pub name: Option<String>,
    /// `--resume <uuid|name>`: resume an existing session.
    pub resume: Option<String>,
    /// `--list-sessions`: the shell only wants the listing.
    pub list_sessions: bool,
}

impl StartupOptions {
    /// The session target these options describe.
    #[must_use]
    pub fn target(&self) -> SessionTarget {
        if let Some(resume) = &self.resume {
            match resume.parse::<Uuid>() {
                Ok(id) => SessionTarget::Id(id),
                Err(_) => SessionTarget::Name(resume.clone()),
            }
        } else if let Some(name) = &self.name {
            SessionTarget::Name(name.clone())
        } else {
            SessionTarget::New
        }
    }
}

struct TurnState {
    context: ContextManager,
    store: SessionStore,
}

/// Owns the conversation lifecycle and exposes the single entry point the
/// shell calls per utterance.
///
/// Turns are single-flight: a second `handle` call queues behind the first.
/// Each turn runs under the configured wall-clock timeout and can be
/// cancelled cooperatively at any suspension point; both paths journal an
/// `error` entry and return the controller to idle.
pub struct Controller<P: Provider> {
    config: Config,
    dispatcher: Dispatcher<P>,
    rate: Arc<RateController>,
    state: tokio::sync::Mutex<TurnState>,
    cancel: std::sync::Mutex<CancellationToken>,
}

impl<P: Provider> Controller<P> {
    /// Open (or resume) the session described by `target` and wire the
    /// components.
    pub async fn new(
        provider: P,
        sandbox: Sandbox,
        layout: Layout,
        target: SessionTarget,
        config: Config,
    ) -> Result<Self, TurnError> {
        let provider = Arc::new(provider);
        let rate = Arc::new(RateController::new(
            config.rpm_table.clone(),
            config.retry.clone(),
        ));
        let store = SessionStore::open(layout, target).await?;
        let mut context = ContextManager::new(config.token_budget);
        replay(store.loaded_entries(), &mut context);
        let dispatcher = Dispatcher::new(provider, rate.clone(), sandbox, &config);

        Ok(Self {
            config,
            dispatcher,
            rate,
            state: tokio::sync::Mutex::new(TurnState { context, store }),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        })
    }

    /// The current session's id.
    pub async fn session_id(&self) -> Uuid {
        self.state.lock().await.store.session_id()
    }

    /// Subscribe to rate-controller countdown and backoff events.
    #[must_use]
    pub fn rate_events(&self) -> tokio::sync::broadcast::Receiver<RateEvent> {
        self.rate.subscribe()
    }

    /// A token the shell can trigger to cancel the in-flight turn.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .map(|token| token.clone())
            .unwrap_or_default()
    }

    /// Handle one user utterance and return the assistant text plus turn
    /// metadata.
    pub async fn handle(&self, utterance: &str) -> Result<TurnOutcome, TurnError> {
        let cancel = self.cancellation_token();
        let mut state = self.state.lock().await;
        let TurnState { context, store } = &mut *state;

        let result = tokio::select! {
            outcome = tokio::time::timeout(
                self.config.turn_timeout,
                self.dispatcher.run_turn(context, store, utterance),
            ) => match outcome {
                Ok(inner) => inner,
                Err(_) => Err(TurnError::Timeout(self.config.turn_timeout)),
            },
            () = cancel.cancelled() => Err(TurnError::Cancelled),
        };

        match result {
            Ok(outcome) => {
                let context_file = state.store.layout().context_file();
                state.context.save(&context_file).await?;
                Ok(outcome)
            }
            Err(err) => {
                // a cancelled token would instantly kill every later turn
                if matches!(err, TurnError::Cancelled)
                    && let Ok(mut token) = self.cancel.lock()
                {
                    *token = CancellationToken::new();
                }
                let reason = match &err {
                    TurnError::Cancelled => "cancelled".to_string(),
                    TurnError::Timeout(_) => "timeout".to_string(),
                    other => other.to_string(),
                };
                tracing::warn!(reason = %reason, "turn failed");
                state.store.append(EntryDraft::error(reason)).await?;
                Err(err)
            }
        }
    }

    /// Reset the in-memory context. The journal's `parentUuid` chain stays
    /// intact so the session file remains a faithful replay.
    pub async fn clear_context(&self) -> Result<(), TurnError> {
        let mut state = self.state.lock().await;
        state.context.clear();
        state.store.append(EntryDraft::command("clear")).await?;
        let context_file = state.store.layout().context_file();
        state.context.save(&context_file).await?;
        Ok(())
    }

    /// Enumerate known sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, TurnError> {
        let state = self.state.lock().await;
        Ok(SessionStore::list(state.store.layout()).await?)
    }

    /// Switch to another session, replaying its journal into a fresh
    /// context. Returns the session id now active.
    pub async fn resume(&self, target: SessionTarget) -> Result<Uuid, TurnError> {
        let mut state = self.state.lock().await;
        let layout = state.store.layout().clone();
        let mut store = SessionStore::open(layout, target).await?;
        let mut context = ContextManager::new(self.config.token_budget);
        replay(store.loaded_entries(), &mut context);

        let id = store.session_id();
        store
            .append(EntryDraft::command(format!("resume {id}")))
            .await?;
        *state = TurnState { context, store };
        Ok(id)
    }
}

/// Rebuild the in-memory context from a session's journaled conversation.
///
/// Only `user` and `assistant` entries carry conversational state;
/// `tool_use`, `command`, and `error` entries are history.
fn replay(entries: &[SessionEntry], context: &mut ContextManager) {
    for entry in entries {
        if matches!(entry.entry_type, EntryType::User | EntryType::Assistant)
            && let Some(message) = &entry.message
        {
            context.push(Message::new(message.role, message.content.clone()));
        }
    }
}
