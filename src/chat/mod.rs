use crate::error::{Error, Result};
use crate::model::ChatModel;
use crate::session::state::ConversationState;
use futures::StreamExt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    /// Set when the exchange could not be written to disk. It is still in memory.
    pub persist_warning: Option<String>,
}

/// Events delivered by a [`TurnHandle`], in order.
#[derive(Debug)]
pub enum TurnEvent {
    Fragment(String),
    /// Always the last event. Returns ownership of the session.
    Finished {
        state: Box<ConversationState>,
        result: Result<TurnReply>,
    },
    /// The worker went away without sending [`TurnEvent::Finished`]. The
    /// session it owned is lost and must be reloaded from the store.
    Abandoned,
}

/// A turn running on the worker runtime.
pub struct TurnHandle {
    query: String,
    events: Receiver<TurnEvent>,
    cancel: CancellationToken,
}

impl TurnHandle {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn try_next(&self) -> Option<TurnEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(TurnEvent::Abandoned),
        }
    }

    /// Blocks for the next event. `None` on timeout.
    pub fn next_timeout(&self, timeout: Duration) -> Option<TurnEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(TurnEvent::Abandoned),
        }
    }

    /// Stops the stream. The turn finishes with [`Error::Cancelled`] and commits nothing.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Runs user turns against a [`ChatModel`].
#[derive(Clone)]
pub struct ChatOrchestrator {
    model: Arc<dyn ChatModel>,
    runtime_handle: Handle,
}

impl ChatOrchestrator {
    pub fn new(model: Arc<dyn ChatModel>, runtime_handle: Handle) -> Self {
        Self {
            model,
            runtime_handle,
        }
    }

    /// Streams one reply for `query`, then commits the query and reply to `state`.
    ///
    /// `on_partial` sees every fragment in arrival order. On error nothing is
    /// committed and the partial text is dropped.
    pub async fn run_turn(
        &self,
        state: &mut ConversationState,
        query: &str,
        mut on_partial: impl FnMut(&str),
    ) -> Result<TurnReply> {
        let messages = state.prompt_for(query);
        debug!(
            session_id = %state.session_id(),
            model = %self.model.model_name(),
            messages = messages.len(),
            "turn started"
        );

        let mut fragments = self.model.stream_chat(messages);
        let mut full_text = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(err) => {
                    warn!(session_id = %state.session_id(), %err, "turn failed, discarding partial reply");
                    return Err(err);
                }
            };
            on_partial(&fragment);
            full_text.push_str(&fragment);
        }

        let persist_warning = match state.commit_exchange(query, &full_text) {
            Ok(()) => None,
            Err(err) => {
                warn!(session_id = %state.session_id(), %err, "failed to persist turn");
                Some(err.to_string())
            }
        };
        info!(session_id = %state.session_id(), reply_len = full_text.len(), "turn completed");

        Ok(TurnReply {
            text: full_text,
            persist_warning,
        })
    }

    /// Moves `state` into a worker task and runs the turn there.
    ///
    /// `wake` is called after every event so the caller can schedule a redraw.
    pub fn spawn_turn<W>(&self, mut state: ConversationState, query: String, wake: W) -> TurnHandle
    where
        W: Fn() + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let handle = TurnHandle {
            query: query.clone(),
            events: rx,
            cancel: cancel.clone(),
        };

        let orchestrator = self.clone();
        self.runtime_handle.spawn(async move {
            let result = {
                let fragments = tx.clone();
                let wake = &wake;
                let turn = orchestrator.run_turn(&mut state, &query, move |fragment| {
                    let _ = fragments.send(TurnEvent::Fragment(fragment.to_string()));
                    wake();
                });
                tokio::select! {
                    result = turn => result,
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                }
            };
            if matches!(result, Err(Error::Cancelled)) {
                info!(session_id = %state.session_id(), "turn cancelled");
            }

            let _ = tx.send(TurnEvent::Finished {
                state: Box::new(state),
                result,
            });
            wake();
        });

        handle
    }
}
