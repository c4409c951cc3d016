//! Per-task execution context.
//!
//! An [`ExecutionContext`] is handed down the agent loop explicitly. Clones
//! share state and are meant for passing the context around within one task;
//! [`ExecutionContext::fork`] produces the independent copy a child task
//! starts from. Nothing a child or sibling does after the fork is visible to
//! the parent, and vice versa.

mod todo;
mod usage;

pub use todo::{TodoItem, TodoStatus};
pub use usage::TokenUsage;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::doom_loop::HistoryEntry;
use crate::guard::PathGuardMiddleware;
use crate::observability::session_span;

/// One piece of task-local state.
///
/// Reads hand out clones and writes take ownership, so no caller ever holds
/// a reference into the stored value. Locks are never held across an await.
#[derive(Debug, Default)]
pub struct StateSlot<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for StateSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Default> StateSlot<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    pub fn get(&self) -> T {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, value: T) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Mutate in place under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Restore the default and return what was there.
    pub fn reset(&self) -> T {
        std::mem::take(&mut *self.inner.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// An independent slot holding a copy of the current value.
    pub fn fork(&self) -> Self {
        Self::new(self.get())
    }
}

#[derive(Clone, Debug)]
pub struct ExecutionContext {
    session_id: String,
    token_usage: StateSlot<TokenUsage>,
    doom_history: StateSlot<VecDeque<HistoryEntry>>,
    todos: StateSlot<Vec<TodoItem>>,
    guard: Option<Arc<PathGuardMiddleware>>,
}

impl ExecutionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            token_usage: StateSlot::default(),
            doom_history: StateSlot::default(),
            todos: StateSlot::default(),
            guard: None,
        }
    }

    /// Attach the session's path guard so tools reached through this
    /// context consult it.
    pub fn with_guard(mut self, guard: Arc<PathGuardMiddleware>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn guard(&self) -> Option<&Arc<PathGuardMiddleware>> {
        self.guard.as_ref()
    }

    pub fn token_usage(&self) -> &StateSlot<TokenUsage> {
        &self.token_usage
    }

    pub fn doom_history(&self) -> &StateSlot<VecDeque<HistoryEntry>> {
        &self.doom_history
    }

    pub fn todos(&self) -> &StateSlot<Vec<TodoItem>> {
        &self.todos
    }

    pub fn record_usage(&self, usage: &TokenUsage) {
        self.token_usage.update(|total| total.add(usage));
    }

    /// Start a new logical session on this context.
    ///
    /// Clears the doom-loop history and token counters; the to-do list
    /// carries over.
    pub fn begin_session(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
        self.doom_history.reset();
        self.token_usage.reset();
        tracing::debug!(session_id = %self.session_id, "Session context reset");
    }

    /// The starting state for a child task: a copy of everything now, shared
    /// with nothing afterwards. The guard is session-wide and stays shared.
    pub fn fork(&self) -> Self {
        Self {
            session_id: self.session_id.clone(),
            token_usage: self.token_usage.fork(),
            doom_history: self.doom_history.fork(),
            todos: self.todos.fork(),
            guard: self.guard.clone(),
        }
    }

    /// Run `f` as a tokio task on a fork of this context, inside the
    /// session's span.
    pub fn spawn<F, Fut>(&self, f: F) -> JoinHandle<Fut::Output>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let span = session_span(&self.session_id);
        tokio::spawn(f(self.fork()).instrument(span))
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}
