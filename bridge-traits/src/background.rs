//! Deferred-task scheduler ("background sync").
//!
//! The sync queue registers one handler under a tag and asks for a one-shot
//! run whenever there is something to deliver. On the web this maps to the
//! Background Sync API, on mobile to WorkManager or BGTaskScheduler, on
//! desktop to a tokio task.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Conditions the platform must see before running a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConstraints {
    pub requires_network: bool,
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self {
            requires_network: true,
        }
    }
}

impl TaskConstraints {
    pub fn none() -> Self {
        Self {
            requires_network: false,
        }
    }
}

/// Identifier of a scheduled run. One-shot tasks are identified by their tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for its delay or its constraints
    Pending,
    Running,
    Succeeded,
    /// The handler returned an error; the next schedule runs it again
    Failed,
}

/// Work executed when a tagged task fires.
pub type TaskHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Platform scheduler for tagged one-shot tasks.
///
/// Scheduling a tag that is still pending must not queue a second run; it
/// returns the pending run's id.
#[async_trait::async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Register (or replace) the handler for `tag`.
    async fn register_handler(&self, tag: &str, handler: TaskHandler) -> Result<()>;

    /// Run the handler for `tag` once, after `delay` and once `constraints`
    /// hold.
    ///
    /// # Errors
    ///
    /// Fails if no handler is registered for `tag` or the platform refuses
    /// the request. Callers fall back to running the work themselves.
    async fn schedule_once(
        &self,
        tag: &str,
        delay: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId>;

    /// Drop a pending run. Returns `false` if nothing was pending.
    async fn cancel(&self, task_id: &TaskId) -> Result<bool>;

    /// Last known status, `None` if the task was never scheduled.
    async fn status(&self, task_id: &TaskId) -> Option<TaskStatus>;
}
