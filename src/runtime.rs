use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

use crate::error::OrchestrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    NotStarted,
    Running,
    Draining,
    Stopped,
}

/// Scheduling substrate for orchestration runs: a thin lifecycle layer over
/// the tokio executor. One instance services one or more orchestration calls
/// and must be started before use and drained after. Scheduling while not
/// Running is a programming error, not a transient failure.
pub struct Runtime {
    state: Mutex<RuntimeState>,
    outstanding: Arc<Outstanding>,
}

struct Outstanding {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the outstanding-task counter when the scheduled future
/// finishes or is aborted, so stop_when_idle never waits on a cancelled task.
struct DrainGuard(Arc<Outstanding>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct TaskHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub async fn join(&mut self) -> Result<T, JoinError> {
        (&mut self.inner).await
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RuntimeState::NotStarted),
            outstanding: Arc::new(Outstanding {
                count: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.count.load(Ordering::Acquire)
    }

    /// NotStarted -> Running. Starting from any other state is rejected: a
    /// stopped runtime stays stopped.
    pub fn start(&self) -> Result<(), OrchestrationError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            RuntimeState::NotStarted => {
                *state = RuntimeState::Running;
                tracing::debug!("runtime started");
                Ok(())
            }
            other => Err(OrchestrationError::RuntimeNotReady { state: other }),
        }
    }

    /// Spawns the future onto the executor and tracks it for idle detection.
    pub fn schedule<F, T>(&self, future: F) -> Result<TaskHandle<T>, OrchestrationError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        {
            // Admission (state check + counter increment) happens under the
            // state lock, so a drain moving to Draining observes every task
            // that was admitted while Running.
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != RuntimeState::Running {
                return Err(OrchestrationError::RuntimeNotReady { state: *state });
            }
            self.outstanding.count.fetch_add(1, Ordering::AcqRel);
        }

        // The guard is constructed before spawning so a task aborted before
        // its first poll still decrements on drop.
        let guard = DrainGuard(self.outstanding.clone());
        let inner = tokio::spawn(async move {
            let _guard = guard;
            future.await
        });

        Ok(TaskHandle { inner })
    }

    /// Running -> Draining -> Stopped. Refuses new work immediately, then
    /// waits for all outstanding tasks to finish or be aborted.
    pub async fn stop_when_idle(&self) -> Result<(), OrchestrationError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                RuntimeState::Running => *state = RuntimeState::Draining,
                other => return Err(OrchestrationError::RuntimeNotReady { state: other }),
            }
        }

        loop {
            let idle = self.outstanding.idle.notified();
            if self.outstanding.count.load(Ordering::Acquire) == 0 {
                break;
            }
            idle.await;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = RuntimeState::Stopped;
        tracing::debug!("runtime drained and stopped");
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
