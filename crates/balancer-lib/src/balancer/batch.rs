//! Pending task queue used while batch mode is on

use crate::error::{BalancerError, Result};
use crate::models::Task;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub(crate) struct BatchQueue {
    enabled: bool,
    pending: VecDeque<(Instant, Task)>,
}

impl BatchQueue {
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn enable(&mut self) {
        self.enabled = true;
    }

    /// Turn batch mode off and hand back whatever was queued
    pub(crate) fn disable(&mut self) -> Vec<Task> {
        self.enabled = false;
        self.drain()
    }

    pub(crate) fn drain(&mut self) -> Vec<Task> {
        self.pending.drain(..).map(|(_, task)| task).collect()
    }

    /// Queue a task; returns whether a full batch is now waiting
    pub(crate) fn push(&mut self, task: Task, batch_size: usize, now: Instant) -> Result<bool> {
        if !self.enabled {
            return Err(BalancerError::BatchModeDisabled);
        }
        self.pending.push_back((now, task));
        Ok(self.pending.len() >= batch_size)
    }

    /// Remove the next batch if one is due
    ///
    /// A batch is due when `batch_size` tasks are queued, or when the oldest
    /// queued task has waited at least `timeout`, in which case everything
    /// queued is released.
    pub(crate) fn take(&mut self, batch_size: usize, timeout: Duration, now: Instant) -> Vec<Task> {
        if self.pending.len() >= batch_size {
            return self
                .pending
                .drain(..batch_size)
                .map(|(_, task)| task)
                .collect();
        }

        let overdue = self
            .pending
            .front()
            .is_some_and(|(queued_at, _)| now.saturating_duration_since(*queued_at) >= timeout);
        if overdue {
            self.drain()
        } else {
            Vec::new()
        }
    }
}
