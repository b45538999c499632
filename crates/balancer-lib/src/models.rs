//! Core data models for the load balancer

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Educational metadata attached to a content-generation task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationalContext {
    pub subject: Option<String>,
    pub grade_level: Option<u32>,
}

/// A unit of work to be dispatched to a worker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_type: Option<String>,
    pub educational_context: Option<EducationalContext>,
}

impl Task {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_context(mut self, subject: Option<&str>, grade_level: Option<u32>) -> Self {
        self.educational_context = Some(EducationalContext {
            subject: subject.map(str::to_string),
            grade_level,
        });
        self
    }

    pub fn subject(&self) -> Option<&str> {
        self.educational_context
            .as_ref()
            .and_then(|c| c.subject.as_deref())
    }

    pub fn grade_level(&self) -> Option<u32> {
        self.educational_context.as_ref().and_then(|c| c.grade_level)
    }

    pub fn has_educational_context(&self) -> bool {
        self.educational_context.is_some()
    }
}

/// One completed task as seen by a worker's rolling history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp: i64,
    pub duration_secs: f64,
    pub quality: f64,
}

/// Direction of a worker's recent task durations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadTrend {
    Increasing,
    #[default]
    Stable,
    Decreasing,
}

impl std::fmt::Display for WorkloadTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadTrend::Increasing => write!(f, "increasing"),
            WorkloadTrend::Stable => write!(f, "stable"),
            WorkloadTrend::Decreasing => write!(f, "decreasing"),
        }
    }
}

/// Outcome of a task reported back through `update_worker_performance`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub timestamp: i64,
    pub worker_id: String,
    pub duration_secs: f64,
    pub quality: f64,
    pub success: bool,
}

/// A dispatch decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub timestamp: i64,
    pub worker_id: String,
    pub strategy: String,
    pub task_type: Option<String>,
    pub candidates: usize,
}

/// Push onto a ring buffer, evicting the oldest entries beyond `cap`
pub(crate) fn push_capped<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    buf.push_back(item);
    while buf.len() > cap {
        buf.pop_front();
    }
}

/// Push, and once the buffer grows past `high_water` keep only the newest `keep`
pub(crate) fn push_trimmed<T>(buf: &mut VecDeque<T>, item: T, high_water: usize, keep: usize) {
    buf.push_back(item);
    if buf.len() > high_water {
        let excess = buf.len() - keep;
        buf.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_context_accessors() {
        let task = Task::new("t1")
            .with_type("quiz")
            .with_context(Some("math"), Some(5));
        assert_eq!(task.subject(), Some("math"));
        assert_eq!(task.grade_level(), Some(5));
        assert!(task.has_educational_context());

        let bare = Task::new("t2");
        assert_eq!(bare.subject(), None);
        assert_eq!(bare.grade_level(), None);
        assert!(!bare.has_educational_context());
    }

    #[test]
    fn test_push_capped_evicts_oldest_first() {
        let mut buf = VecDeque::new();
        for i in 0..105 {
            push_capped(&mut buf, i, 100);
        }
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.front(), Some(&5));
        assert_eq!(buf.back(), Some(&104));
    }

    #[test]
    fn test_push_trimmed_crossing_insert() {
        let mut buf = VecDeque::new();
        for i in 0..10_000 {
            push_trimmed(&mut buf, i, 10_000, 5_000);
        }
        assert_eq!(buf.len(), 10_000);

        push_trimmed(&mut buf, 10_000, 10_000, 5_000);
        assert_eq!(buf.len(), 5_000);
        assert_eq!(buf.back(), Some(&10_000));
        assert_eq!(buf.front(), Some(&5_001));
    }

    #[test]
    fn test_workload_trend_serde() {
        let json = serde_json::to_string(&WorkloadTrend::Increasing).unwrap();
        assert_eq!(json, "\"increasing\"");
        assert_eq!(WorkloadTrend::default(), WorkloadTrend::Stable);
    }
}
