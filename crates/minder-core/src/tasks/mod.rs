//! Durable task queue: one-time reminders, recurring schedules, and
//! hierarchical todo items.

mod cron;
mod store;

pub use cron::{CronSpec, ScheduleParseError, ScheduleSpec};
pub use store::{TaskFilter, TaskStore};

use chrono::{DateTime, Utc};
use minder_protocol::TaskId;
use serde::{Deserialize, Serialize};

/// When a task fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Schedule {
    /// Fires once at the given time, then the task is terminal.
    OneTime { at: DateTime<Utc> },
    /// Fires on a cron expression or an "every <n><m|h|d>" interval,
    /// re-arming after every run.
    Recurring { expr: String },
}

impl Schedule {
    /// Validate a recurring expression up front so bad input fails at
    /// creation rather than at fire time.
    pub fn validate(&self) -> Result<(), ScheduleParseError> {
        match self {
            Schedule::OneTime { .. } => Ok(()),
            Schedule::Recurring { expr } => ScheduleSpec::parse(expr).map(|_| ()),
        }
    }

    /// First fire time strictly after `after`.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::OneTime { at } => (*at > after).then_some(*at),
            Schedule::Recurring { expr } => {
                ScheduleSpec::parse(expr).ok()?.next_occurrence(after)
            }
        }
    }
}

/// Lifecycle of a task. Transitions only move forward: pending tasks may
/// run or be cancelled; running tasks finish or are cancelled; terminal
/// states never change (except a recurring task re-arming to pending).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the task is still in the queue's working set.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Done)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }
}

/// A scheduled or standing item of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    /// What the agent should do when the task fires. Becomes the headless
    /// user message for scheduled runs.
    pub description: String,
    /// Higher runs first when several tasks are due in the same tick.
    pub priority: i64,
    pub status: TaskStatus,
    pub schedule: Option<Schedule>,
    /// Parent task for hierarchical todos.
    pub parent_id: Option<TaskId>,
    /// Ordering among siblings.
    pub position: i64,
    pub created_at: DateTime<Utc>,
    /// Next time this task is due, if scheduled.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Result text from the most recent run.
    pub result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn one_time_schedule_never_rearms() {
        let at = Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).single().expect("ts");
        let schedule = Schedule::OneTime { at };
        assert_eq!(
            schedule.next_occurrence(at - chrono::Duration::minutes(1)),
            Some(at)
        );
        assert_eq!(schedule.next_occurrence(at), None);
    }

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
    }
}
