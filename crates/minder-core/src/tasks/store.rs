//! SQLite-backed durable task queue.

use super::{Schedule, Task, TaskStatus};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use minder_protocol::TaskId;
use parking_lot::Mutex;
use rusqlite::{Connection, Row, params};
use std::path::Path;
use uuid::Uuid;

/// Optional constraints for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to a single status.
    pub status: Option<TaskStatus>,
    /// Restrict to children of this task.
    pub parent_id: Option<TaskId>,
}

/// Durable task queue. Every mutation validates the status transition;
/// terminal states never change except a recurring task re-arming.
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path.as_ref())?;
        info!("opened task store (path={})", path.as_ref().display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                schedule TEXT,
                parent_id TEXT,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                next_run_at TEXT,
                last_fired_minute TEXT,
                result TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_due
                ON tasks (status, next_run_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a task. Scheduled tasks get their first `next_run_at` here;
    /// a one-time task already past due fires on the next tick.
    pub fn add(
        &self,
        description: &str,
        priority: i64,
        schedule: Option<Schedule>,
        parent_id: Option<TaskId>,
        now: DateTime<Utc>,
    ) -> Result<Task, CoreError> {
        if let Some(schedule) = &schedule {
            schedule
                .validate()
                .map_err(|err| CoreError::Task(err.to_string()))?;
        }
        let next_run_at = match &schedule {
            Some(Schedule::OneTime { at }) => Some(*at),
            Some(schedule) => schedule.next_occurrence(now),
            None => None,
        };
        let schedule_json = schedule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| CoreError::Task(err.to_string()))?;

        let conn = self.conn.lock();
        if let Some(parent_id) = parent_id {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
                params![parent_id.to_string()],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(CoreError::Task(format!("unknown parent task: {parent_id}")));
            }
        }
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks WHERE parent_id IS ?1",
            params![parent_id.map(|id| id.to_string())],
            |row| row.get(0),
        )?;

        let task = Task {
            id: Uuid::new_v4(),
            description: description.to_string(),
            priority,
            status: TaskStatus::Pending,
            schedule,
            parent_id,
            position,
            created_at: now,
            next_run_at,
            result: None,
        };
        conn.execute(
            "INSERT INTO tasks
                (id, description, priority, status, schedule, parent_id,
                 position, created_at, next_run_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.id.to_string(),
                task.description,
                task.priority,
                task.status.as_str(),
                schedule_json,
                task.parent_id.map(|id| id.to_string()),
                task.position,
                task.created_at,
                task.next_run_at,
            ],
        )?;
        info!(
            "task created (task_id={}, scheduled={}, next_run_at={:?})",
            task.id,
            task.schedule.is_some(),
            task.next_run_at
        );
        Ok(task)
    }

    pub fn get(&self, task_id: TaskId) -> Result<Option<Task>, CoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![task_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(task_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// List tasks, highest priority first, then sibling position.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError> {
        let conn = self.conn.lock();
        let mut sql = format!("SELECT {COLUMNS} FROM tasks WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        if let Some(parent_id) = filter.parent_id {
            sql.push_str(" AND parent_id = ?");
            args.push(parent_id.to_string());
        }
        sql.push_str(" ORDER BY priority DESC, position ASC");

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(args.iter()))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(task_from_row(row)?);
        }
        Ok(tasks)
    }

    /// Tasks due at `now`: pending, scheduled, and not already fired in
    /// this same minute. Highest priority first.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<Task>, CoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM tasks
             WHERE status = 'pending'
               AND next_run_at IS NOT NULL AND next_run_at <= ?1
               AND (last_fired_minute IS NULL OR last_fired_minute != ?2)
             ORDER BY priority DESC, position ASC"
        ))?;
        let mut rows = stmt.query(params![now, minute_key(now)])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(task_from_row(row)?);
        }
        Ok(tasks)
    }

    /// Take a due task into the running state, stamping the fired minute
    /// so the same cron occurrence never fires twice.
    pub fn mark_fired(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<Task, CoreError> {
        self.transition(task_id, TaskStatus::Running, |conn| {
            conn.execute(
                "UPDATE tasks SET last_fired_minute = ?2 WHERE id = ?1",
                params![task_id.to_string(), minute_key(now)],
            )?;
            Ok(())
        })
    }

    /// Record the outcome of a run. A recurring task re-arms to pending
    /// with its next occurrence; anything else goes terminal.
    ///
    /// Returns `false` without writing when the task is no longer running
    /// (e.g. it was cancelled mid-run).
    pub fn complete(
        &self,
        task_id: TaskId,
        success: bool,
        result: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let Some(task) = self.get(task_id)? else {
            return Err(CoreError::Task(format!("unknown task: {task_id}")));
        };
        if task.status != TaskStatus::Running {
            debug!(
                "completion ignored, task no longer running (task_id={}, status={})",
                task_id,
                task.status.as_str()
            );
            return Ok(false);
        }

        let rearm = matches!(task.schedule, Some(Schedule::Recurring { .. }));
        let (status, next_run_at) = if rearm {
            let next = task
                .schedule
                .as_ref()
                .and_then(|schedule| schedule.next_occurrence(now));
            (TaskStatus::Pending, next)
        } else if success {
            (TaskStatus::Done, None)
        } else {
            (TaskStatus::Failed, None)
        };

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tasks SET status = ?2, next_run_at = ?3, result = ?4 WHERE id = ?1",
            params![task_id.to_string(), status.as_str(), next_run_at, result],
        )?;
        info!(
            "task run recorded (task_id={}, success={}, rearmed={})",
            task_id, success, rearm
        );
        Ok(true)
    }

    /// Cancel a task. Pending tasks cancel immediately; running tasks are
    /// cancelled best-effort (the in-flight run is not interrupted, but
    /// its completion will be ignored).
    pub fn cancel(&self, task_id: TaskId) -> Result<Task, CoreError> {
        self.transition(task_id, TaskStatus::Cancelled, |_| Ok(()))
    }

    fn transition(
        &self,
        task_id: TaskId,
        next: TaskStatus,
        extra: impl FnOnce(&Connection) -> Result<(), CoreError>,
    ) -> Result<Task, CoreError> {
        let Some(task) = self.get(task_id)? else {
            return Err(CoreError::Task(format!("unknown task: {task_id}")));
        };
        if !task.status.can_transition_to(next) {
            return Err(CoreError::Task(format!(
                "invalid status transition: {} -> {}",
                task.status.as_str(),
                next.as_str()
            )));
        }
        {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE tasks SET status = ?2 WHERE id = ?1",
                params![task_id.to_string(), next.as_str()],
            )?;
            extra(&conn)?;
        }
        debug!(
            "task transition (task_id={}, from={}, to={})",
            task_id,
            task.status.as_str(),
            next.as_str()
        );
        self.get(task_id)?
            .ok_or_else(|| CoreError::Task(format!("unknown task: {task_id}")))
    }

    /// Delete a task and every descendant.
    pub fn delete(&self, task_id: TaskId) -> Result<usize, CoreError> {
        let conn = self.conn.lock();
        let mut to_delete = vec![task_id.to_string()];
        let mut frontier = vec![task_id.to_string()];
        while let Some(parent) = frontier.pop() {
            let mut stmt = conn.prepare("SELECT id FROM tasks WHERE parent_id = ?1")?;
            let mut rows = stmt.query(params![parent])?;
            while let Some(row) = rows.next()? {
                let child: String = row.get(0)?;
                to_delete.push(child.clone());
                frontier.push(child);
            }
        }
        let mut deleted = 0;
        for id in &to_delete {
            deleted += conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        }
        if deleted == 0 {
            warn!("delete of unknown task (task_id={})", task_id);
        }
        Ok(deleted)
    }

    /// Pending plus running task count, surfaced in the system preamble.
    pub fn count_active(&self) -> Result<usize, CoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status IN ('pending', 'running')",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

const COLUMNS: &str = "id, description, priority, status, schedule, parent_id, \
                       position, created_at, next_run_at, result";

fn minute_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M").to_string()
}

fn task_from_row(row: &Row<'_>) -> Result<Task, CoreError> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let schedule: Option<String> = row.get(4)?;
    let parent_id: Option<String> = row.get(5)?;
    Ok(Task {
        id: parse_id(&id)?,
        description: row.get(1)?,
        priority: row.get(2)?,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| CoreError::Task(format!("unknown status in store: {status}")))?,
        schedule: schedule
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|err| CoreError::Task(err.to_string()))?,
        parent_id: parent_id.as_deref().map(parse_id).transpose()?,
        position: row.get(6)?,
        created_at: row.get(7)?,
        next_run_at: row.get(8)?,
        result: row.get(9)?,
    })
}

fn parse_id(raw: &str) -> Result<TaskId, CoreError> {
    Uuid::parse_str(raw).map_err(|err| CoreError::Task(format!("bad task id '{raw}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, 8, 30, 0).single().expect("ts")
    }

    #[test]
    fn add_and_get_round_trip() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store
            .add(
                "water the plants",
                1,
                Some(Schedule::Recurring {
                    expr: "0 9 * * *".to_string(),
                }),
                None,
                now(),
            )
            .expect("add");
        let loaded = store.get(task.id).expect("get").expect("present");
        assert_eq!(loaded, task);
        assert_eq!(
            loaded.next_run_at,
            Some(Utc.with_ymd_and_hms(2026, 8, 25, 9, 0, 0).single().expect("ts"))
        );
    }

    #[test]
    fn bad_schedule_is_rejected_at_creation() {
        let store = TaskStore::open_in_memory().expect("store");
        let err = store
            .add(
                "broken",
                0,
                Some(Schedule::Recurring {
                    expr: "not a schedule".to_string(),
                }),
                None,
                now(),
            )
            .expect_err("invalid");
        assert!(matches!(err, CoreError::Task(_)));
    }

    #[test]
    fn one_time_task_fires_once_and_goes_terminal() {
        let store = TaskStore::open_in_memory().expect("store");
        let at = now() - Duration::minutes(5);
        let task = store
            .add("remind me", 0, Some(Schedule::OneTime { at }), None, now())
            .expect("add");

        let due = store.due(now()).expect("due");
        assert_eq!(due.len(), 1);
        store.mark_fired(task.id, now()).expect("fired");
        assert!(store.complete(task.id, true, "reminded", now()).expect("complete"));

        let finished = store.get(task.id).expect("get").expect("present");
        assert_eq!(finished.status, TaskStatus::Done);
        assert_eq!(finished.next_run_at, None);
        assert!(store.due(now()).expect("due").is_empty());
    }

    #[test]
    fn recurring_task_rearms_after_completion() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store
            .add(
                "check the mail",
                0,
                Some(Schedule::Recurring {
                    expr: "30 8 * * *".to_string(),
                }),
                None,
                now() - Duration::days(1),
            )
            .expect("add");

        // due at today's 08:30 occurrence
        let due = store.due(now()).expect("due");
        assert_eq!(due.len(), 1);
        store.mark_fired(task.id, now()).expect("fired");
        store.complete(task.id, true, "no mail", now()).expect("complete");

        let rearmed = store.get(task.id).expect("get").expect("present");
        assert_eq!(rearmed.status, TaskStatus::Pending);
        assert_eq!(
            rearmed.next_run_at,
            Some(Utc.with_ymd_and_hms(2026, 8, 25, 8, 30, 0).single().expect("ts"))
        );
        // same minute never fires twice
        assert!(store.due(now()).expect("due").is_empty());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.add("todo", 0, None, None, now()).expect("add");
        store.cancel(task.id).expect("cancel");
        let err = store.mark_fired(task.id, now()).expect_err("terminal");
        assert!(matches!(err, CoreError::Task(_)));
    }

    #[test]
    fn completion_after_cancel_is_ignored() {
        let store = TaskStore::open_in_memory().expect("store");
        let at = now() - Duration::minutes(1);
        let task = store
            .add("long job", 0, Some(Schedule::OneTime { at }), None, now())
            .expect("add");
        store.mark_fired(task.id, now()).expect("fired");
        store.cancel(task.id).expect("cancel running");

        assert!(!store.complete(task.id, true, "late", now()).expect("ignored"));
        let cancelled = store.get(task.id).expect("get").expect("present");
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert_eq!(cancelled.result, None);
    }

    #[test]
    fn delete_cascades_to_descendants() {
        let store = TaskStore::open_in_memory().expect("store");
        let root = store.add("trip", 0, None, None, now()).expect("root");
        let child = store
            .add("book flights", 0, None, Some(root.id), now())
            .expect("child");
        let grandchild = store
            .add("pick seats", 0, None, Some(child.id), now())
            .expect("grandchild");

        assert_eq!(store.delete(root.id).expect("delete"), 3);
        assert!(store.get(grandchild.id).expect("get").is_none());
    }

    #[test]
    fn siblings_keep_insertion_order_within_priority() {
        let store = TaskStore::open_in_memory().expect("store");
        let root = store.add("plan", 0, None, None, now()).expect("root");
        let first = store.add("a", 0, None, Some(root.id), now()).expect("a");
        let second = store.add("b", 0, None, Some(root.id), now()).expect("b");
        let urgent = store.add("c", 5, None, Some(root.id), now()).expect("c");

        let children = store
            .list(&TaskFilter {
                status: None,
                parent_id: Some(root.id),
            })
            .expect("list");
        let ids: Vec<TaskId> = children.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![urgent.id, first.id, second.id]);
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let store = TaskStore::open_in_memory().expect("store");
        let err = store
            .add("orphan", 0, None, Some(Uuid::new_v4()), now())
            .expect_err("unknown parent");
        assert!(matches!(err, CoreError::Task(_)));
    }
}
