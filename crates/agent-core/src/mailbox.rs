//! Task Mailbox
//!
//! Durable per-agent task queues used for delegation. Any agent may create a
//! task for itself or assign one to another agent; only the assignee moves a
//! task through its lifecycle and only the assigner may hand it to someone
//! else. Tasks are never deleted.
//!
//! Persistence goes through [`TaskStore`]. Every write on a [`TaskMailbox`]
//! is serialized behind one lock, so stores only need to be safe for
//! concurrent reads.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};

/// Unique task identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Task priority
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(AgentError::Other(format!(
                "unknown priority '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

/// Task lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Complete,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// One delegated unit of work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub assignee: String,
    pub assigned_by: String,
    pub priority: Priority,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Arrival order in the assignee's queue
    pub seq: u64,
}

impl Task {
    pub fn is_complete(&self) -> bool {
        self.status == TaskStatus::Complete
    }

    /// Assigned by someone other than the assignee
    pub fn is_delegated(&self) -> bool {
        self.assigned_by != self.assignee
    }
}

/// What the caller supplies when creating a task
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn due(mut self, due: NaiveDate) -> Self {
        self.due = Some(due);
        self
    }
}

/// Per-agent counts for dashboards
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub current: usize,
    pub completed: usize,
    pub delegated: usize,
}

/// Task persistence
///
/// Implementations append new records and overwrite existing ones by id;
/// nothing is ever removed.
pub trait TaskStore: Send + Sync {
    /// Add a new task
    fn insert(&self, task: &Task) -> Result<()>;

    /// Overwrite the stored record with the same id
    fn update(&self, task: &Task) -> Result<()>;

    /// Load a task by id
    fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Every task ever stored
    fn all(&self) -> Result<Vec<Task>>;
}

/// In-memory task store (for development/testing)
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn insert(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.push(task.clone());
        Ok(())
    }

    fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or(AgentError::TaskNotFound(task.id))?;
        *slot = task.clone();
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tasks.iter().find(|t| t.id == *id).cloned())
    }

    fn all(&self) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tasks.clone())
    }
}

/// Task store backed by a single JSON document in a directory.
///
/// The whole document is rewritten on every change, via a temporary file and
/// a rename so readers never see a half-written file.
#[derive(Debug)]
pub struct JsonFileTaskStore {
    path: PathBuf,
    tasks: RwLock<Vec<Task>>,
}

impl JsonFileTaskStore {
    pub const FILE_NAME: &'static str = "tasks.json";

    /// Open (or create) the store in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);

        let tasks = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    AgentError::Storage(format!("{} is not a task list: {e}", path.display()))
                })?
            }
        } else {
            Vec::new()
        };

        tracing::debug!(path = %path.display(), tasks = tasks.len(), "Opened task store");
        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tasks: &[Task]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(tasks)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TaskStore for JsonFileTaskStore {
    fn insert(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.push(task.clone());
        if let Err(err) = self.persist(&tasks) {
            tasks.pop();
            return Err(err);
        }
        Ok(())
    }

    fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let index = tasks
            .iter()
            .position(|t| t.id == task.id)
            .ok_or(AgentError::TaskNotFound(task.id))?;
        let previous = std::mem::replace(&mut tasks[index], task.clone());
        if let Err(err) = self.persist(&tasks) {
            tasks[index] = previous;
            return Err(err);
        }
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tasks.iter().find(|t| t.id == *id).cloned())
    }

    fn all(&self) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tasks.clone())
    }
}

/// Delegation mailbox shared by a team of agents
pub struct TaskMailbox {
    store: Arc<dyn TaskStore>,
    /// Write lock; holds the next arrival sequence number
    next_seq: Mutex<u64>,
}

impl std::fmt::Debug for TaskMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskMailbox").finish_non_exhaustive()
    }
}

impl TaskMailbox {
    pub fn new(store: Arc<dyn TaskStore>) -> Result<Self> {
        let next_seq = store
            .all()?
            .iter()
            .map(|t| t.seq + 1)
            .max()
            .unwrap_or(0);
        Ok(Self {
            store,
            next_seq: Mutex::new(next_seq),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryTaskStore::new()),
            next_seq: Mutex::new(0),
        }
    }

    /// Create a task owned by `owner` itself
    pub fn create_task(
        &self,
        owner: &str,
        description: impl Into<String>,
        priority: Priority,
    ) -> Result<Task> {
        self.submit(owner, owner, NewTask::new(description).priority(priority))
    }

    /// Append a task to `to`'s queue on behalf of `from`
    pub fn assign_task(
        &self,
        from: &str,
        to: &str,
        description: impl Into<String>,
        priority: Priority,
    ) -> Result<Task> {
        self.submit(from, to, NewTask::new(description).priority(priority))
    }

    /// Create a task from a full request (due date included)
    pub fn submit(&self, from: &str, to: &str, request: NewTask) -> Result<Task> {
        if request.description.trim().is_empty() {
            return Err(AgentError::Other("task description must not be empty".into()));
        }
        if to.trim().is_empty() {
            return Err(AgentError::Other("task assignee must not be empty".into()));
        }

        let mut next_seq = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);
        let task = Task {
            id: TaskId::new(),
            description: request.description,
            assignee: to.to_string(),
            assigned_by: from.to_string(),
            priority: request.priority,
            status: TaskStatus::NotStarted,
            due: request.due,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            seq: *next_seq,
        };
        self.store.insert(&task)?;
        *next_seq += 1;
        drop(next_seq);

        tracing::info!(
            task_id = %task.id,
            from,
            to,
            priority = %task.priority,
            "Task assigned"
        );
        Ok(task)
    }

    /// Tasks currently assigned to `agent`, in arrival order
    pub fn list_tasks(&self, agent: &str) -> Result<Vec<Task>> {
        self.select(|t| t.assignee == agent)
    }

    /// Tasks assigned to `agent` that have not been started
    pub fn pending(&self, agent: &str) -> Result<Vec<Task>> {
        self.select(|t| t.assignee == agent && t.status == TaskStatus::NotStarted)
    }

    /// Tasks `agent` handed to other agents
    pub fn delegated_by(&self, agent: &str) -> Result<Vec<Task>> {
        self.select(|t| t.assigned_by == agent && t.assignee != agent)
    }

    /// Every task, in arrival order
    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        self.select(|_| true)
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.store.get(id)?.ok_or(AgentError::TaskNotFound(*id))
    }

    /// `not_started -> in_progress`, assignee only
    pub fn start_task(&self, agent: &str, id: &TaskId) -> Result<Task> {
        self.mutate(id, |task| {
            check_assignee(task, agent)?;
            if task.status != TaskStatus::NotStarted {
                return Err(AgentError::TaskState {
                    task_id: task.id,
                    reason: format!("task is {}, not not_started", task.status),
                });
            }
            task.status = TaskStatus::InProgress;
            task.started_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Mark a task complete, assignee only
    pub fn complete_task(&self, agent: &str, id: &TaskId) -> Result<Task> {
        let task = self.mutate(id, |task| {
            check_assignee(task, agent)?;
            if task.is_complete() {
                return Err(AgentError::TaskState {
                    task_id: task.id,
                    reason: "task is already complete".into(),
                });
            }
            task.status = TaskStatus::Complete;
            task.completed_at = Some(Utc::now());
            Ok(())
        })?;
        tracing::info!(task_id = %task.id, agent, "Task completed");
        Ok(task)
    }

    /// `in_progress -> not_started`, assignee only. Used when a run on the
    /// task fails so the next drain picks it up again.
    pub fn release_task(&self, agent: &str, id: &TaskId) -> Result<Task> {
        let task = self.mutate(id, |task| {
            check_assignee(task, agent)?;
            if task.status != TaskStatus::InProgress {
                return Err(AgentError::TaskState {
                    task_id: task.id,
                    reason: format!("task is {}, not in_progress", task.status),
                });
            }
            task.status = TaskStatus::NotStarted;
            task.started_at = None;
            Ok(())
        })?;
        tracing::info!(task_id = %task.id, agent, "Task released");
        Ok(task)
    }

    /// Hand an open task to another agent, assigner only. The task goes to
    /// the back of the new assignee's queue and starts over as not started.
    pub fn reassign_task(&self, by: &str, id: &TaskId, to: &str) -> Result<Task> {
        if to.trim().is_empty() {
            return Err(AgentError::Other("task assignee must not be empty".into()));
        }
        let task = self.mutate(id, |task| {
            if task.assigned_by != by {
                return Err(AgentError::NotOwner {
                    task_id: task.id,
                    agent: by.to_string(),
                    owner: task.assigned_by.clone(),
                });
            }
            if task.is_complete() {
                return Err(AgentError::TaskState {
                    task_id: task.id,
                    reason: "completed tasks cannot be reassigned".into(),
                });
            }
            if task.assignee == to {
                return Err(AgentError::TaskState {
                    task_id: task.id,
                    reason: format!("task is already assigned to {to}"),
                });
            }
            task.assignee = to.to_string();
            task.status = TaskStatus::NotStarted;
            task.started_at = None;
            Ok(())
        })?;
        tracing::info!(task_id = %task.id, by, to, "Task reassigned");
        Ok(task)
    }

    /// Per-agent counts of current, completed and delegated tasks
    pub fn overview(&self) -> Result<BTreeMap<String, TaskCounts>> {
        let mut overview: BTreeMap<String, TaskCounts> = BTreeMap::new();
        for task in self.store.all()? {
            let counts = overview.entry(task.assignee.clone()).or_default();
            if task.is_complete() {
                counts.completed += 1;
            } else {
                counts.current += 1;
            }
            if task.is_delegated() {
                overview.entry(task.assigned_by.clone()).or_default().delegated += 1;
            }
        }
        Ok(overview)
    }

    fn select(&self, keep: impl Fn(&Task) -> bool) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.store.all()?.into_iter().filter(|t| keep(t)).collect();
        tasks.sort_by_key(|t| t.seq);
        Ok(tasks)
    }

    /// Load, change and store one task under the write lock
    fn mutate(&self, id: &TaskId, change: impl FnOnce(&mut Task) -> Result<()>) -> Result<Task> {
        let mut next_seq = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);
        let mut task = self.store.get(id)?.ok_or(AgentError::TaskNotFound(*id))?;
        let assignee = task.assignee.clone();
        change(&mut task)?;
        if task.assignee != assignee {
            task.seq = *next_seq;
            *next_seq += 1;
        }
        self.store.update(&task)?;
        Ok(task)
    }
}

fn check_assignee(task: &Task, agent: &str) -> Result<()> {
    if task.assignee == agent {
        Ok(())
    } else {
        Err(AgentError::NotOwner {
            task_id: task.id,
            agent: agent.to_string(),
            owner: task.assignee.clone(),
        })
    }
}
