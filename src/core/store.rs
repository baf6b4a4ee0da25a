//! Task Store (C3): keyed task storage with history windowing and a
//! push-notification-config index. Grounded in the toolkit's
//! `mcp_server.rs` — a registry keeping its table behind
//! `Arc<RwLock<HashMap<...>>>` and cloning out to callers rather than
//! handing back references — generalized to three separate collections
//! (tasks, histories, push-configs) per the "keep three keyed collections
//! rather than cross-pointers" design note, with lock ordering tasks →
//! history → push-configs to prevent deadlock across a multi-collection
//! update.

use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

use std::sync::Arc;

use crate::core::message::Message;
use crate::core::push::PushDispatcher;
use crate::core::task::{
    Page, PushNotificationConfig, Task, TaskFilter, TaskState, TaskStatus, DEFAULT_LIST_LIMIT,
    MAX_LIST_LIMIT,
};

#[derive(Debug, Clone)]
pub enum TaskStoreError {
    NotFound(String),
    NotCancelable(String),
    InvalidTransition(String),
    PushConfigNotFound(String),
}

impl fmt::Display for TaskStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStoreError::NotFound(id) => write!(f, "task not found: {}", id),
            TaskStoreError::NotCancelable(id) => write!(f, "task not cancelable: {}", id),
            TaskStoreError::InvalidTransition(m) => write!(f, "invalid transition: {}", m),
            TaskStoreError::PushConfigNotFound(m) => write!(f, "push config not found: {}", m),
        }
    }
}

impl std::error::Error for TaskStoreError {}

pub struct TaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    histories: RwLock<HashMap<String, Vec<Message>>>,
    push_configs: RwLock<HashMap<String, Vec<PushNotificationConfig>>>,
    push: RwLock<Option<Arc<PushDispatcher>>>,
    max_history: usize,
}

impl TaskStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            histories: RwLock::new(HashMap::new()),
            push_configs: RwLock::new(HashMap::new()),
            push: RwLock::new(None),
            max_history,
        }
    }

    /// Registers the dispatcher `update_task` fans every state-changing
    /// transition out to (§4.7 — "on every `update_task` that changes
    /// state", not just the terminal one). Left unset, `update_task` simply
    /// skips the fan-out, which is what every store built without a running
    /// server (most unit tests) wants.
    pub async fn attach_push_dispatcher(&self, push: Arc<PushDispatcher>) {
        *self.push.write().await = Some(push);
    }

    /// Creates a new task in `Submitted` state, seeds its context history
    /// with `message`, and returns a deep copy. The store mints the id, so
    /// duplicate creation by replay is structurally impossible (§4.4).
    pub async fn create_task(&self, context_id: &str, message: Message) -> Task {
        let mut task = Task::new(context_id);
        let message = message.with_task(task.id.clone()).with_context(context_id.to_string());
        task.history.push(message.clone());

        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(task.id.clone(), task.clone());
        }
        self.append_history(context_id, vec![message]).await;
        task
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, TaskStoreError> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))
    }

    /// Atomically updates status, appending a history message if one is
    /// given. Rejects transitions out of a terminal state.
    pub async fn update_task(
        &self,
        id: &str,
        state: TaskState,
        status_message: Option<String>,
        append: Option<Message>,
    ) -> Result<Task, TaskStoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;

        if !task.status.state.can_transition_to(state) {
            if task.status.state.is_terminal() {
                return Err(TaskStoreError::NotCancelable(id.to_string()));
            }
            return Err(TaskStoreError::InvalidTransition(format!(
                "{:?} -> {:?}",
                task.status.state, state
            )));
        }

        task.status = match status_message {
            Some(m) => TaskStatus::with_message(state, m),
            None => TaskStatus::new(state),
        };

        let context_id = task.context_id.clone();
        if let Some(msg) = append.clone() {
            task.history.push(msg);
        }
        let snapshot = task.clone();
        drop(tasks);

        if let Some(msg) = append {
            self.append_history(&context_id, vec![msg]).await;
        }

        self.fan_out_push(&snapshot).await;

        Ok(snapshot)
    }

    /// Fires every registered webhook for `task`'s id, fire-and-forget, so
    /// `update_task` callers never block on a network round-trip for a
    /// push delivery that §7 says must never affect the task's own outcome.
    async fn fan_out_push(&self, task: &Task) {
        let push = self.push.read().await.clone();
        let push = match push {
            Some(p) => p,
            None => return,
        };
        let configs = self.list_push_configs(&task.id).await;
        if configs.is_empty() {
            return;
        }
        let task = task.clone();
        tokio::spawn(async move {
            for cfg in configs {
                push.dispatch(&cfg.url, cfg.secret.as_deref(), &task).await;
            }
        });
    }

    pub async fn cancel_task(&self, id: &str) -> Result<Task, TaskStoreError> {
        self.update_task(id, TaskState::Canceled, None, None).await
    }

    pub async fn list_tasks(&self, filter: TaskFilter, limit: usize, offset: usize) -> Page<Task> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT).min(if limit == 0 { DEFAULT_LIST_LIMIT } else { limit });
        let tasks = self.tasks.read().await;
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| {
                filter
                    .context_id
                    .as_ref()
                    .map(|c| &t.context_id == c)
                    .unwrap_or(true)
                    && filter.state.map(|s| t.status.state == s).unwrap_or(true)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.status.timestamp.cmp(&b.status.timestamp));
        let total = matched.len();
        let items = matched.into_iter().skip(offset).take(limit).collect();
        Page { items, total, limit, offset }
    }

    pub async fn get_history(&self, context_id: &str) -> Vec<Message> {
        self.histories
            .read()
            .await
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Appends messages to a context's history, trimming from the oldest
    /// end in whole turns once the list exceeds `max_history` (§4.4, §9's
    /// "trim in whole turns" resolution of the history-with-pending-tool-
    /// calls ambiguity).
    pub async fn append_history(&self, context_id: &str, messages: Vec<Message>) {
        let mut histories = self.histories.write().await;
        let entry = histories.entry(context_id.to_string()).or_default();
        entry.extend(messages);
        trim_to_whole_turns(entry, self.max_history);
    }

    pub async fn set_push_config(
        &self,
        config: PushNotificationConfig,
    ) -> PushNotificationConfig {
        let mut configs = self.push_configs.write().await;
        configs
            .entry(config.task_id.clone())
            .or_default()
            .push(config.clone());
        config
    }

    pub async fn get_push_config(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> Result<PushNotificationConfig, TaskStoreError> {
        let configs = self.push_configs.read().await;
        let list = configs
            .get(task_id)
            .ok_or_else(|| TaskStoreError::PushConfigNotFound(task_id.to_string()))?;
        match config_id {
            Some(cid) => list
                .iter()
                .find(|c| c.id == cid)
                .cloned()
                .ok_or_else(|| TaskStoreError::PushConfigNotFound(cid.to_string())),
            None => list
                .first()
                .cloned()
                .ok_or_else(|| TaskStoreError::PushConfigNotFound(task_id.to_string())),
        }
    }

    pub async fn list_push_configs(&self, task_id: &str) -> Vec<PushNotificationConfig> {
        self.push_configs
            .read()
            .await
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn delete_push_config(
        &self,
        task_id: &str,
        config_id: &str,
    ) -> Result<(), TaskStoreError> {
        let mut configs = self.push_configs.write().await;
        let list = configs
            .get_mut(task_id)
            .ok_or_else(|| TaskStoreError::PushConfigNotFound(task_id.to_string()))?;
        let before = list.len();
        list.retain(|c| c.id != config_id);
        if list.len() == before {
            return Err(TaskStoreError::PushConfigNotFound(config_id.to_string()));
        }
        Ok(())
    }

    /// Removes any task in a terminal state older than `retention`
    /// (wall-clock, relative to its status timestamp). Intended to be
    /// driven periodically by the server's cleanup sweep (default 30s,
    /// §4.4).
    pub async fn cleanup_terminal(&self, retention: chrono::Duration) -> usize {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| {
            !(t.status.state.is_terminal() && now - t.status.timestamp > retention)
        });
        before - tasks.len()
    }
}

/// Trim from the oldest end until the list is at most `max_history`, but
/// never split a turn: a user message followed by any tool-call/result
/// pairs and the final assistant message must be dropped or kept as one
/// unit, or provider translation of a truncated tool-call chain becomes
/// invalid (§9).
fn trim_to_whole_turns(messages: &mut Vec<Message>, max_history: usize) {
    if messages.len() <= max_history {
        return;
    }
    // A new turn starts at every user message. Find the first turn boundary
    // at or after the overflow point and drop everything before it.
    let overflow = messages.len() - max_history;
    let mut cut = 0;
    for (i, m) in messages.iter().enumerate().skip(overflow) {
        if m.role == crate::core::message::Role::User {
            cut = i;
            break;
        }
    }
    if cut == 0 {
        // No later user-message boundary found (a single oversized turn);
        // fall back to a hard trim rather than keeping everything.
        cut = overflow;
    }
    messages.drain(0..cut);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    #[tokio::test]
    async fn create_task_starts_submitted_with_seeded_history() {
        let store = TaskStore::new(20);
        let task = store.create_task("ctx-1", Message::user_text("ping")).await;
        assert_eq!(task.status.state, TaskState::Submitted);
        let history = store.get_history("ctx-1").await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn update_on_terminal_task_is_rejected() {
        let store = TaskStore::new(20);
        let task = store.create_task("ctx-1", Message::user_text("ping")).await;
        store
            .update_task(&task.id, TaskState::Working, None, None)
            .await
            .unwrap();
        store
            .update_task(&task.id, TaskState::Completed, None, None)
            .await
            .unwrap();
        let err = store
            .update_task(&task.id, TaskState::Working, None, None)
            .await;
        assert!(matches!(err, Err(TaskStoreError::NotCancelable(_))));
    }

    #[tokio::test]
    async fn history_is_capped_at_max_history() {
        let store = TaskStore::new(4);
        for i in 0..10 {
            store
                .append_history("ctx-1", vec![Message::user_text(format!("msg-{}", i))])
                .await;
        }
        let history = store.get_history("ctx-1").await;
        assert!(history.len() <= 4);
    }

    #[tokio::test]
    async fn push_config_lifecycle() {
        let store = TaskStore::new(20);
        let task = store.create_task("ctx-1", Message::user_text("ping")).await;
        let config = PushNotificationConfig::new(task.id.clone(), "https://example.com/hook");
        let stored = store.set_push_config(config).await;
        assert_eq!(store.list_push_configs(&task.id).await.len(), 1);
        store.delete_push_config(&task.id, &stored.id).await.unwrap();
        assert_eq!(store.list_push_configs(&task.id).await.len(), 0);
    }

    #[tokio::test]
    async fn update_task_fans_a_webhook_out_on_every_transition() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_for_handler = hits.clone();
        let app = axum::Router::new().route(
            "/hook",
            axum::routing::post(move || {
                let hits = hits_for_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::OK
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let store = TaskStore::new(20);
        let task = store.create_task("ctx-1", Message::user_text("ping")).await;
        store
            .set_push_config(PushNotificationConfig::new(task.id.clone(), format!("http://{}/hook", addr)))
            .await;
        store
            .attach_push_dispatcher(Arc::new(PushDispatcher::new(
                std::time::Duration::from_secs(5),
                1,
                std::time::Duration::from_secs(30),
            )))
            .await;

        // Two transitions, two webhook deliveries — not just the final one.
        store.update_task(&task.id, TaskState::Working, None, None).await.unwrap();
        store.update_task(&task.id, TaskState::Completed, None, None).await.unwrap();

        let mut delivered = 0;
        for _ in 0..100 {
            delivered = hits.load(Ordering::SeqCst);
            if delivered >= 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(delivered, 2);
    }

    #[tokio::test]
    async fn cleanup_terminal_removes_only_old_terminal_tasks() {
        let store = TaskStore::new(20);
        let task = store.create_task("ctx-1", Message::user_text("ping")).await;
        store
            .update_task(&task.id, TaskState::Working, None, None)
            .await
            .unwrap();
        store
            .update_task(&task.id, TaskState::Completed, None, None)
            .await
            .unwrap();
        let removed = store.cleanup_terminal(chrono::Duration::seconds(-1)).await;
        assert_eq!(removed, 1);
        assert!(store.get_task(&task.id).await.is_err());
    }
}
