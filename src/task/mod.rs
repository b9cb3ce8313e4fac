//! Task entity
//!
//! A task is a titled Markdown note that can be completed and hidden from
//! the wallpaper. The serialized form matches the task files written by
//! earlier releases, so those load unchanged.

mod store;

pub use store::{ListenerId, StoreEvent, TaskStore};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Unique identifier for a task
pub type TaskId = String;

/// Longest title derived from content for legacy records
pub const DERIVED_TITLE_MAX_CHARS: usize = 50;

/// A to-do entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// UUID v4
    #[serde(default)]
    pub id: TaskId,
    #[serde(default)]
    pub title: String,
    /// Markdown body
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default = "now")]
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub completed_at: Option<NaiveDateTime>,
    /// Whether the task is drawn on the wallpaper
    #[serde(default = "default_true")]
    pub show_on_wallpaper: bool,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn default_true() -> bool {
    true
}

impl Task {
    /// Create an open task with a fresh id
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            is_completed: false,
            created_at: now(),
            completed_at: None,
            show_on_wallpaper: true,
        }
    }

    /// Builder: set wallpaper visibility
    pub fn with_visibility(mut self, show: bool) -> Self {
        self.show_on_wallpaper = show;
        self
    }

    /// Mark completed or reopened, stamping `completed_at` accordingly
    pub fn set_completed(&mut self, completed: bool) {
        self.is_completed = completed;
        self.completed_at = completed.then(now);
    }

    /// Whether the compositor draws this task
    pub fn is_drawn(&self) -> bool {
        self.show_on_wallpaper && !self.is_completed
    }

    /// Leading part of the id, enough to address a task from the command line
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }

    /// Fill in fields missing from records written by older releases.
    ///
    /// Returns true when anything changed.
    pub fn migrate(&mut self) -> bool {
        let mut changed = false;
        if self.id.trim().is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
            changed = true;
        }
        if self.title.trim().is_empty() {
            self.title = derive_title(&self.content);
            changed = true;
        }
        changed
    }
}

/// First line of `content`, cut to [`DERIVED_TITLE_MAX_CHARS`] characters
pub fn derive_title(content: &str) -> String {
    content
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .chars()
        .take(DERIVED_TITLE_MAX_CHARS)
        .collect()
}

/// Partial update; `None` fields are left alone
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_completed: Option<bool>,
    pub show_on_wallpaper: Option<bool>,
}

impl TaskUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.is_completed = Some(completed);
        self
    }

    pub fn visible(mut self, show: bool) -> Self {
        self.show_on_wallpaper = Some(show);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply to a task
    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(content) = self.content {
            task.content = content;
        }
        if let Some(completed) = self.is_completed {
            task.set_completed(completed);
        }
        if let Some(show) = self.show_on_wallpaper {
            task.show_on_wallpaper = show;
        }
    }
}
