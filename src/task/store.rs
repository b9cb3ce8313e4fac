//! JSON-backed task list with change listeners
//!
//! Every mutation writes the whole list to disk as a pretty-printed JSON
//! array and then notifies listeners synchronously. A failed write is
//! logged; listeners still run so the wallpaper reflects the in-memory list.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{Task, TaskUpdate};
use crate::error::StoreError;

/// Handle returned by [`TaskStore::add_listener`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What changed in the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    Added(String),
    Updated(String),
    Deleted(String),
    /// The list was replaced by an import or relocated
    Replaced,
    /// The backing file was re-read after an external edit
    Reloaded,
}

type Listener = Box<dyn FnMut(&StoreEvent, &[Task])>;

/// Owns the task list and its backing file
pub struct TaskStore {
    path: PathBuf,
    tasks: Vec<Task>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("path", &self.path)
            .field("tasks", &self.tasks.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl TaskStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts an empty list; an unreadable or malformed one
    /// is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tasks = match read_tasks(&path) {
            Ok(tasks) => {
                tracing::info!(path = %path.display(), "Loaded {} tasks", tasks.len());
                tasks
            }
            Err(StoreError::Missing(_)) => {
                tracing::info!(path = %path.display(), "No task file yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Failed to load tasks: {}", e);
                Vec::new()
            }
        };

        Self {
            path,
            tasks,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Resolve a full id or a unique id prefix
    pub fn find_by_prefix(&self, prefix: &str) -> Result<&Task, StoreError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(StoreError::NotFound(prefix.to_string()));
        }
        if let Some(task) = self.get(prefix) {
            return Ok(task);
        }

        let mut matches = self.tasks.iter().filter(|t| t.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task),
            (Some(_), Some(_)) => Err(StoreError::Ambiguous(prefix.to_string())),
            (None, _) => Err(StoreError::NotFound(prefix.to_string())),
        }
    }

    /// Append a new open task
    pub fn add(&mut self, title: impl Into<String>, content: impl Into<String>) -> Task {
        self.add_task(Task::new(title, content))
    }

    /// Append a fully built task; saves and notifies once
    pub fn add_task(&mut self, task: Task) -> Task {
        tracing::debug!(id = %task.id, "Adding task");
        self.tasks.push(task.clone());
        self.persist();
        self.notify(StoreEvent::Added(task.id.clone()));
        task
    }

    /// Apply `update` to the task with `id`; false when no such task
    pub fn update(&mut self, id: &str, update: TaskUpdate) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        update.apply(task);
        self.persist();
        self.notify(StoreEvent::Updated(id.to_string()));
        true
    }

    /// Remove the task with `id`; false when no such task
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            return false;
        }
        self.persist();
        self.notify(StoreEvent::Deleted(id.to_string()));
        true
    }

    /// Replace the list with the tasks in `path`.
    ///
    /// On error the current list is left untouched. Returns the number of
    /// tasks imported.
    pub fn import(&mut self, path: &Path) -> Result<usize, StoreError> {
        let tasks = read_tasks(path)?;
        let count = tasks.len();
        tracing::info!(from = %path.display(), "Imported {} tasks", count);

        self.tasks = tasks;
        self.persist();
        self.notify(StoreEvent::Replaced);
        Ok(count)
    }

    /// Write the current list to `path`
    pub fn export(&self, path: &Path) -> Result<(), StoreError> {
        write_tasks(path, &self.tasks)?;
        tracing::info!(to = %path.display(), "Exported {} tasks", self.tasks.len());
        Ok(())
    }

    /// Move the backing file to `path` and write the current list there
    pub fn set_data_path(&mut self, path: impl Into<PathBuf>) -> Result<(), StoreError> {
        let path = path.into();
        if path == self.path {
            return Ok(());
        }
        write_tasks(&path, &self.tasks)?;
        tracing::info!(from = %self.path.display(), to = %path.display(), "Moved task file");

        self.path = path;
        self.notify(StoreEvent::Replaced);
        Ok(())
    }

    /// Re-read the backing file; on error the list is left untouched
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let tasks = read_tasks(&self.path)?;
        tracing::info!("Reloaded {} tasks", tasks.len());
        self.tasks = tasks;
        self.notify(StoreEvent::Reloaded);
        Ok(())
    }

    /// Write the list to the backing file
    pub fn save(&self) -> Result<(), StoreError> {
        write_tasks(&self.path, &self.tasks)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::error!("Failed to save tasks: {}", e);
        }
    }

    /// Register a change listener
    pub fn add_listener(&mut self, listener: impl FnMut(&StoreEvent, &[Task]) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a listener; false when it was not registered
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, event: StoreEvent) {
        tracing::debug!(?event, "Notifying {} listeners", self.listeners.len());
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event, &self.tasks);
        }
    }
}

/// Read and migrate a task file
fn read_tasks(path: &Path) -> Result<Vec<Task>, StoreError> {
    if !path.exists() {
        return Err(StoreError::Missing(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut tasks: Vec<Task> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let migrated = tasks.iter_mut().map(Task::migrate).filter(|&m| m).count();
    if migrated > 0 {
        tracing::info!(path = %path.display(), "Migrated {} legacy task records", migrated);
    }
    Ok(tasks)
}

fn write_tasks(path: &Path, tasks: &[Task]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, tasks).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, TaskStore) {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::open(dir.path().join("data").join("tasks.json"));
        (dir, store)
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let (_dir, store) = temp_store();
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_open_malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{ not json").unwrap();

        let store = TaskStore::open(&path);
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_crud_round_trip() {
        let (_dir, mut store) = temp_store();

        let a = store.add("Groceries", "- milk\n- **eggs**");
        let b = store.add("Report", "draft");
        assert!(store.update(&a.id, TaskUpdate::default().completed(true).visible(false)));
        assert!(store.update(&b.id, TaskUpdate::default().content("final")));
        assert!(!store.update("missing", TaskUpdate::default().title("x")));

        let reopened = TaskStore::open(store.path());
        assert_eq!(reopened.tasks(), store.tasks());

        let a2 = reopened.get(&a.id).unwrap();
        assert!(a2.is_completed);
        assert!(a2.completed_at.is_some());
        assert!(!a2.show_on_wallpaper);
        assert_eq!(reopened.get(&b.id).unwrap().content, "final");

        assert!(store.delete(&a.id));
        assert!(!store.delete(&a.id));
        assert_eq!(TaskStore::open(store.path()).tasks().len(), 1);
    }

    #[test]
    fn test_file_is_pretty_json_array() {
        let (_dir, mut store) = temp_store();
        store.add("任务", "内容");

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("[\n  {"));
        // Non-ASCII is written as-is
        assert!(text.contains("任务"));
    }

    #[test]
    fn test_listeners_called_once_per_mutation() {
        let (_dir, mut store) = temp_store();
        let events: Rc<RefCell<Vec<(StoreEvent, usize)>>> = Rc::default();

        let sink = Rc::clone(&events);
        let id = store.add_listener(move |event, tasks| {
            sink.borrow_mut().push((event.clone(), tasks.len()));
        });

        let task = store.add("a", "");
        store.update(&task.id, TaskUpdate::default().title("b"));
        store.delete(&task.id);
        store.delete(&task.id);

        assert_eq!(
            *events.borrow(),
            vec![
                (StoreEvent::Added(task.id.clone()), 1),
                (StoreEvent::Updated(task.id.clone()), 1),
                (StoreEvent::Deleted(task.id.clone()), 0),
            ]
        );

        assert!(store.remove_listener(id));
        assert!(!store.remove_listener(id));
        store.add("c", "");
        assert_eq!(events.borrow().len(), 3);
    }

    #[test]
    fn test_add_hidden_task_is_one_mutation() {
        let (_dir, mut store) = temp_store();
        let events: Rc<RefCell<Vec<bool>>> = Rc::default();

        let sink = Rc::clone(&events);
        store.add_listener(move |_, tasks| {
            sink.borrow_mut().extend(tasks.iter().map(|t| t.show_on_wallpaper));
        });

        let task = store.add_task(Task::new("private", "").with_visibility(false));
        assert!(!task.show_on_wallpaper);
        // Listeners never see the task as visible
        assert_eq!(*events.borrow(), vec![false]);

        let reopened = TaskStore::open(store.path());
        assert!(!reopened.tasks()[0].show_on_wallpaper);
    }

    #[test]
    fn test_import_malformed_leaves_list_untouched() {
        let (dir, mut store) = temp_store();
        store.add("keep me", "");

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"[{"id": 5}]"#).unwrap();
        assert!(matches!(store.import(&bad), Err(StoreError::Json { .. })));

        let missing = dir.path().join("nope.json");
        assert!(matches!(store.import(&missing), Err(StoreError::Missing(_))));

        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].title, "keep me");
    }

    #[test]
    fn test_export_then_import() {
        let (dir, mut store) = temp_store();
        store.add("one", "1");
        store.add("two", "2");

        let exported = dir.path().join("export.json");
        store.export(&exported).unwrap();

        let mut other = TaskStore::open(dir.path().join("other.json"));
        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&fired);
        other.add_listener(move |event, _| sink.borrow_mut().push(event.clone()));

        assert_eq!(other.import(&exported).unwrap(), 2);
        assert_eq!(other.tasks(), store.tasks());
        assert_eq!(*fired.borrow(), vec![StoreEvent::Replaced]);
        // Imported list is persisted to the store's own file
        assert_eq!(TaskStore::open(other.path()).tasks().len(), 2);
    }

    #[test]
    fn test_import_migrates_legacy_records() {
        let (dir, mut store) = temp_store();
        let legacy = dir.path().join("legacy.json");
        fs::write(
            &legacy,
            r#"[{"content": "Call Alice\nabout the move", "is_completed": false,
                 "created_at": "2023-11-05T08:00:00", "completed_at": null}]"#,
        )
        .unwrap();

        store.import(&legacy).unwrap();
        let task = &store.tasks()[0];
        assert_eq!(task.title, "Call Alice");
        assert!(!task.id.is_empty());
        assert!(task.show_on_wallpaper);
    }

    #[test]
    fn test_set_data_path_moves_file() {
        let (dir, mut store) = temp_store();
        store.add("a", "");

        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        store.add_listener(move |_, _| *sink.borrow_mut() += 1);

        let new_path = dir.path().join("moved").join("tasks.json");
        store.set_data_path(&new_path).unwrap();
        assert_eq!(store.path(), new_path.as_path());
        assert_eq!(TaskStore::open(&new_path).tasks().len(), 1);
        assert_eq!(*count.borrow(), 1);

        // Same path is a no-op
        store.set_data_path(&new_path).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_reload_picks_up_external_edit() {
        let (_dir, mut store) = temp_store();
        store.add("a", "");

        let mut external = TaskStore::open(store.path());
        external.add("b", "");

        store.reload().unwrap();
        assert_eq!(store.tasks().len(), 2);

        fs::write(store.path(), "garbage").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.tasks().len(), 2);
    }

    #[test]
    fn test_find_by_prefix() {
        let (_dir, mut store) = temp_store();
        let mut a = Task::new("a", "");
        a.id = "abc123".into();
        let mut b = Task::new("b", "");
        b.id = "abd456".into();
        store.tasks = vec![a, b];

        assert_eq!(store.find_by_prefix("abc").unwrap().title, "a");
        assert_eq!(store.find_by_prefix("abd456").unwrap().title, "b");
        assert!(matches!(store.find_by_prefix("ab"), Err(StoreError::Ambiguous(_))));
        assert!(matches!(store.find_by_prefix("zz"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.find_by_prefix(""), Err(StoreError::NotFound(_))));
    }
}
