//! Loading and sampling benchmark tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use super::task::Task;
use crate::error::StoreError;

/// Source of benchmark tasks for one (class, subclass) slice.
pub trait TaskStore: Send + Sync {
    /// Loads every task of a slice in a stable order.
    fn load(&self, category: &str, subclass: &str, private: bool) -> Result<Vec<Task>, StoreError>;
}

/// Task store backed by category/subclass-partitioned JSON files.
///
/// Each file holds either a single task object or a list of them. Files are
/// read in file-name order so loading is deterministic.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    root: PathBuf,
}

impl JsonTaskStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one slice.
    pub fn slice_dir(&self, category: &str, subclass: &str, private: bool) -> PathBuf {
        let visibility = if private { "private" } else { "public" };
        self.root.join(visibility).join(category).join(subclass)
    }
}

impl TaskStore for JsonTaskStore {
    fn load(&self, category: &str, subclass: &str, private: bool) -> Result<Vec<Task>, StoreError> {
        let dir = self.slice_dir(category, subclass, private);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(dir));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path.to_path_buf());
            }
        }

        let mut tasks = Vec::new();
        for path in files {
            let content = std::fs::read_to_string(&path)?;
            let value: Value = serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?;
            match value {
                Value::Array(items) => {
                    for item in &items {
                        tasks.push(Task::from_json(category, subclass, item, &path)?);
                    }
                }
                single => tasks.push(Task::from_json(category, subclass, &single, &path)?),
            }
        }

        debug!(
            category = category,
            subclass = subclass,
            private = private,
            count = tasks.len(),
            "Loaded benchmark slice"
        );
        Ok(tasks)
    }
}

/// In-memory task store, keyed by slice.
#[derive(Debug, Clone, Default)]
pub struct MemoryTaskStore {
    slices: HashMap<(String, String, bool), Vec<Task>>,
}

impl MemoryTaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a public task to its slice.
    pub fn with_task(self, task: Task) -> Self {
        self.with_task_visibility(task, false)
    }

    /// Adds a task to its slice with the given visibility.
    pub fn with_task_visibility(mut self, task: Task, private: bool) -> Self {
        self.slices
            .entry((task.category.clone(), task.subclass.clone(), private))
            .or_default()
            .push(task);
        self
    }
}

impl TaskStore for MemoryTaskStore {
    fn load(&self, category: &str, subclass: &str, private: bool) -> Result<Vec<Task>, StoreError> {
        self.slices
            .get(&(category.to_string(), subclass.to_string(), private))
            .cloned()
            .ok_or_else(|| {
                let visibility = if private { "private" } else { "public" };
                StoreError::NotFound(PathBuf::from(visibility).join(category).join(subclass))
            })
    }
}

/// Shuffles `tasks` with a seeded generator and keeps the first `n`.
///
/// The same seed and input order always select the same tasks.
pub fn sample(mut tasks: Vec<Task>, seed: u64, n: usize) -> Vec<Task> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    tasks.shuffle(&mut rng);
    tasks.truncate(n);
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::TaskKind;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_reads_objects_and_lists_in_name_order() {
        let temp = TempDir::new().unwrap();
        let store = JsonTaskStore::new(temp.path());
        let dir = store.slice_dir("reasoning", "math", false);

        write(&dir, "b.json", r#"{"problem": "second", "solution": "2"}"#);
        write(
            &dir,
            "a.json",
            r#"[{"problem": "first", "solution": "1"}, {"problem": "first-b", "solution": "1b"}]"#,
        );
        write(&dir, "notes.txt", "ignored");

        let tasks = store.load("reasoning", "math", false).unwrap();
        let prompts: Vec<&str> = tasks.iter().map(|t| t.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["first", "first-b", "second"]);
        assert!(tasks.iter().all(|t| t.kind == TaskKind::Qa));
    }

    #[test]
    fn test_load_private_uses_separate_partition() {
        let temp = TempDir::new().unwrap();
        let store = JsonTaskStore::new(temp.path());
        write(
            &store.slice_dir("safety", "integrity", true),
            "t.json",
            r#"{"prompt": "p", "eval_instruction": "i"}"#,
        );

        assert!(store.load("safety", "integrity", true).is_ok());
        assert!(matches!(
            store.load("safety", "integrity", false),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_reports_bad_json() {
        let temp = TempDir::new().unwrap();
        let store = JsonTaskStore::new(temp.path());
        write(&store.slice_dir("a", "b", false), "bad.json", "{not json");

        assert!(matches!(
            store.load("a", "b", false),
            Err(StoreError::Json { .. })
        ));
    }

    #[test]
    fn test_sample_is_deterministic_and_truncates() {
        let tasks: Vec<Task> = (0..20)
            .map(|i| Task::qa("c", "s", format!("p{}", i), "x"))
            .collect();

        let a = sample(tasks.clone(), 7, 5);
        let b = sample(tasks.clone(), 7, 5);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);

        let all = sample(tasks.clone(), 7, 100);
        assert_eq!(all.len(), 20);

        let other = sample(tasks, 8, 20);
        assert_ne!(
            all.iter().map(|t| &t.id).collect::<Vec<_>>(),
            other.iter().map(|t| &t.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTaskStore::new()
            .with_task(Task::qa("k", "w", "p1", "a"))
            .with_task(Task::qa("k", "w", "p2", "b"));

        assert_eq!(store.load("k", "w", false).unwrap().len(), 2);
        assert!(store.load("k", "w", true).is_err());
    }
}
