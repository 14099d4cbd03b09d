//! YAML-file persistence for entity records.
//!
//! Each entity type owns one directory under `.cadence/` and every record is
//! a single `<id>.yaml` file written atomically. Reads always hit the disk,
//! so a read reflects the last completed write.

use crate::error::Result;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// An entity persisted by a [`Repository`].
pub trait Record: Serialize + DeserializeOwned {
    /// Directory holding records of this type, relative to the project root.
    const DIR: &'static str;

    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;
}

pub struct Repository<T> {
    root: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .finish()
    }
}

impl<T: Record> Repository<T> {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            _record: PhantomData,
        }
    }

    fn path(&self, id: &str) -> PathBuf {
        paths::record_path(&self.root, T::DIR, id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path(id).exists()
    }

    pub fn get(&self, id: &str) -> Result<Option<T>> {
        let path = self.path(id);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_yaml::from_str(&data)?))
    }

    pub fn set(&self, record: &T) -> Result<()> {
        let data = serde_yaml::to_string(record)?;
        crate::io::atomic_write(&self.path(record.id()), data.as_bytes())?;
        tracing::debug!(dir = T::DIR, id = record.id(), "record saved");
        Ok(())
    }

    /// Remove a record. Returns `false` if it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = crate::io::remove_if_exists(&self.path(id))?;
        if removed {
            tracing::debug!(dir = T::DIR, id, "record deleted");
        }
        Ok(removed)
    }

    /// Every record of this type, oldest first.
    pub fn get_all(&self) -> Result<Vec<T>> {
        let dir = self.root.join(T::DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(paths::RECORD_EXT)
            {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // A concurrent delete between read_dir and read is not an error.
            if let Some(record) = self.get(id)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(records)
    }

    /// Records whose serialized top-level `field` equals `value`.
    pub fn search_all(&self, field: &str, value: &serde_json::Value) -> Result<Vec<T>> {
        let mut found = Vec::new();
        for record in self.get_all()? {
            let doc = serde_json::to_value(&record)?;
            if doc.get(field) == Some(value) {
                found.push(record);
            }
        }
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        color: String,
        created_at: DateTime<Utc>,
    }

    impl Record for Widget {
        const DIR: &'static str = ".cadence/widgets";

        fn id(&self) -> &str {
            &self.id
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }
    }

    fn widget(id: &str, color: &str, day: u32) -> Widget {
        Widget {
            id: id.to_string(),
            color: color.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn set_get_delete() {
        let dir = TempDir::new().unwrap();
        let repo: Repository<Widget> = Repository::new(dir.path());

        assert!(repo.get("w1").unwrap().is_none());
        repo.set(&widget("w1", "red", 1)).unwrap();
        assert_eq!(repo.get("w1").unwrap().unwrap().color, "red");
        assert!(repo.exists("w1"));

        assert!(repo.delete("w1").unwrap());
        assert!(!repo.delete("w1").unwrap());
        assert!(repo.get("w1").unwrap().is_none());
    }

    #[test]
    fn get_all_orders_by_creation() {
        let dir = TempDir::new().unwrap();
        let repo: Repository<Widget> = Repository::new(dir.path());
        repo.set(&widget("late", "red", 9)).unwrap();
        repo.set(&widget("early", "blue", 2)).unwrap();

        let ids: Vec<String> = repo.get_all().unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn get_all_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let repo: Repository<Widget> = Repository::new(dir.path());
        repo.set(&widget("w1", "red", 1)).unwrap();
        std::fs::write(dir.path().join(".cadence/widgets/notes.txt"), "x").unwrap();

        assert_eq!(repo.get_all().unwrap().len(), 1);
    }

    #[test]
    fn search_all_matches_field() {
        let dir = TempDir::new().unwrap();
        let repo: Repository<Widget> = Repository::new(dir.path());
        repo.set(&widget("w1", "red", 1)).unwrap();
        repo.set(&widget("w2", "blue", 2)).unwrap();
        repo.set(&widget("w3", "red", 3)).unwrap();

        let red = repo.search_all("color", &serde_json::json!("red")).unwrap();
        assert_eq!(red.len(), 2);
        assert!(repo
            .search_all("missing", &serde_json::json!("red"))
            .unwrap()
            .is_empty());
    }
}
