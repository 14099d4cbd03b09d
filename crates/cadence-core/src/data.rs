use crate::error::Result;
use crate::paths;
use std::path::{Path, PathBuf};

/// Values of data nodes, one YAML document per data node id.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// `None` until something has been written.
    pub fn read(&self, data_node_id: &str) -> Result<Option<serde_json::Value>> {
        let path = paths::data_path(&self.root, data_node_id);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_yaml::from_str(&data)?))
    }

    pub fn write(&self, data_node_id: &str, value: &serde_json::Value) -> Result<()> {
        let data = serde_yaml::to_string(value)?;
        crate::io::atomic_write(&paths::data_path(&self.root, data_node_id), data.as_bytes())
    }

    pub fn has_value(&self, data_node_id: &str) -> bool {
        paths::data_path(&self.root, data_node_id).exists()
    }

    pub fn delete(&self, data_node_id: &str) -> Result<bool> {
        crate::io::remove_if_exists(&paths::data_path(&self.root, data_node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn write_read_delete() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path());

        assert_eq!(store.read("DATANODE_sales_1").unwrap(), None);
        assert!(!store.has_value("DATANODE_sales_1"));

        let value = json!({"total": 42, "regions": ["north", "south"]});
        store.write("DATANODE_sales_1", &value).unwrap();
        assert_eq!(store.read("DATANODE_sales_1").unwrap(), Some(value));

        assert!(store.delete("DATANODE_sales_1").unwrap());
        assert!(!store.has_value("DATANODE_sales_1"));
    }
}
