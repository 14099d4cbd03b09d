use crate::paths;
use crate::repository::Record;
use crate::types::{self, DISPLAY_NAME_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const AUTHORIZED_TAGS_KEY: &str = "authorized_tags";

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub config_id: String,
    /// Pipeline config id → pipeline id.
    #[serde(default)]
    pub pipelines: BTreeMap<String, String>,
    /// Data node config id → data node id, gathered from the pipelines.
    #[serde(default)]
    pub data_nodes: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub is_master: bool,
    /// Id of the owning cycle. Not an ownership link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Registered subscriber names, in subscription order.
    #[serde(default)]
    pub subscribers: Vec<String>,
}

impl Scenario {
    pub fn new(
        config_id: impl Into<String>,
        pipelines: BTreeMap<String, String>,
        data_nodes: BTreeMap<String, String>,
        properties: BTreeMap<String, serde_json::Value>,
        creation_date: Option<DateTime<Utc>>,
        cycle: Option<String>,
    ) -> Self {
        let config_id = config_id.into();
        Self {
            id: types::new_id(types::SCENARIO_PREFIX, &config_id),
            config_id,
            pipelines,
            data_nodes,
            properties,
            creation_date: creation_date.unwrap_or_else(Utc::now),
            is_master: false,
            cycle,
            tags: BTreeSet::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.properties.get(DISPLAY_NAME_KEY).and_then(|v| v.as_str())
    }

    /// Tags this scenario may carry. Empty means unrestricted.
    pub fn authorized_tags(&self) -> BTreeSet<String> {
        self.properties
            .get(AUTHORIZED_TAGS_KEY)
            .and_then(|v| v.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_tag_authorized(&self, tag: &str) -> bool {
        let authorized = self.authorized_tags();
        authorized.is_empty() || authorized.contains(tag)
    }

    pub fn belongs_to(&self, cycle_id: &str) -> bool {
        self.cycle.as_deref() == Some(cycle_id)
    }

    pub fn data_node(&self, config_id: &str) -> Option<&str> {
        self.data_nodes.get(config_id).map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns `false` if the tag was already present.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag.to_string())
    }

    /// Returns `false` if the tag was not present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    // -----------------------------------------------------------------------
    // Subscribers
    // -----------------------------------------------------------------------

    pub fn add_subscriber(&mut self, name: &str) {
        self.subscribers.push(name.to_string());
    }

    /// Removes the first registration of `name`. Returns `false` if absent.
    pub fn remove_subscriber(&mut self, name: &str) -> bool {
        match self.subscribers.iter().position(|s| s == name) {
            Some(pos) => {
                self.subscribers.remove(pos);
                true
            }
            None => false,
        }
    }
}

impl Record for Scenario {
    const DIR: &'static str = paths::SCENARIOS_DIR;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.creation_date
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
