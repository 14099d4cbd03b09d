//! Scenario lifecycle: creation, submission, master election, tagging,
//! comparison and deletion.
//!
//! Every mutation is persisted before the operation returns. Guards run
//! before the first write, so a rejected operation leaves no partial state.
//! A `create` that fails midway removes the pipelines it had made.
//!
//! Master election and tag transfer read one scenario and write another.
//! Those sequences hold the manager's election lock, which serializes
//! callers sharing this manager. Writers in other processes are not
//! covered and must be serialized by the caller.

use crate::comparator::{Comparator, ComparatorRegistry};
use crate::config::{Config, PipelineConfig, ScenarioConfig};
use crate::cycle::CycleManager;
use crate::data::DataStore;
use crate::error::{CadenceError, Result};
use crate::event::{EntityType, Event, Notifier, Operation};
use crate::job::Job;
use crate::pipeline::{FsPipelineManager, Pipeline, PipelineManager};
use crate::repository::Repository;
use crate::scenario::Scenario;
use crate::subscriber::SubscriberRegistry;
use crate::types::DISPLAY_NAME_KEY;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Data node config id → comparator name → comparator output.
pub type Comparison = BTreeMap<String, BTreeMap<String, Value>>;

pub struct ScenarioManager {
    root: PathBuf,
    config: Config,
    cycles: CycleManager,
    scenarios: Repository<Scenario>,
    pipelines: Box<dyn PipelineManager>,
    data: DataStore,
    comparators: ComparatorRegistry,
    subscribers: SubscriberRegistry,
    notifier: Notifier,
    election: Mutex<()>,
}

impl ScenarioManager {
    /// Manager over `root` using the file-backed pipeline manager and the
    /// built-in comparators and subscribers.
    pub fn new(root: &Path, config: Config) -> Self {
        let notifier = Notifier::new();
        Self {
            root: root.to_path_buf(),
            config,
            cycles: CycleManager::new(root, notifier.clone()),
            scenarios: Repository::new(root),
            pipelines: Box::new(FsPipelineManager::new(root, notifier.clone())),
            data: DataStore::new(root),
            comparators: ComparatorRegistry::with_builtins(),
            subscribers: SubscriberRegistry::with_builtins(),
            notifier,
            election: Mutex::new(()),
        }
    }

    /// Load `.cadence/config.yaml` under `root` and build a manager over it.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        Ok(Self::new(root, config))
    }

    pub fn with_pipeline_manager(mut self, pipelines: impl PipelineManager + 'static) -> Self {
        self.pipelines = Box::new(pipelines);
        self
    }

    pub fn with_comparators(mut self, comparators: ComparatorRegistry) -> Self {
        self.comparators = comparators;
        self
    }

    pub fn with_subscribers(mut self, subscribers: SubscriberRegistry) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cycles(&self) -> &CycleManager {
        &self.cycles
    }

    pub fn pipelines(&self) -> &dyn PipelineManager {
        self.pipelines.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn comparators(&self) -> &ComparatorRegistry {
        &self.comparators
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Instantiate `config` as a new scenario. The first scenario of a cycle
    /// becomes its master.
    pub fn create(
        &self,
        config: &ScenarioConfig,
        creation_date: Option<DateTime<Utc>>,
        display_name: Option<&str>,
    ) -> Result<Scenario> {
        let pipeline_configs = self.config.pipeline_configs(config)?;

        let mut properties = config.properties.clone();
        if let Some(name) = display_name {
            properties.insert(DISPLAY_NAME_KEY.to_string(), Value::String(name.to_string()));
        }
        let mut scenario = Scenario::new(
            &config.id,
            BTreeMap::new(),
            BTreeMap::new(),
            properties,
            creation_date,
            None,
        );

        let _guard = self.elect();
        if let Some(frequency) = config.frequency {
            let cycle = self
                .cycles
                .get_or_create(frequency, Some(scenario.creation_date), None)?;
            scenario.is_master = self.get_all_by_cycle(&cycle.id)?.is_empty();
            scenario.cycle = Some(cycle.id);
        }

        let persisted = self
            .materialize_pipelines(&mut scenario, &pipeline_configs)
            .and_then(|()| self.scenarios.set(&scenario));
        if let Err(e) = persisted {
            self.discard_pipelines(&scenario);
            return Err(e);
        }

        tracing::info!(
            id = %scenario.id,
            config = %scenario.config_id,
            cycle = scenario.cycle.as_deref().unwrap_or("-"),
            master = scenario.is_master,
            "scenario created"
        );
        self.notifier
            .publish(Event::new(EntityType::Scenario, Operation::Creation, &scenario.id));
        Ok(scenario)
    }

    fn materialize_pipelines(
        &self,
        scenario: &mut Scenario,
        pipeline_configs: &[&PipelineConfig],
    ) -> Result<()> {
        for pipeline_config in pipeline_configs {
            let pipeline =
                self.pipelines
                    .get_or_create(pipeline_config, &scenario.id, &scenario.data_nodes)?;
            for (dn, id) in &pipeline.data_nodes {
                scenario.data_nodes.entry(dn.clone()).or_insert_with(|| id.clone());
            }
            scenario
                .pipelines
                .insert(pipeline_config.id.clone(), pipeline.id);
        }
        Ok(())
    }

    /// Best-effort removal of the pipelines a failed `create` left behind.
    fn discard_pipelines(&self, scenario: &Scenario) {
        for pipeline_id in scenario.pipelines.values() {
            let owned = matches!(
                self.pipelines.get(pipeline_id),
                Ok(Some(p)) if p.is_owned_by(&scenario.id)
            );
            if owned {
                if let Err(e) = self.pipelines.hard_delete(pipeline_id, &scenario.id) {
                    tracing::warn!(pipeline = %pipeline_id, error = %e, "failed to discard pipeline");
                }
            }
        }
    }

    /// Look up the scenario config by id and instantiate it.
    pub fn create_from_config_id(
        &self,
        config_id: &str,
        creation_date: Option<DateTime<Utc>>,
        display_name: Option<&str>,
    ) -> Result<Scenario> {
        let config = self.config.scenario(config_id)?.clone();
        self.create(&config, creation_date, display_name)
    }

    // -----------------------------------------------------------------------
    // Submission & subscribers
    // -----------------------------------------------------------------------

    /// Submit every pipeline of the scenario with its subscribers bound.
    /// Returns the jobs created, one per pipeline.
    pub fn submit(&self, scenario_id: &str, force: bool) -> Result<Vec<Job>> {
        let scenario = self.get(scenario_id)?;

        let mut pipelines: Vec<Pipeline> = Vec::with_capacity(scenario.pipelines.len());
        for pipeline_id in scenario.pipelines.values() {
            let pipeline = self
                .pipelines
                .get(pipeline_id)?
                .ok_or_else(|| CadenceError::NonExistingPipeline(pipeline_id.clone()))?;
            pipelines.push(pipeline);
        }

        let callbacks = self.subscribers.bind(&scenario);
        let mut jobs = Vec::with_capacity(pipelines.len());
        for pipeline in &pipelines {
            jobs.push(self.pipelines.submit(pipeline, &callbacks, force)?);
        }

        tracing::info!(id = %scenario.id, jobs = jobs.len(), force, "scenario submitted");
        self.notifier
            .publish(Event::new(EntityType::Scenario, Operation::Submission, &scenario.id));
        Ok(jobs)
    }

    /// Add subscriber `name` to one scenario, or to every scenario if
    /// `scenario_id` is `None`.
    pub fn subscribe(&self, name: &str, scenario_id: Option<&str>) -> Result<()> {
        if !self.subscribers.contains(name) {
            return Err(CadenceError::UnknownSubscriber(name.to_string()));
        }
        for mut scenario in self.targets(scenario_id)? {
            scenario.add_subscriber(name);
            self.persist(&scenario, "subscribers")?;
        }
        Ok(())
    }

    /// Remove subscriber `name` from one scenario, or from every scenario if
    /// `scenario_id` is `None`. Scenarios without it are left untouched.
    pub fn unsubscribe(&self, name: &str, scenario_id: Option<&str>) -> Result<()> {
        for mut scenario in self.targets(scenario_id)? {
            if scenario.remove_subscriber(name) {
                self.persist(&scenario, "subscribers")?;
            }
        }
        Ok(())
    }

    fn targets(&self, scenario_id: Option<&str>) -> Result<Vec<Scenario>> {
        match scenario_id {
            Some(id) => Ok(vec![self.get(id)?]),
            None => self.get_all(),
        }
    }

    // -----------------------------------------------------------------------
    // Master election
    // -----------------------------------------------------------------------

    /// Promote the scenario to master of its cycle, demoting the previous one.
    pub fn set_master(&self, scenario_id: &str) -> Result<Scenario> {
        let _guard = self.elect();
        let mut scenario = self.get(scenario_id)?;
        let Some(cycle_id) = scenario.cycle.clone() else {
            return Err(CadenceError::DoesNotBelongToACycle(scenario.id));
        };

        if let Some(mut previous) = self.get_master(&cycle_id)? {
            if previous.id != scenario.id {
                previous.is_master = false;
                self.persist(&previous, "is_master")?;
            }
        }
        scenario.is_master = true;
        self.persist(&scenario, "is_master")?;

        tracing::info!(id = %scenario.id, cycle = %cycle_id, "master scenario set");
        Ok(scenario)
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Tag the scenario, taking the tag away from whichever scenario of the
    /// same cycle held it.
    pub fn tag(&self, scenario_id: &str, tag: &str) -> Result<Scenario> {
        let _guard = self.elect();
        let mut scenario = self.get(scenario_id)?;
        if !scenario.is_tag_authorized(tag) {
            return Err(CadenceError::UnauthorizedTag {
                tag: tag.to_string(),
                config_id: scenario.config_id,
            });
        }

        if let Some(cycle_id) = scenario.cycle.as_deref() {
            if let Some(mut holder) = self.get_by_tag(cycle_id, tag)? {
                if holder.id != scenario.id {
                    holder.remove_tag(tag);
                    self.persist(&holder, "tags")?;
                    tracing::debug!(tag, from = %holder.id, to = %scenario.id, "tag transferred");
                }
            }
        }
        scenario.add_tag(tag);
        self.persist(&scenario, "tags")?;
        Ok(scenario)
    }

    pub fn untag(&self, scenario_id: &str, tag: &str) -> Result<Scenario> {
        let mut scenario = self.get(scenario_id)?;
        scenario.remove_tag(tag);
        self.persist(&scenario, "tags")?;
        Ok(scenario)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, scenario_id: &str) -> Result<Scenario> {
        self.scenarios
            .get(scenario_id)?
            .ok_or_else(|| CadenceError::NonExistingScenario(scenario_id.to_string()))
    }

    pub fn get_all(&self) -> Result<Vec<Scenario>> {
        self.scenarios.get_all()
    }

    pub fn get_master(&self, cycle_id: &str) -> Result<Option<Scenario>> {
        Ok(self
            .get_all_by_cycle(cycle_id)?
            .into_iter()
            .find(|s| s.is_master))
    }

    pub fn get_by_tag(&self, cycle_id: &str, tag: &str) -> Result<Option<Scenario>> {
        Ok(self
            .get_all_by_cycle(cycle_id)?
            .into_iter()
            .find(|s| s.has_tag(tag)))
    }

    pub fn get_all_by_tag(&self, tag: &str) -> Result<Vec<Scenario>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|s| s.has_tag(tag))
            .collect())
    }

    pub fn get_all_by_cycle(&self, cycle_id: &str) -> Result<Vec<Scenario>> {
        self.scenarios
            .search_all("cycle", &Value::String(cycle_id.to_string()))
    }

    pub fn get_all_masters(&self) -> Result<Vec<Scenario>> {
        self.scenarios.search_all("is_master", &Value::Bool(true))
    }

    pub fn get_all_by_config_id(&self, config_id: &str) -> Result<Vec<Scenario>> {
        self.scenarios
            .search_all("config_id", &Value::String(config_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Remove the scenario record only. Its pipelines stay in place.
    pub fn delete(&self, scenario_id: &str) -> Result<()> {
        let scenario = self.deletable(scenario_id)?;
        self.scenarios.delete(&scenario.id)?;
        tracing::info!(id = %scenario.id, "scenario deleted");
        self.notifier
            .publish(Event::new(EntityType::Scenario, Operation::Deletion, &scenario.id));
        Ok(())
    }

    /// Remove the scenario and hard-delete every pipeline it owns. Shared
    /// pipelines (their own parent) are left alone.
    pub fn hard_delete(&self, scenario_id: &str) -> Result<()> {
        let scenario = self.deletable(scenario_id)?;

        for pipeline_id in scenario.pipelines.values() {
            let Some(pipeline) = self.pipelines.get(pipeline_id)? else {
                continue;
            };
            if pipeline.is_owned_by(&scenario.id) && !pipeline.is_independent() {
                self.pipelines.hard_delete(&pipeline.id, &scenario.id)?;
            }
        }
        self.scenarios.delete(&scenario.id)?;

        tracing::info!(id = %scenario.id, "scenario hard-deleted");
        self.notifier
            .publish(Event::new(EntityType::Scenario, Operation::Deletion, &scenario.id));
        Ok(())
    }

    fn deletable(&self, scenario_id: &str) -> Result<Scenario> {
        let scenario = self.get(scenario_id)?;
        if scenario.is_master {
            return Err(CadenceError::DeletingMasterScenario(scenario.id));
        }
        Ok(scenario)
    }

    // -----------------------------------------------------------------------
    // Data & comparison
    // -----------------------------------------------------------------------

    fn data_node_id(scenario: &Scenario, data_node: &str) -> Result<String> {
        scenario
            .data_node(data_node)
            .map(str::to_string)
            .ok_or_else(|| CadenceError::NonExistingDataNode {
                scenario: scenario.id.clone(),
                data_node: data_node.to_string(),
            })
    }

    pub fn read_data(&self, scenario_id: &str, data_node: &str) -> Result<Option<Value>> {
        let scenario = self.get(scenario_id)?;
        self.data.read(&Self::data_node_id(&scenario, data_node)?)
    }

    pub fn write_data(&self, scenario_id: &str, data_node: &str, value: &Value) -> Result<()> {
        let scenario = self.get(scenario_id)?;
        self.data
            .write(&Self::data_node_id(&scenario, data_node)?, value)
    }

    /// Apply the configured comparators to the scenarios' data nodes, limited
    /// to `data_node` when given. Values are passed in `scenario_ids` order;
    /// a data node never written reads as `null`.
    pub fn compare<S: AsRef<str>>(
        &self,
        scenario_ids: &[S],
        data_node: Option<&str>,
    ) -> Result<Comparison> {
        if scenario_ids.len() < 2 {
            return Err(CadenceError::InsufficientScenarioToCompare);
        }
        let scenarios = scenario_ids
            .iter()
            .map(|id| self.get(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let config_id = &scenarios[0].config_id;
        if scenarios.iter().any(|s| &s.config_id != config_id) {
            return Err(CadenceError::DifferentScenarioConfigs);
        }
        let scenario_config = self.config.scenario(config_id)?;

        let selected: Vec<(&String, &Vec<String>)> = match data_node {
            Some(dn) => {
                let (key, names) = scenario_config
                    .comparators
                    .get_key_value(dn)
                    .ok_or_else(|| CadenceError::NonExistingComparator(dn.to_string()))?;
                vec![(key, names)]
            }
            None => scenario_config.comparators.iter().collect(),
        };

        // Resolve everything before reading any value.
        let mut plan: Vec<(&str, Vec<String>, Vec<(&str, &Comparator)>)> = Vec::new();
        for (dn, names) in selected {
            let functions = names
                .iter()
                .map(|name| {
                    self.comparators
                        .get(name)
                        .map(|f| (name.as_str(), f))
                        .ok_or_else(|| CadenceError::UnknownComparatorFunction(name.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            let data_node_ids = scenarios
                .iter()
                .map(|s| Self::data_node_id(s, dn))
                .collect::<Result<Vec<_>>>()?;
            plan.push((dn.as_str(), data_node_ids, functions));
        }

        let mut results = Comparison::new();
        for (dn, data_node_ids, functions) in plan {
            let values = data_node_ids
                .iter()
                .map(|id| Ok(self.data.read(id)?.unwrap_or(Value::Null)))
                .collect::<Result<Vec<_>>>()?;
            let outputs = functions
                .into_iter()
                .map(|(name, f)| (name.to_string(), f(values.as_slice())))
                .collect();
            results.insert(dn.to_string(), outputs);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn persist(&self, scenario: &Scenario, attribute: &str) -> Result<()> {
        self.scenarios.set(scenario)?;
        self.notifier.publish(
            Event::new(EntityType::Scenario, Operation::Update, &scenario.id)
                .with_attribute(attribute),
        );
        Ok(())
    }

    fn elect(&self) -> MutexGuard<'_, ()> {
        self.election
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::job::JobCallback;
    use crate::types::{Frequency, JobStatus};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const CONFIG: &str = r#"
pipelines:
  - id: forecast
    data_nodes: [sales, predictions]
  - id: reference
    data_nodes: [holidays]
    scope: global
  - id: produce
    data_nodes: [shared]
  - id: consume
    data_nodes: [shared, report]
scenarios:
  - id: weekly_plan
    pipelines: [forecast, reference]
    frequency: weekly
    comparators:
      predictions: [equal, delta]
      sales: [equal]
  - id: restricted
    pipelines: [forecast]
    frequency: weekly
    properties:
      authorized_tags: [production, candidate]
  - id: adhoc
    pipelines: [forecast]
    comparators:
      sales: [missing_fn]
  - id: chain
    pipelines: [produce, consume]
    frequency: weekly
"#;

    fn setup(dir: &TempDir) -> ScenarioManager {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        config.save(dir.path()).unwrap();
        ScenarioManager::open(dir.path()).unwrap()
    }

    /// Wednesday of the week starting Monday 2022-03-07.
    fn week_1() -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2022, 3, 9, 10, 0, 0).unwrap())
    }

    fn week_2() -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2022, 3, 16, 10, 0, 0).unwrap())
    }

    fn create(m: &ScenarioManager, config_id: &str, at: Option<DateTime<Utc>>) -> Scenario {
        m.create_from_config_id(config_id, at, None).unwrap()
    }

    // -- creation ------------------------------------------------------------

    #[test]
    fn first_scenario_in_cycle_is_master() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);

        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());
        let c = create(&m, "weekly_plan", week_2());

        assert!(a.is_master);
        assert!(!b.is_master);
        assert!(c.is_master);
        assert_eq!(a.cycle, b.cycle);
        assert_ne!(a.cycle, c.cycle);

        let cycle = m.cycles().get(a.cycle.as_deref().unwrap()).unwrap();
        assert_eq!(
            cycle.start_date,
            Utc.with_ymd_and_hms(2022, 3, 7, 0, 0, 0).unwrap()
        );
        assert_eq!(m.get_all_masters().unwrap().len(), 2);
    }

    #[test]
    fn create_without_frequency_has_no_cycle() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);

        let s = m.create_from_config_id("adhoc", None, Some("Ad hoc run")).unwrap();
        assert!(s.cycle.is_none());
        assert!(!s.is_master);
        assert_eq!(s.display_name(), Some("Ad hoc run"));
        assert_eq!(m.get(&s.id).unwrap(), s);
    }

    #[test]
    fn create_builds_pipelines_and_data_nodes() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);

        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());

        assert_eq!(a.pipelines.len(), 2);
        assert_eq!(a.data_nodes.len(), 3);
        assert_ne!(a.pipelines["forecast"], b.pipelines["forecast"]);
        // The global pipeline is shared between scenarios.
        assert_eq!(a.pipelines["reference"], b.pipelines["reference"]);

        let forecast = m.pipelines().get(&a.pipelines["forecast"]).unwrap().unwrap();
        assert_eq!(forecast.parent_id, a.id);
    }

    #[test]
    fn pipelines_of_one_scenario_share_a_data_node() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let s = create(&m, "chain", week_1());

        let produce = m.pipelines().get(&s.pipelines["produce"]).unwrap().unwrap();
        let consume = m.pipelines().get(&s.pipelines["consume"]).unwrap().unwrap();
        assert_eq!(produce.data_nodes["shared"], consume.data_nodes["shared"]);
        assert_eq!(s.data_nodes["shared"], produce.data_nodes["shared"]);

        m.write_data(&s.id, "shared", &json!(1)).unwrap();
        m.write_data(&s.id, "report", &json!("ok")).unwrap();
        let jobs = m.submit(&s.id, false).unwrap();
        assert!(jobs.iter().all(|j| j.status == JobStatus::Skipped));
    }

    /// Fails `get_or_create` for one pipeline config, delegating the rest.
    struct FailingPipelines {
        inner: FsPipelineManager,
        fail_on: &'static str,
    }

    impl PipelineManager for FailingPipelines {
        fn get_or_create(
            &self,
            config: &PipelineConfig,
            scenario_id: &str,
            data_nodes: &BTreeMap<String, String>,
        ) -> Result<Pipeline> {
            if config.id == self.fail_on {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.get_or_create(config, scenario_id, data_nodes)
        }

        fn get(&self, id: &str) -> Result<Option<Pipeline>> {
            self.inner.get(id)
        }

        fn submit(&self, pipeline: &Pipeline, callbacks: &[JobCallback], force: bool) -> Result<Job> {
            self.inner.submit(pipeline, callbacks, force)
        }

        fn hard_delete(&self, pipeline_id: &str, scenario_id: &str) -> Result<()> {
            self.inner.hard_delete(pipeline_id, scenario_id)
        }
    }

    #[test]
    fn failed_create_leaves_no_pipelines_behind() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir).with_pipeline_manager(FailingPipelines {
            inner: FsPipelineManager::new(dir.path(), Notifier::new()),
            fail_on: "reference",
        });

        let err = m
            .create_from_config_id("weekly_plan", week_1(), None)
            .unwrap_err();
        assert!(matches!(err, CadenceError::Io(_)));
        assert!(m.get_all().unwrap().is_empty());
        let leftovers = FsPipelineManager::new(dir.path(), Notifier::new())
            .get_all()
            .unwrap();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn create_unknown_config_fails() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        assert!(matches!(
            m.create_from_config_id("nope", None, None),
            Err(CadenceError::NonExistingScenarioConfig(_))
        ));
    }

    // -- master election -----------------------------------------------------

    #[test]
    fn set_master_moves_flag() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());
        let cycle = a.cycle.clone().unwrap();

        m.set_master(&b.id).unwrap();

        assert_eq!(m.get_master(&cycle).unwrap().unwrap().id, b.id);
        assert!(!m.get(&a.id).unwrap().is_master);
        assert_eq!(m.get_all_masters().unwrap().len(), 1);
    }

    #[test]
    fn set_master_is_idempotent_for_current_master() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());

        m.set_master(&a.id).unwrap();
        assert!(m.get(&a.id).unwrap().is_master);
    }

    #[test]
    fn set_master_without_cycle_fails() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let s = create(&m, "adhoc", None);

        assert!(matches!(
            m.set_master(&s.id),
            Err(CadenceError::DoesNotBelongToACycle(_))
        ));
        assert!(!m.get(&s.id).unwrap().is_master);
    }

    #[test]
    fn concurrent_creates_elect_one_master() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);

        let created: Vec<Scenario> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| create(&m, "chain", week_1())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(created.iter().filter(|s| s.is_master).count(), 1);
        assert_eq!(m.cycles().get_all().unwrap().len(), 1);
        assert_eq!(m.get_all_masters().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_set_master_and_tag_keep_one_holder() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let ids: Vec<String> = (0..6).map(|_| create(&m, "chain", week_1()).id).collect();
        let cycle = m.get(&ids[0]).unwrap().cycle.unwrap();

        std::thread::scope(|scope| {
            for id in &ids {
                let m = &m;
                scope.spawn(move || {
                    m.set_master(id).unwrap();
                    m.tag(id, "best").unwrap();
                });
            }
        });

        assert_eq!(m.get_all_masters().unwrap().len(), 1);
        assert_eq!(m.get_all_by_tag("best").unwrap().len(), 1);
        assert!(m.get_master(&cycle).unwrap().is_some());
    }

    // -- tags ----------------------------------------------------------------

    #[test]
    fn tag_transfers_within_cycle() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());
        let other_week = create(&m, "weekly_plan", week_2());
        let cycle = a.cycle.clone().unwrap();

        m.tag(&a.id, "best").unwrap();
        m.tag(&other_week.id, "best").unwrap();
        m.tag(&b.id, "best").unwrap();

        assert!(!m.get(&a.id).unwrap().has_tag("best"));
        assert_eq!(m.get_by_tag(&cycle, "best").unwrap().unwrap().id, b.id);
        // Other cycles keep their own holder.
        assert!(m.get(&other_week.id).unwrap().has_tag("best"));
        assert_eq!(m.get_all_by_tag("best").unwrap().len(), 2);
    }

    #[test]
    fn tags_without_cycle_are_not_exclusive() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "adhoc", None);
        let b = create(&m, "adhoc", None);

        m.tag(&a.id, "draft").unwrap();
        m.tag(&b.id, "draft").unwrap();
        assert_eq!(m.get_all_by_tag("draft").unwrap().len(), 2);
    }

    #[test]
    fn unauthorized_tag_is_rejected_without_changes() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let s = create(&m, "restricted", week_1());

        let err = m.tag(&s.id, "scratch").unwrap_err();
        assert!(matches!(err, CadenceError::UnauthorizedTag { ref tag, .. } if tag == "scratch"));
        assert!(m.get(&s.id).unwrap().tags.is_empty());

        m.tag(&s.id, "production").unwrap();
        assert!(m.get(&s.id).unwrap().has_tag("production"));
    }

    #[test]
    fn untag_removes() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let s = create(&m, "weekly_plan", week_1());

        m.tag(&s.id, "best").unwrap();
        m.untag(&s.id, "best").unwrap();
        m.untag(&s.id, "never-set").unwrap();
        assert!(m.get(&s.id).unwrap().tags.is_empty());
    }

    // -- queries -------------------------------------------------------------

    #[test]
    fn query_filters() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        create(&m, "weekly_plan", week_1());
        create(&m, "restricted", week_1());
        create(&m, "adhoc", None);

        let cycle = a.cycle.clone().unwrap();
        assert_eq!(m.get_all().unwrap().len(), 4);
        assert_eq!(m.get_all_by_cycle(&cycle).unwrap().len(), 3);
        assert_eq!(m.get_all_by_config_id("weekly_plan").unwrap().len(), 2);
        assert_eq!(m.get_all_masters().unwrap().len(), 1);
        assert!(m.get_by_tag(&cycle, "none").unwrap().is_none());
        assert!(m.get_master("CYCLE_weekly_unknown").unwrap().is_none());
    }

    // -- deletion ------------------------------------------------------------

    #[test]
    fn deleting_master_fails_and_keeps_state() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());

        assert!(matches!(
            m.delete(&a.id),
            Err(CadenceError::DeletingMasterScenario(_))
        ));
        assert!(matches!(
            m.hard_delete(&a.id),
            Err(CadenceError::DeletingMasterScenario(_))
        ));
        assert!(m.get(&a.id).is_ok());
        assert!(m.pipelines().get(&a.pipelines["forecast"]).unwrap().is_some());
    }

    #[test]
    fn soft_delete_keeps_pipelines() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());

        m.delete(&b.id).unwrap();
        assert!(matches!(
            m.get(&b.id),
            Err(CadenceError::NonExistingScenario(_))
        ));
        assert!(m.pipelines().get(&b.pipelines["forecast"]).unwrap().is_some());
    }

    #[test]
    fn hard_delete_cascades_to_owned_pipelines_only() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());
        m.write_data(&b.id, "sales", &json!(5)).unwrap();

        m.hard_delete(&b.id).unwrap();

        assert!(m.get(&b.id).is_err());
        assert!(m.pipelines().get(&b.pipelines["forecast"]).unwrap().is_none());
        assert!(m.pipelines().get(&b.pipelines["reference"]).unwrap().is_some());
        assert!(!DataStore::new(dir.path()).has_value(&b.data_nodes["sales"]));
    }

    #[test]
    fn delete_unknown_scenario_fails() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        assert!(matches!(
            m.hard_delete("SCENARIO_x_1"),
            Err(CadenceError::NonExistingScenario(_))
        ));
    }

    // -- submission & subscribers --------------------------------------------

    #[test]
    fn submit_unknown_scenario_fails() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        assert!(matches!(
            m.submit("SCENARIO_x_1", false),
            Err(CadenceError::NonExistingScenario(_))
        ));
    }

    #[test]
    fn submit_binds_subscribers_to_scenario() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut subscribers = SubscriberRegistry::new();
        subscribers.register("record", move |s: &Scenario, j: &Job| {
            sink.lock().unwrap().push((s.id.clone(), j.pipeline_id.clone()));
        });
        let m = setup(&dir).with_subscribers(subscribers);

        let s = create(&m, "weekly_plan", week_1());
        m.subscribe("record", Some(s.id.as_str())).unwrap();
        let jobs = m.submit(&s.id, false).unwrap();

        assert_eq!(jobs.len(), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(sid, _)| sid == &s.id));
    }

    #[test]
    fn submit_force_bypasses_skip() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let s = create(&m, "adhoc", None);
        m.write_data(&s.id, "sales", &json!(1)).unwrap();
        m.write_data(&s.id, "predictions", &json!(2)).unwrap();

        assert_eq!(m.submit(&s.id, false).unwrap()[0].status, JobStatus::Skipped);
        assert_eq!(m.submit(&s.id, true).unwrap()[0].status, JobStatus::Submitted);
    }

    #[test]
    fn subscribe_all_and_unsubscribe() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "adhoc", None);

        m.subscribe("log", None).unwrap();
        assert_eq!(m.get(&a.id).unwrap().subscribers, vec!["log"]);
        assert_eq!(m.get(&b.id).unwrap().subscribers, vec!["log"]);

        m.unsubscribe("log", Some(a.id.as_str())).unwrap();
        assert!(m.get(&a.id).unwrap().subscribers.is_empty());
        assert_eq!(m.get(&b.id).unwrap().subscribers, vec!["log"]);

        assert!(matches!(
            m.subscribe("email", None),
            Err(CadenceError::UnknownSubscriber(_))
        ));
    }

    // -- comparison ----------------------------------------------------------

    #[test]
    fn compare_applies_every_comparator() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());
        m.write_data(&a.id, "predictions", &json!(100)).unwrap();
        m.write_data(&b.id, "predictions", &json!(120)).unwrap();
        m.write_data(&a.id, "sales", &json!([1, 2])).unwrap();
        m.write_data(&b.id, "sales", &json!([1, 2])).unwrap();

        let result = m.compare(&[&a.id, &b.id], None).unwrap();
        assert_eq!(result["predictions"]["equal"], json!(false));
        assert_eq!(result["predictions"]["delta"], json!([20.0]));
        assert_eq!(result["sales"]["equal"], json!(true));

        let only = m.compare(&[&a.id, &b.id], Some("sales")).unwrap();
        assert_eq!(only.len(), 1);
        assert!(only.contains_key("sales"));
    }

    #[test]
    fn compare_unwritten_values_read_as_null() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_2());

        let result = m.compare(&[&a.id, &b.id], Some("sales")).unwrap();
        assert_eq!(result["sales"]["equal"], json!(true));
    }

    #[test]
    fn compare_guards() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());
        let r = create(&m, "restricted", week_1());
        let x = create(&m, "adhoc", None);
        let y = create(&m, "adhoc", None);

        assert!(matches!(
            m.compare(&[&a.id], None),
            Err(CadenceError::InsufficientScenarioToCompare)
        ));
        assert!(matches!(
            m.compare(&[&a.id, &r.id], None),
            Err(CadenceError::DifferentScenarioConfigs)
        ));
        assert!(matches!(
            m.compare(&[&a.id, &b.id], Some("holidays")),
            Err(CadenceError::NonExistingComparator(dn)) if dn == "holidays"
        ));
        assert!(matches!(
            m.compare(&[&x.id, &y.id], None),
            Err(CadenceError::UnknownComparatorFunction(name)) if name == "missing_fn"
        ));
    }

    #[test]
    fn compare_with_custom_comparator() {
        let dir = TempDir::new().unwrap();
        let mut comparators = ComparatorRegistry::new();
        comparators.register("missing_fn", |values: &[Value]| json!(values.len()));
        let m = setup(&dir).with_comparators(comparators);
        let x = create(&m, "adhoc", None);
        let y = create(&m, "adhoc", None);
        let z = create(&m, "adhoc", None);

        let result = m.compare(&[&x.id, &y.id, &z.id], None).unwrap();
        assert_eq!(result["sales"]["missing_fn"], json!(3));
    }

    #[test]
    fn compare_missing_scenario_config() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());

        let m = ScenarioManager::new(dir.path(), Config::new());
        assert!(matches!(
            m.compare(&[&a.id, &b.id], None),
            Err(CadenceError::NonExistingScenarioConfig(id)) if id == "weekly_plan"
        ));
    }

    #[test]
    fn data_access_unknown_node_fails() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let s = create(&m, "adhoc", None);
        assert!(matches!(
            m.write_data(&s.id, "holidays", &json!(1)),
            Err(CadenceError::NonExistingDataNode { .. })
        ));
        assert_eq!(m.read_data(&s.id, "sales").unwrap(), None);
    }

    // -- events --------------------------------------------------------------

    #[test]
    fn lifecycle_publishes_events() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let (_id, rx) = m.notifier().register();

        let a = create(&m, "weekly_plan", week_1());
        let b = create(&m, "weekly_plan", week_1());
        m.tag(&b.id, "best").unwrap();
        m.submit(&b.id, false).unwrap();
        m.delete(&b.id).unwrap();

        let events: Vec<Event> = rx.try_iter().collect();
        let count = |t: EntityType, op: Operation| {
            events
                .iter()
                .filter(|e| e.entity_type == t && e.operation == op)
                .count()
        };
        assert_eq!(count(EntityType::Cycle, Operation::Creation), 1);
        assert_eq!(count(EntityType::Scenario, Operation::Creation), 2);
        // forecast per scenario plus one shared reference pipeline
        assert_eq!(count(EntityType::Pipeline, Operation::Creation), 3);
        assert_eq!(count(EntityType::Scenario, Operation::Update), 1);
        assert_eq!(count(EntityType::Scenario, Operation::Submission), 1);
        assert_eq!(count(EntityType::Job, Operation::Creation), 2);
        assert_eq!(count(EntityType::Scenario, Operation::Deletion), 1);
        assert!(events.iter().any(|e| e.entity_id == a.id));
        assert!(events
            .iter()
            .any(|e| e.attribute.as_deref() == Some("tags")));
    }

    #[test]
    fn frequency_is_taken_from_config() {
        let dir = TempDir::new().unwrap();
        let m = setup(&dir);
        let s = create(&m, "weekly_plan", week_1());
        let cycle = m.cycles().get(s.cycle.as_deref().unwrap()).unwrap();
        assert_eq!(cycle.frequency, Frequency::Weekly);
        assert!(cycle.contains(s.creation_date));
    }
}
