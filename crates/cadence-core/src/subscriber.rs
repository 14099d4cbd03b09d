use crate::job::{Job, JobCallback};
use crate::scenario::Scenario;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Status callback for jobs of a scenario. Scenarios persist only the
/// registration name; the function lives in a [`SubscriberRegistry`].
pub type ScenarioCallback = Arc<dyn Fn(&Scenario, &Job) + Send + Sync>;

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    callbacks: BTreeMap<String, ScenarioCallback>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `log`, which traces every job it is handed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("log", |scenario: &Scenario, job: &Job| {
            tracing::info!(
                scenario = %scenario.id,
                job = %job.id,
                pipeline = %job.pipeline_id,
                status = %job.status,
                "job update"
            );
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Scenario, &Job) + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.callbacks.keys().map(String::as_str)
    }

    /// One job-only callback per subscriber of `scenario`, each with the
    /// scenario already applied. Unregistered names are skipped.
    pub fn bind(&self, scenario: &Scenario) -> Vec<JobCallback> {
        let bound = Arc::new(scenario.clone());
        scenario
            .subscribers
            .iter()
            .filter_map(|name| {
                let Some(callback) = self.callbacks.get(name) else {
                    tracing::warn!(scenario = %scenario.id, subscriber = %name, "subscriber not registered, skipping");
                    return None;
                };
                let callback = Arc::clone(callback);
                let scenario = Arc::clone(&bound);
                Some(Box::new(move |job: &Job| callback(&scenario, job)) as JobCallback)
            })
            .collect()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.callbacks.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[test]
    fn bind_applies_scenario_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        for name in ["first", "second"] {
            let sink = Arc::clone(&seen);
            registry.register(name, move |s: &Scenario, j: &Job| {
                sink.lock()
                    .unwrap()
                    .push(format!("{name}:{}:{}", s.config_id, j.id));
            });
        }

        let mut scenario = Scenario::new("plan", BTreeMap::new(), BTreeMap::new(), BTreeMap::new(), None, None);
        scenario.add_subscriber("second");
        scenario.add_subscriber("ghost");
        scenario.add_subscriber("first");

        let callbacks = registry.bind(&scenario);
        assert_eq!(callbacks.len(), 2);

        let job = Job::new("p", "PIPELINE_p_1", None, JobStatus::Submitted, false);
        for cb in &callbacks {
            cb(&job);
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![format!("second:plan:{}", job.id), format!("first:plan:{}", job.id)]
        );
    }

    #[test]
    fn builtins_include_log() {
        let registry = SubscriberRegistry::with_builtins();
        assert!(registry.contains("log"));
        assert!(!registry.contains("email"));
    }
}
