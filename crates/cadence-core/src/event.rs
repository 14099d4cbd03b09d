//! In-process change notifications.
//!
//! Consumers call [`Notifier::register`] and drain the returned receiver on
//! their own thread. Publishing never blocks: channels are unbounded and a
//! receiver that has been dropped is pruned on the next publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Cycle,
    Scenario,
    Pipeline,
    Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Creation,
    Update,
    Deletion,
    Submission,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Creation => "creation",
            Operation::Update => "update",
            Operation::Deletion => "deletion",
            Operation::Submission => "submission",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub entity_type: EntityType,
    pub operation: Operation,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(entity_type: EntityType, operation: Operation, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            operation,
            entity_id: entity_id.into(),
            attribute: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Fan-out of [`Event`]s to registered receivers. Cloning shares the
/// registration list.
#[derive(Clone, Default)]
pub struct Notifier {
    registrations: Arc<Mutex<Vec<(String, Sender<Event>)>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (String, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let id = Uuid::new_v4().to_string();
        self.lock().push((id.clone(), tx));
        (id, rx)
    }

    /// Returns `false` if `registration_id` was unknown.
    pub fn unregister(&self, registration_id: &str) -> bool {
        let mut regs = self.lock();
        let before = regs.len();
        regs.retain(|(id, _)| id != registration_id);
        regs.len() < before
    }

    pub fn registration_count(&self) -> usize {
        self.lock().len()
    }

    pub fn publish(&self, event: Event) {
        tracing::debug!(
            entity = ?event.entity_type,
            operation = %event.operation,
            id = %event.entity_id,
            attribute = event.attribute.as_deref().unwrap_or(""),
            "event"
        );
        self.lock().retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Sender<Event>)>> {
        // A panic while holding the lock leaves the list itself intact.
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("registrations", &self.registration_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_receivers_get_every_event() {
        let notifier = Notifier::new();
        let (_a, rx_a) = notifier.register();
        let (_b, rx_b) = notifier.register();

        notifier.publish(Event::new(EntityType::Cycle, Operation::Creation, "CYCLE_1"));

        assert_eq!(rx_a.try_recv().unwrap().entity_id, "CYCLE_1");
        assert_eq!(rx_b.try_recv().unwrap().operation, Operation::Creation);
    }

    #[test]
    fn unregister_stops_delivery() {
        let notifier = Notifier::new();
        let (id, rx) = notifier.register();
        assert!(notifier.unregister(&id));
        assert!(!notifier.unregister(&id));

        notifier.publish(Event::new(EntityType::Job, Operation::Creation, "JOB_1"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let notifier = Notifier::new();
        let (_id, rx) = notifier.register();
        drop(rx);

        notifier.publish(Event::new(EntityType::Scenario, Operation::Update, "S"));
        assert_eq!(notifier.registration_count(), 0);
    }

    #[test]
    fn clones_share_registrations() {
        let notifier = Notifier::new();
        let (_id, rx) = notifier.register();
        let clone = notifier.clone();

        clone.publish(
            Event::new(EntityType::Scenario, Operation::Update, "S").with_attribute("tags"),
        );
        assert_eq!(rx.try_recv().unwrap().attribute.as_deref(), Some("tags"));
    }
}
