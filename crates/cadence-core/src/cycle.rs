use crate::error::{CadenceError, Result};
use crate::event::{EntityType, Event, Notifier, Operation};
use crate::paths;
use crate::repository::{Record, Repository};
use crate::types::{self, Frequency, DISPLAY_NAME_KEY};
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Bucket arithmetic
// ---------------------------------------------------------------------------

/// Canonical start of the `frequency` bucket containing `instant`: midnight
/// of the day, of that week's Monday, of the 1st of the month, or of Jan 1.
pub fn bucket_start(frequency: Frequency, instant: DateTime<Utc>) -> DateTime<Utc> {
    let date = instant.date_naive();
    let start = match frequency {
        Frequency::Daily => date,
        Frequency::Weekly => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
        Frequency::Monthly => date - Days::new(u64::from(date.day0())),
        Frequency::Yearly => date - Days::new(u64::from(date.ordinal0())),
    };
    start.and_time(NaiveTime::MIN).and_utc()
}

/// Last representable instant of the bucket starting at `start`: one
/// microsecond before the next bucket begins.
pub fn bucket_end(frequency: Frequency, start: DateTime<Utc>) -> DateTime<Utc> {
    let next = match frequency {
        Frequency::Daily => start.checked_add_days(Days::new(1)),
        Frequency::Weekly => start.checked_add_days(Days::new(
            7 - u64::from(start.weekday().num_days_from_monday()),
        )),
        Frequency::Monthly => start.checked_add_months(Months::new(1)),
        Frequency::Yearly => start.checked_add_months(Months::new(12)),
    };
    // Saturates at the end of chrono's supported range.
    next.unwrap_or(DateTime::<Utc>::MAX_UTC) - Duration::microseconds(1)
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: String,
    pub frequency: Frequency,
    pub creation_date: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Cycle {
    pub fn new(
        frequency: Frequency,
        creation_date: DateTime<Utc>,
        display_name: Option<&str>,
        mut properties: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let start_date = bucket_start(frequency, creation_date);
        let end_date = bucket_end(frequency, start_date);
        let display_name = display_name
            .map(str::to_string)
            .unwrap_or_else(|| start_date.to_rfc3339_opts(SecondsFormat::Secs, true));
        properties.insert(
            DISPLAY_NAME_KEY.to_string(),
            serde_json::Value::String(display_name),
        );
        Self {
            id: types::new_id(types::CYCLE_PREFIX, frequency.as_str()),
            frequency,
            creation_date,
            start_date,
            end_date,
            properties,
        }
    }

    pub fn display_name(&self) -> &str {
        self.properties
            .get(DISPLAY_NAME_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    /// Whether `instant` falls within `[start_date, end_date]`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_date <= instant && instant <= self.end_date
    }
}

impl Record for Cycle {
    const DIR: &'static str = paths::CYCLES_DIR;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.creation_date
    }
}

// ---------------------------------------------------------------------------
// CycleManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CycleManager {
    repo: Repository<Cycle>,
    notifier: Notifier,
}

impl CycleManager {
    pub fn new(root: &Path, notifier: Notifier) -> Self {
        Self {
            repo: Repository::new(root),
            notifier,
        }
    }

    /// Always creates a new cycle, even if one already covers the bucket.
    /// Prefer [`CycleManager::get_or_create`].
    pub fn create(
        &self,
        frequency: Frequency,
        creation_date: Option<DateTime<Utc>>,
        display_name: Option<&str>,
        properties: BTreeMap<String, serde_json::Value>,
    ) -> Result<Cycle> {
        let creation_date = creation_date.unwrap_or_else(Utc::now);
        let cycle = Cycle::new(frequency, creation_date, display_name, properties);
        self.repo.set(&cycle)?;
        tracing::info!(
            id = %cycle.id,
            frequency = %frequency,
            start = %cycle.start_date,
            "cycle created"
        );
        self.notifier
            .publish(Event::new(EntityType::Cycle, Operation::Creation, &cycle.id));
        Ok(cycle)
    }

    /// The cycle covering `creation_date` (default now) at `frequency`,
    /// created if no such bucket exists yet.
    pub fn get_or_create(
        &self,
        frequency: Frequency,
        creation_date: Option<DateTime<Utc>>,
        display_name: Option<&str>,
    ) -> Result<Cycle> {
        let creation_date = creation_date.unwrap_or_else(Utc::now);
        let start = bucket_start(frequency, creation_date);
        if let Some(existing) = self.find_by_frequency_and_start(frequency, start)? {
            return Ok(existing);
        }
        self.create(frequency, Some(creation_date), display_name, BTreeMap::new())
    }

    pub fn find_by_frequency_and_start(
        &self,
        frequency: Frequency,
        start: DateTime<Utc>,
    ) -> Result<Option<Cycle>> {
        Ok(self
            .get_all_by_frequency(frequency)?
            .into_iter()
            .find(|c| c.start_date == start))
    }

    pub fn get(&self, id: &str) -> Result<Cycle> {
        self.repo
            .get(id)?
            .ok_or_else(|| CadenceError::NonExistingCycle(id.to_string()))
    }

    pub fn get_all(&self) -> Result<Vec<Cycle>> {
        self.repo.get_all()
    }

    pub fn get_all_by_frequency(&self, frequency: Frequency) -> Result<Vec<Cycle>> {
        self.repo
            .search_all("frequency", &serde_json::to_value(frequency)?)
    }

    pub fn set(&self, cycle: &Cycle) -> Result<()> {
        self.repo.set(cycle)?;
        self.notifier.publish(
            Event::new(EntityType::Cycle, Operation::Update, &cycle.id).with_attribute("properties"),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
