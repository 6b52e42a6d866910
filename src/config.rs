use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::calendar::HolidayCalendar;
use crate::directory::{InMemoryDirectory, InMemoryInventory};
use crate::engine::Collaborators;

/// Host settings, read from `CLUBSTAY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub reminder_lead: Duration,
    pub calendar_file: Option<PathBuf>,
    pub members_file: Option<PathBuf>,
    pub accommodations_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };
        let path = |key: &str| lookup(key).filter(|s| !s.is_empty()).map(PathBuf::from);

        Self {
            data_dir: path("CLUBSTAY_DATA_DIR").unwrap_or_else(|| PathBuf::from("./data")),
            metrics_port: lookup("CLUBSTAY_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            sweep_interval: Duration::from_secs(number("CLUBSTAY_SWEEP_INTERVAL_SECS", 60).max(1)),
            compact_threshold: number("CLUBSTAY_COMPACT_THRESHOLD", 1000),
            reminder_lead: Duration::from_secs(number("CLUBSTAY_REMINDER_LEAD_HOURS", 24).saturating_mul(3600)),
            calendar_file: path("CLUBSTAY_CALENDAR_FILE"),
            members_file: path("CLUBSTAY_MEMBERS_FILE"),
            accommodations_file: path("CLUBSTAY_ACCOMMODATIONS_FILE"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    /// Build the directory, inventory and calendar from the seed files.
    /// A missing setting yields an empty collaborator.
    pub fn load_collaborators(&self) -> Result<Collaborators, Box<dyn std::error::Error>> {
        let directory = match &self.members_file {
            Some(p) => InMemoryDirectory::from_json(&read(p)?)?,
            None => InMemoryDirectory::new(),
        };
        let inventory = match &self.accommodations_file {
            Some(p) => InMemoryInventory::from_json(&read(p)?)?,
            None => InMemoryInventory::new(),
        };
        let calendar = match &self.calendar_file {
            Some(p) => HolidayCalendar::from_json(&read(p)?)?,
            None => HolidayCalendar::new(),
        };
        tracing::info!(
            "loaded {} members, {} accommodations, {} holidays",
            directory.len(),
            inventory.len(),
            calendar.holiday_count()
        );
        Ok(Collaborators {
            directory: Arc::new(directory),
            inventory: Arc::new(inventory),
            calendar: Arc::new(calendar),
        })
    }
}

fn read(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()).into())
}
