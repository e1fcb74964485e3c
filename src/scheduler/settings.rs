use chrono::NaiveTime;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::error::{RelayError, RelayResult};

/// Time of day during which autonomous posting is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl SleepWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> RelayResult<Self> {
        if start == end {
            return Err(RelayError::Config(format!(
                "sleep window start and end are both {}",
                start.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    /// Empty `start` and `end` disable the window.
    pub fn parse(start: &str, end: &str) -> RelayResult<Option<Self>> {
        let (start, end) = (start.trim(), end.trim());
        match (start.is_empty(), end.is_empty()) {
            (true, true) => Ok(None),
            (false, false) => Self::new(parse_time(start)?, parse_time(end)?).map(Some),
            _ => Err(RelayError::Config(
                "sleep window needs both a start and an end".to_string(),
            )),
        }
    }

    /// Whether `now` falls inside the window. A window with start > end wraps midnight.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start > self.end {
            now > self.start || now < self.end
        } else {
            now > self.start && now < self.end
        }
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

fn parse_time(value: &str) -> RelayResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| RelayError::Config(format!("invalid time of day {:?}", value)))
}

/// Immutable snapshot of everything the scheduler reads on a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Activation chance out of 100.
    pub chance: u32,
    pub sleep_window: Option<SleepWindow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    interval: Option<String>,
    chance: Option<u32>,
    sleep_start: Option<String>,
    sleep_end: Option<String>,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> RelayResult<Self> {
        Ok(Self {
            interval: config.scheduler_interval,
            chance: config.scheduler_chance.min(100),
            sleep_window: SleepWindow::parse(&config.sleep_start, &config.sleep_end)?,
        })
    }

    /// Applies the keys present in a TOML document on top of `self`.
    pub fn with_overrides(&self, content: &str) -> RelayResult<Self> {
        let file: SettingsFile = toml::from_str(content)
            .map_err(|e| RelayError::Config(format!("invalid scheduler settings: {}", e)))?;

        let mut settings = self.clone();

        if let Some(interval) = file.interval {
            let interval = humantime::parse_duration(interval.trim())
                .map_err(|e| RelayError::Config(format!("invalid interval {:?}: {}", interval, e)))?;
            if interval.is_zero() {
                return Err(RelayError::Config("interval must be positive".to_string()));
            }
            settings.interval = interval;
        }

        if let Some(chance) = file.chance {
            if chance > 100 {
                return Err(RelayError::Config(format!("chance {} is above 100", chance)));
            }
            settings.chance = chance;
        }

        match (file.sleep_start, file.sleep_end) {
            (None, None) => {}
            (Some(start), Some(end)) => settings.sleep_window = SleepWindow::parse(&start, &end)?,
            _ => {
                return Err(RelayError::Config(
                    "sleep_start and sleep_end must be set together".to_string(),
                ))
            }
        }

        Ok(settings)
    }

    /// `base` with the file's overrides, or `base` itself when the file does not exist.
    pub fn load(base: &Self, path: &Path) -> RelayResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => base.with_overrides(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(base.clone()),
            Err(e) => Err(RelayError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
