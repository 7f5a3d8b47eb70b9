//! Optional `--config <file.toml>` calendar / project-start overrides
//! (SPEC_FULL §12). CLI flags always take precedence over file values;
//! this module only ever produces values a flag can then shadow.

use chrono::{NaiveDate, Weekday};
use critpath_core::{Calendar, CalendarException, CoreError};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub project_start: Option<NaiveDate>,
    pub working_days: Option<Vec<String>>,
    #[serde(default)]
    pub exceptions: BTreeMap<NaiveDate, FileException>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileException {
    pub working: bool,
    pub name: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config `{}`: {e}", path.display()))?;
        toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config `{}`: {e}", path.display()))
    }

    /// Builds the calendar described by `workingDays`/`exceptions`, if the
    /// config names any working days at all. `None` means "the config has
    /// no calendar opinion" — the caller should fall back to whatever the
    /// project file itself carries.
    pub fn calendar(&self) -> Result<Option<Calendar>, CoreError> {
        let Some(names) = &self.working_days else {
            return Ok(None);
        };
        let mut working_days = BTreeSet::new();
        for name in names {
            let weekday = Weekday::from_str(name).map_err(|_| {
                CoreError::Config(format!("unrecognized weekday `{name}` in config"))
            })?;
            working_days.insert(weekday);
        }
        let exceptions = self
            .exceptions
            .iter()
            .map(|(date, ex)| {
                (
                    *date,
                    CalendarException {
                        working: ex.working,
                        name: ex.name.clone(),
                    },
                )
            })
            .collect();
        Calendar::new(working_days, exceptions).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_has_no_calendar_opinion() {
        let config = FileConfig::default();
        assert!(config.calendar().unwrap().is_none());
    }

    #[test]
    fn parses_working_days_and_exceptions() {
        let toml = r#"
            projectStart = "2024-01-01"
            workingDays = ["Mon", "Tue", "Wed", "Thu", "Fri"]

            [exceptions."2024-01-15"]
            working = false
            name = "Holiday"
        "#;
        let config: FileConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.project_start,
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        let calendar = config.calendar().unwrap().unwrap();
        assert!(!calendar.is_working_day(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    }
}
