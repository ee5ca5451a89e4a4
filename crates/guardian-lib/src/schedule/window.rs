//! Maintenance window evaluation

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::CronSchedule;
use crate::error::GuardianError;
use crate::models::chrono_duration;
use crate::policy::MaintenanceWindow;

/// An occurrence of a maintenance window containing "now"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWindow {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub suppress_alerts: bool,
}

#[derive(Debug, Clone)]
struct CompiledWindow {
    name: String,
    schedule: CronSchedule,
    duration: chrono::Duration,
    suppress_alerts: bool,
}

impl CompiledWindow {
    /// Occurrence covering `now`, i.e. the latest start in `(now - duration, now]`
    fn occurrence(&self, now: DateTime<Utc>) -> Option<ActiveWindow> {
        if self.duration <= chrono::Duration::zero() {
            return None;
        }
        let started_at = self.schedule.latest_between(now - self.duration, now)?;
        Some(ActiveWindow {
            name: self.name.clone(),
            started_at,
            ends_at: started_at + self.duration,
            suppress_alerts: self.suppress_alerts,
        })
    }
}

/// Decides whether a point in time falls inside any of a monitor's windows
#[derive(Debug, Clone, Default)]
pub struct MaintenanceWindowGuard {
    windows: Vec<CompiledWindow>,
}

impl MaintenanceWindowGuard {
    /// Compile window definitions; windows with bad schedules are skipped and reported
    pub fn compile(windows: &[MaintenanceWindow]) -> (Self, Vec<GuardianError>) {
        let mut compiled = Vec::with_capacity(windows.len());
        let mut errors = Vec::new();

        for (idx, window) in windows.iter().enumerate() {
            match CronSchedule::parse(&window.schedule, window.timezone.as_deref()) {
                Ok(schedule) => compiled.push(CompiledWindow {
                    name: window
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("window-{}", idx)),
                    schedule,
                    duration: chrono_duration(window.duration),
                    suppress_alerts: window.suppress_alerts,
                }),
                Err(e) => errors.push(e),
            }
        }

        (Self { windows: compiled }, errors)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Every window occurrence containing `now`
    pub fn active_windows(&self, now: DateTime<Utc>) -> Vec<ActiveWindow> {
        self.windows.iter().filter_map(|w| w.occurrence(now)).collect()
    }

    /// The suppressing window containing `now` that ends last, if any
    pub fn suppressing_window(&self, now: DateTime<Utc>) -> Option<ActiveWindow> {
        self.active_windows(now)
            .into_iter()
            .filter(|w| w.suppress_alerts)
            .max_by_key(|w| w.ends_at)
    }

    pub fn suppresses(&self, now: DateTime<Utc>) -> bool {
        self.suppressing_window(now).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn window(schedule: &str, hours: u64, suppress: bool) -> MaintenanceWindow {
        MaintenanceWindow {
            name: Some("patching".to_string()),
            schedule: schedule.to_string(),
            duration: Duration::from_secs(hours * 3600),
            timezone: None,
            suppress_alerts: suppress,
        }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_inside_and_outside_window() {
        // Every day 02:00 for 2 hours
        let (guard, errors) = MaintenanceWindowGuard::compile(&[window("0 2 * * *", 2, true)]);
        assert!(errors.is_empty());

        assert!(!guard.suppresses(at(10, 1, 59)));
        assert!(guard.suppresses(at(10, 2, 0)));
        assert!(guard.suppresses(at(10, 3, 59)));
        // End is exclusive
        assert!(!guard.suppresses(at(10, 4, 0)));

        let active = guard.suppressing_window(at(10, 3, 0)).unwrap();
        assert_eq!(active.started_at, at(10, 2, 0));
        assert_eq!(active.ends_at, at(10, 4, 0));
        assert_eq!(active.name, "patching");
    }

    #[test]
    fn test_non_suppressing_window_is_reported_but_does_not_suppress() {
        let (guard, _) = MaintenanceWindowGuard::compile(&[window("0 2 * * *", 2, false)]);
        assert_eq!(guard.active_windows(at(10, 3, 0)).len(), 1);
        assert!(!guard.suppresses(at(10, 3, 0)));
    }

    #[test]
    fn test_window_in_timezone() {
        let mut w = window("0 2 * * *", 1, true);
        w.timezone = Some("America/New_York".to_string());
        let (guard, _) = MaintenanceWindowGuard::compile(&[w]);
        // 02:00 EST is 07:00 UTC
        assert!(guard.suppresses(at(10, 7, 30)));
        assert!(!guard.suppresses(at(10, 2, 30)));
    }

    #[test]
    fn test_invalid_window_is_skipped() {
        let (guard, errors) = MaintenanceWindowGuard::compile(&[
            window("bogus", 1, true),
            window("0 2 * * *", 1, true),
        ]);
        assert_eq!(errors.len(), 1);
        assert!(!guard.is_empty());
        assert!(guard.suppresses(at(10, 2, 30)));
    }
}
