//! Settlement sweep scheduler
//!
//! Runs the release sweep at fixed UTC times of day:
//! - Default: 4 times per day (00:00, 06:00, 12:00, 18:00 UTC)
//! - Ad-hoc: Manual trigger for ops
//!
//! The sweep is idempotent, so a failed run is logged and the next window
//! simply picks up whatever is still due.

use crate::engine::{SettlementEngine, SweepReport};
use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Sweep schedule configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Times of day (UTC) when the sweep runs
    /// E.g., ["00:00", "06:00", "12:00", "18:00"]
    pub window_times: Vec<String>,

    /// Enable automatic sweeps
    pub auto_settle: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            window_times: vec![
                "00:00".to_string(),
                "06:00".to_string(),
                "12:00".to_string(),
                "18:00".to_string(),
            ],
            auto_settle: true,
        }
    }
}

impl ScheduleConfig {
    /// Parse window times into sorted NaiveTime values
    pub fn parse_times(&self) -> Result<Vec<NaiveTime>> {
        let mut times = self
            .window_times
            .iter()
            .map(|time_str| {
                NaiveTime::parse_from_str(time_str.trim(), "%H:%M").map_err(|e| {
                    Error::Config(format!("Invalid time format '{}': {}", time_str, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if times.is_empty() {
            return Err(Error::Config("No window times configured".to_string()));
        }

        times.sort();
        times.dedup();
        Ok(times)
    }

    /// Calculate the first window strictly after `now`
    pub fn next_window_time(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let times = self.parse_times()?;
        let current_time = now.time();

        // Next window later today
        if let Some(window_time) = times.iter().find(|t| current_time < **t) {
            return Ok(now.date_naive().and_time(*window_time).and_utc());
        }

        // No more windows today, first window tomorrow
        let tomorrow = (now + Duration::days(1)).date_naive();
        Ok(tomorrow.and_time(times[0]).and_utc())
    }
}

/// Periodic driver for [`SettlementEngine::sweep`]
#[derive(Debug)]
pub struct SweepScheduler {
    engine: Arc<SettlementEngine>,
    config: ScheduleConfig,
    shutdown: watch::Sender<bool>,
}

impl SweepScheduler {
    /// Create new scheduler
    pub fn new(engine: Arc<SettlementEngine>, config: ScheduleConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            config,
            shutdown,
        }
    }

    /// Run until [`SweepScheduler::shutdown`] is called
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!("Starting settlement sweep scheduler");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let next = self.config.next_window_time(Utc::now())?;
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!(next_window = %next.to_rfc3339(), "Waiting for next sweep window");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if self.config.auto_settle {
                        self.run_sweep("scheduled").await;
                    } else {
                        debug!("Automatic sweeps disabled, skipping window");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Settlement sweep scheduler stopped");
        Ok(())
    }

    async fn run_sweep(&self, trigger: &str) -> Option<SweepReport> {
        match self.engine.sweep().await {
            Ok(report) => {
                info!(
                    trigger,
                    released = report.released,
                    blocked = report.blocked_by_returns,
                    "Settlement sweep complete"
                );
                Some(report)
            }
            Err(e) => {
                error!(trigger, error = %e, "Settlement sweep failed");
                None
            }
        }
    }

    /// Run a sweep now, outside the schedule
    pub async fn trigger_adhoc_sweep(&self, requester: &str) -> Result<SweepReport> {
        info!(requester, "Ad-hoc settlement sweep triggered");
        self.run_sweep("ad-hoc")
            .await
            .ok_or_else(|| Error::Schedule(format!("Ad-hoc sweep by {} failed", requester)))
    }

    /// Stop the scheduler loop
    pub fn shutdown(&self) {
        // Kept even with no subscriber yet, so a later `start` exits at once
        self.shutdown.send_replace(true);
    }

    /// Get next scheduled window time
    pub fn get_next_window_time(&self) -> Result<DateTime<Utc>> {
        self.config.next_window_time(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn twice_daily() -> ScheduleConfig {
        ScheduleConfig {
            window_times: vec!["06:00".into(), "18:00".into()],
            auto_settle: true,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_schedule_config_default() {
        let config = ScheduleConfig::default();
        assert_eq!(config.window_times.len(), 4);

        let times = config.parse_times().unwrap();
        assert_eq!(times.len(), 4);
    }

    #[test]
    fn test_next_window_time() {
        let config = twice_daily();
        let next = config.next_window_time(at(10, 0)).unwrap();
        assert_eq!(next, at(18, 0));
    }

    #[test]
    fn test_next_window_is_strictly_later() {
        let config = ScheduleConfig::default();
        assert_eq!(config.next_window_time(at(6, 0)).unwrap(), at(12, 0));
    }

    #[test]
    fn test_next_window_time_wrap_to_tomorrow() {
        let config = twice_daily();
        let next = config.next_window_time(at(20, 0)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 20, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_unsorted_times_are_ordered() {
        let config = ScheduleConfig {
            window_times: vec!["18:00".into(), "03:30".into()],
            auto_settle: true,
        };
        assert_eq!(config.next_window_time(at(1, 0)).unwrap(), at(3, 30));
    }

    #[test]
    fn test_invalid_times_rejected() {
        let bad = ScheduleConfig {
            window_times: vec!["25:99".into()],
            auto_settle: true,
        };
        assert!(matches!(bad.parse_times(), Err(Error::Config(_))));

        let empty = ScheduleConfig {
            window_times: vec![],
            auto_settle: true,
        };
        assert!(empty.next_window_time(at(0, 0)).is_err());
    }
}
