//! Twice-daily report scheduler.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Timelike};
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::{RemedyError, Result};
use crate::report::{ReportGenerator, ReportPeriod};

/// `sec min hour day month dow`: 08:00 and 20:00 every day.
pub const REPORT_SCHEDULE: &str = "0 0 8,20 * * *";

/// Which report a firing at `hour` produces.
pub fn period_for_hour(hour: u32) -> Option<ReportPeriod> {
    match hour {
        8 => Some(ReportPeriod::Morning),
        20 => Some(ReportPeriod::Evening),
        _ => None,
    }
}

pub struct ReportScheduler {
    generator: ReportGenerator,
    schedule: Schedule,
}

impl ReportScheduler {
    pub fn new(generator: ReportGenerator) -> Result<Self> {
        let schedule = Schedule::from_str(REPORT_SCHEDULE)
            .map_err(|e| RemedyError::Config(format!("invalid report schedule: {e}")))?;
        Ok(Self {
            generator,
            schedule,
        })
    }

    /// Next firing strictly after `after`, with the period it reports on.
    pub fn next_firing<Tz: TimeZone>(
        &self,
        after: &DateTime<Tz>,
    ) -> Option<(DateTime<Tz>, ReportPeriod)> {
        self.schedule
            .after(after)
            .find_map(|at| period_for_hour(at.hour()).map(|period| (at, period)))
    }

    /// Fire reports on schedule until `shutdown` flips to `true` or its
    /// sender is dropped. Each firing runs in its own task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(schedule = REPORT_SCHEDULE, "report scheduler started");
        loop {
            let now = Local::now();
            let Some((at, period)) = self.next_firing(&now) else {
                warn!("report schedule has no upcoming firings");
                return Ok(());
            };
            let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
            info!(period = period.as_str(), at = %at.to_rfc3339(), "next report scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let generator = self.generator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = generator.send_report_at(period, &at).await {
                            error!(period = period.as_str(), error = %e, "scheduled report failed");
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("report scheduler stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(shutdown))
    }
}
