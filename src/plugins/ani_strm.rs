//! Strm files for the current ANi-Open season
//!
//! The media server plays the files straight from ANi's resource host; this
//! plugin only keeps one `.strm` per published file in `storage_dir`.
//! `full_add` covers the whole season on the next successful run only; later
//! runs go back to the newest files.

use super::{run_once_job, Plugin, RUN_ON_START_DELAY};
use crate::clients::AniOpenApi;
use crate::config::defaults::DEFAULT_ANI_RECENT_LIMIT;
use crate::config::AniStrmConfig;
use crate::scheduler::{ScheduledJob, Trigger};
use crate::utils::strm::write_strm;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const PLUGIN_ID: &str = "ani_strm";

/// ANi season folder (`YYYY-M`) holding `date`: the year plus the first
/// month of its quarter
pub fn ani_season(date: NaiveDate) -> String {
    let first_month = (date.month() - 1) / 3 * 3 + 1;
    format!("{}-{}", date.year(), first_month)
}

pub struct AniStrmPlugin {
    config: AniStrmConfig,
    ani: Arc<dyn AniOpenApi>,
    timezone: Tz,
    full_add: AtomicBool,
}

impl AniStrmPlugin {
    pub fn new(config: AniStrmConfig, ani: Arc<dyn AniOpenApi>, timezone: Tz) -> Self {
        Self {
            full_add: AtomicBool::new(config.full_add),
            config,
            ani,
            timezone,
        }
    }

    /// Whether the next run still covers the whole season
    pub fn full_add_pending(&self) -> bool {
        self.full_add.load(Ordering::SeqCst)
    }

    pub fn current_season(&self) -> String {
        ani_season(Utc::now().with_timezone(&self.timezone).date_naive())
    }

    /// Write missing strm files for `season`; returns how many were created
    pub async fn sync_season(&self, season: &str) -> Result<usize> {
        let mut files = self.ani.list_files(season).await?;
        info!("ANi season {} lists {} files", season, files.len());
        let full = self.full_add_pending();
        if !full {
            files.truncate(DEFAULT_ANI_RECENT_LIMIT);
        }

        let mut created = 0;
        for name in files {
            let path = self.config.storage_dir.join(format!("{name}.strm"));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("{} exists", path.display());
                continue;
            }
            let url = self.ani.resource_url(season, &name);
            write_strm(&path, &url)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created {}", path.display());
            created += 1;
        }

        if full {
            self.full_add.store(false, Ordering::SeqCst);
            info!("Full season add done, later runs take the newest files only");
        }
        Ok(created)
    }
}

#[async_trait]
impl Plugin for AniStrmPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn name(&self) -> &'static str {
        "ANi strm"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn scheduled_jobs(self: Arc<Self>) -> Vec<ScheduledJob> {
        let mut jobs = vec![run_once_job(
            &self,
            "ani_strm season",
            Trigger::Cron(self.config.cron.clone()),
        )];
        if self.config.run_on_start {
            jobs.push(run_once_job(
                &self,
                "ani_strm on start",
                Trigger::Once(RUN_ON_START_DELAY),
            ));
        }
        jobs
    }

    async fn run_once(&self) -> Result<()> {
        let season = self.current_season();
        let created = self.sync_season(&season).await?;
        info!("ANi season {}: {} new strm files", season, created);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_season_is_quarter_start() {
        assert_eq!(ani_season(date(2024, 1, 1)), "2024-1");
        assert_eq!(ani_season(date(2024, 3, 31)), "2024-1");
        assert_eq!(ani_season(date(2024, 4, 29)), "2024-4");
        assert_eq!(ani_season(date(2024, 9, 30)), "2024-7");
        assert_eq!(ani_season(date(2024, 10, 1)), "2024-10");
        assert_eq!(ani_season(date(2024, 12, 31)), "2024-10");
    }
}
