//! Job scheduler for plugin jobs
//!
//! Jobs fire on a cron expression (evaluated in the configured timezone), on
//! a fixed interval, or once after a delay. Registering a job under a name
//! that is already taken replaces the earlier job, which is how one-shot
//! jobs are debounced. A job never overlaps with itself; a firing that comes
//! due while the previous run is still going is skipped.

use crate::utils::cron_helper::{next_after, parse_schedule};
use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, trace, warn};

pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Cron(String),
    Interval(Duration),
    /// Fire once, this long after registration
    Once(Duration),
}

#[derive(Clone)]
pub struct ScheduledJob {
    pub name: String,
    pub trigger: Trigger,
    run: JobFn,
}

impl ScheduledJob {
    pub fn new<F, Fut>(name: impl Into<String>, trigger: Trigger, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            trigger,
            run: Arc::new(move || Box::pin(job())),
        }
    }
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .finish()
    }
}

enum Command {
    Add(ScheduledJob),
}

/// Cloneable handle for registering jobs with a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Returns false when the scheduler has shut down
    pub fn schedule(&self, job: ScheduledJob) -> bool {
        self.tx.send(Command::Add(job)).is_ok()
    }

    /// Run `job` once after `delay`, replacing a pending job of the same name
    pub fn schedule_once<F, Fut>(&self, name: &str, delay: Duration, job: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.schedule(ScheduledJob::new(name, Trigger::Once(delay), job))
    }
}

struct Entry {
    job: ScheduledJob,
    schedule: Option<Schedule>,
    next_run: DateTime<Utc>,
}

pub struct SchedulerService {
    entries: HashMap<String, Entry>,
    timezone: Tz,
    rx: mpsc::UnboundedReceiver<Command>,
    running: Arc<Mutex<HashSet<String>>>,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

impl SchedulerService {
    pub fn new(timezone: Tz) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                entries: HashMap::new(),
                timezone,
                rx,
                running: Arc::new(Mutex::new(HashSet::new())),
            },
            SchedulerHandle { tx },
        )
    }

    /// Register `job` relative to `now`. An invalid cron expression is logged
    /// and the job is not registered.
    pub fn add_job_at(&mut self, job: ScheduledJob, now: DateTime<Utc>) -> bool {
        let (schedule, next_run) = match &job.trigger {
            Trigger::Cron(expression) => {
                let schedule = match parse_schedule(expression) {
                    Ok(schedule) => schedule,
                    Err(e) => {
                        warn!("Job '{}' not registered: {}", job.name, e);
                        return false;
                    }
                };
                let Some(next_run) = next_after(&schedule, now, &self.timezone) else {
                    warn!("Job '{}' not registered: cron never fires again", job.name);
                    return false;
                };
                (Some(schedule), next_run)
            }
            Trigger::Interval(every) if every.is_zero() => {
                warn!("Job '{}' not registered: zero interval", job.name);
                return false;
            }
            Trigger::Interval(every) => (None, now + to_chrono(*every)),
            Trigger::Once(delay) => (None, now + to_chrono(*delay)),
        };

        if self.entries.contains_key(&job.name) {
            debug!("Replacing job '{}'", job.name);
        }
        debug!("Job '{}' next run at {}", job.name, next_run);
        self.entries.insert(
            job.name.clone(),
            Entry {
                job,
                schedule,
                next_run,
            },
        );
        true
    }

    pub fn add_job(&mut self, job: ScheduledJob) -> bool {
        self.add_job_at(job, Utc::now())
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.get(name).map(|e| e.next_run)
    }

    /// Spawn every job due at `now` and reschedule it
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.next_run <= now)
            .map(|(name, _)| name.clone())
            .collect();

        let mut handles = Vec::new();
        for name in due {
            let Some(entry) = self.entries.get_mut(&name) else {
                continue;
            };

            if let Some(handle) = Self::spawn(&self.running, &entry.job) {
                handles.push(handle);
            }

            let next = match (&entry.job.trigger, &entry.schedule) {
                (Trigger::Cron(_), Some(schedule)) => next_after(schedule, now, &self.timezone),
                (Trigger::Interval(every), _) => Some(now + to_chrono(*every)),
                _ => None,
            };
            match next {
                Some(next_run) => {
                    trace!("Job '{}' rescheduled for {}", name, next_run);
                    entry.next_run = next_run;
                }
                None => {
                    self.entries.remove(&name);
                }
            }
        }
        handles
    }

    fn spawn(
        running: &Arc<Mutex<HashSet<String>>>,
        job: &ScheduledJob,
    ) -> Option<JoinHandle<()>> {
        {
            let mut running = running.lock().unwrap_or_else(|e| e.into_inner());
            if !running.insert(job.name.clone()) {
                debug!("Job '{}' still running, skipping this firing", job.name);
                return None;
            }
        }

        let name = job.name.clone();
        let run = job.run.clone();
        let running = running.clone();
        Some(tokio::spawn(async move {
            info!("Running job '{}'", name);
            let started = std::time::Instant::now();
            match run().await {
                Ok(()) => debug!("Job '{}' finished in {:?}", name, started.elapsed()),
                Err(e) => error!("Job '{}' failed: {:#}", name, e),
            }
            running
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&name);
        }))
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Add(job) => {
                self.add_job(job);
            }
        }
    }

    /// Apply every command queued on the handle; returns how many there were
    pub fn drain_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.rx.try_recv() {
            self.apply(command);
            applied += 1;
        }
        applied
    }

    pub async fn start(mut self) -> Result<()> {
        info!(
            "Starting scheduler with {} jobs ({})",
            self.entries.len(),
            self.timezone
        );
        for name in self.job_names() {
            if let Some(next) = self.next_run(&name) {
                info!("Job '{}' next run: {}", name, next.with_timezone(&self.timezone));
            }
        }

        let mut ticker = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain_commands();
                    self.tick(Utc::now());
                }
                Some(command) = self.rx.recv() => {
                    self.apply(command);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_job(name: &str, trigger: Trigger, counter: Arc<AtomicU32>) -> ScheduledJob {
        ScheduledJob::new(name, trigger, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 29, h, m, s).unwrap()
    }

    async fn join(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_invalid_cron_is_not_registered() {
        let (mut scheduler, _handle) = SchedulerService::new(chrono_tz::UTC);
        let counter = Arc::new(AtomicU32::new(0));
        assert!(!scheduler.add_job(counting_job("bad", Trigger::Cron("nope".into()), counter)));
        assert!(scheduler.job_names().is_empty());
    }

    #[tokio::test]
    async fn test_once_job_fires_once_and_is_removed() {
        let (mut scheduler, _handle) = SchedulerService::new(chrono_tz::UTC);
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.add_job_at(
            counting_job("upload", Trigger::Once(Duration::from_secs(5)), counter.clone()),
            at(0, 0, 0),
        );

        assert!(scheduler.tick(at(0, 0, 4)).is_empty());
        join(scheduler.tick(at(0, 0, 5))).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(scheduler.job_names().is_empty());
        assert!(scheduler.tick(at(0, 1, 0)).is_empty());
    }

    #[tokio::test]
    async fn test_same_name_replaces_pending_job() {
        let (mut scheduler, _handle) = SchedulerService::new(chrono_tz::UTC);
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        scheduler.add_job_at(
            counting_job("upload", Trigger::Once(Duration::from_secs(5)), first.clone()),
            at(0, 0, 0),
        );
        scheduler.add_job_at(
            counting_job("upload", Trigger::Once(Duration::from_secs(5)), second.clone()),
            at(0, 0, 3),
        );

        assert!(scheduler.tick(at(0, 0, 5)).is_empty());
        join(scheduler.tick(at(0, 0, 8))).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interval_job_reschedules() {
        let (mut scheduler, _handle) = SchedulerService::new(chrono_tz::UTC);
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.add_job_at(
            counting_job("strm", Trigger::Interval(Duration::from_secs(1200)), counter.clone()),
            at(0, 0, 0),
        );

        join(scheduler.tick(at(0, 20, 0))).await;
        assert_eq!(scheduler.next_run("strm"), Some(at(0, 40, 0)));
        join(scheduler.tick(at(0, 40, 0))).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cron_job_uses_timezone() {
        let (mut scheduler, _handle) = SchedulerService::new(chrono_tz::Asia::Shanghai);
        let counter = Arc::new(AtomicU32::new(0));
        assert!(scheduler.add_job_at(
            counting_job("logs", Trigger::Cron("30 3 * * *".into()), counter),
            at(0, 0, 0),
        ));
        // 03:30 Asia/Shanghai == 19:30 UTC
        assert_eq!(scheduler.next_run("logs"), Some(at(19, 30, 0)));
    }

    #[tokio::test]
    async fn test_running_job_is_not_started_twice() {
        let (mut scheduler, _handle) = SchedulerService::new(chrono_tz::UTC);
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        scheduler.add_job_at(
            ScheduledJob::new("slow", Trigger::Interval(Duration::from_secs(1)), move || {
                let calls = calls.clone();
                let mut release = release_rx.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    while !*release.borrow() {
                        if release.changed().await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
            }),
            at(0, 0, 0),
        );

        let first = scheduler.tick(at(0, 0, 1));
        assert_eq!(first.len(), 1);
        assert!(scheduler.tick(at(0, 0, 2)).is_empty());

        release_tx.send(true).unwrap();
        join(first).await;
        join(scheduler.tick(at(0, 0, 3))).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handle_commands_are_applied() {
        let (mut scheduler, handle) = SchedulerService::new(chrono_tz::UTC);
        let counter = Arc::new(AtomicU32::new(0));
        let job_counter = counter.clone();

        assert!(handle.schedule_once("upload", Duration::from_secs(5), move || {
            let counter = job_counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
        assert!(handle.schedule_once("upload", Duration::from_secs(9), || async { Ok(()) }));

        assert_eq!(scheduler.drain_commands(), 2);
        assert_eq!(scheduler.job_names(), vec!["upload".to_string()]);
    }
}
