//! Cron-style job scheduler using tokio-cron-scheduler.

use std::sync::Arc;
use std::time::Duration;

use ratekeeper_core::ports::EventLog;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Enable scheduler.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SCHEDULER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}

/// Cron job scheduler wrapper.
pub struct Scheduler {
    inner: JobScheduler,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a new scheduler.
    pub async fn new(config: SchedulerConfig) -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner, config })
    }

    /// Add a cron job.
    pub async fn add_cron<F, Fut>(
        &self,
        schedule: &str,
        task: F,
    ) -> Result<uuid::Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                task().await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Cron job registered");
        Ok(id)
    }

    /// Register the job trimming rate limit events older than `retention`.
    pub async fn add_event_trim(
        &self,
        schedule: &str,
        events: Arc<dyn EventLog>,
        retention: Duration,
    ) -> Result<uuid::Uuid, JobSchedulerError> {
        self.add_cron(schedule, move || {
            let events = events.clone();
            async move {
                match events.clear_old_events(retention).await {
                    Ok(removed) => {
                        tracing::info!(removed, "Trimmed rate limit event log");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to trim rate limit event log");
                    }
                }
            }
        })
        .await
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return Ok(());
        }

        self.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// Stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratekeeper_infra::InMemoryEventLog;

    #[tokio::test]
    async fn test_event_trim_job_registers() {
        let scheduler = Scheduler::new(SchedulerConfig { enabled: false }).await.unwrap();
        let events: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::default());

        let id = scheduler
            .add_event_trim("0 0 * * * *", events, Duration::from_secs(3600))
            .await;
        assert!(id.is_ok());
        // Disabled scheduler never starts
        assert!(scheduler.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).await.unwrap();
        let events: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::default());

        let result = scheduler
            .add_event_trim("every hour", events, Duration::from_secs(3600))
            .await;
        assert!(result.is_err());
    }
}
