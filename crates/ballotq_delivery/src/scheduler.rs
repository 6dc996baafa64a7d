//! Periodic sweep driver.

use crate::config::SchedulerConfig;
use crate::engine::DeliveryEngine;
use crate::error::{DeliveryError, DeliveryResult};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

struct Running {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Decides when the delivery engine sweeps.
///
/// Once started, the scheduler sweeps immediately, then every `period`,
/// and out of band whenever connectivity comes back or
/// [`trigger`](Self::trigger) is called. Sweeps never overlap: the loop
/// waits for one to finish before it looks at the clock again, and a
/// period that elapsed meanwhile yields a single catch-up sweep.
///
/// Going offline does not pause the loop; sweeps keep running and leave
/// every record untouched until the scheduler is set online again.
pub struct Scheduler<T: Transport + 'static> {
    engine: Arc<DeliveryEngine<T>>,
    config: SchedulerConfig,
    wake: Arc<Notify>,
    running: Mutex<Option<Running>>,
}

impl<T: Transport + 'static> Scheduler<T> {
    /// Creates a stopped scheduler and applies the initial connectivity.
    pub fn new(engine: Arc<DeliveryEngine<T>>, config: SchedulerConfig) -> Self {
        engine.set_online(config.start_online);
        Self {
            engine,
            config,
            wake: Arc::new(Notify::new()),
            running: Mutex::new(None),
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<DeliveryEngine<T>> {
        &self.engine
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns true between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Returns true if sweeps may call the transport.
    pub fn is_online(&self) -> bool {
        self.engine.is_online()
    }

    /// Sets connectivity. Going from offline to online triggers a sweep.
    pub fn set_online(&self, online: bool) {
        let was_online = self.engine.set_online(online);
        if online && !was_online {
            debug!("connectivity restored, waking scheduler");
            self.wake.notify_one();
        }
    }

    /// Requests a sweep as soon as the current one, if any, finishes.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Spawns the scheduling loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::AlreadyRunning`] if already started, or
    /// [`DeliveryError::InvalidConfig`] if the period is zero.
    pub fn start(&self) -> DeliveryResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(DeliveryError::AlreadyRunning);
        }
        if self.config.period.is_zero() {
            return Err(DeliveryError::InvalidConfig {
                message: "scheduler period must be non-zero".into(),
            });
        }

        self.engine.reset_cancel();
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.wake),
            self.config.clone(),
            shutdown_rx,
        ));
        *running = Some(Running { shutdown, task });
        info!(
            period_ms = u64::try_from(self.config.period.as_millis()).unwrap_or(u64::MAX),
            "scheduler started"
        );
        Ok(())
    }

    /// Stops the loop and waits for it to exit.
    ///
    /// A sweep in progress stops claiming records; attempts already in
    /// flight finish or time out and their outcomes are persisted first.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotRunning`] if the scheduler was not started.
    pub async fn stop(&self) -> DeliveryResult<()> {
        let running = self
            .running
            .lock()
            .take()
            .ok_or(DeliveryError::NotRunning)?;

        self.engine.cancel();
        let _ = running.shutdown.send(());
        if let Err(e) = running.task.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
        info!("scheduler stopped");
        Ok(())
    }
}

impl<T: Transport + 'static> Drop for Scheduler<T> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            self.engine.cancel();
            let _ = running.shutdown.send(());
        }
    }
}

async fn run_loop<T: Transport + 'static>(
    engine: Arc<DeliveryEngine<T>>,
    wake: Arc<Notify>,
    config: SchedulerConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = wake.notified() => debug!("out-of-band sweep"),
            _ = ticker.tick() => {}
        }

        match engine.sweep().await {
            Ok(report) => debug!(
                claimed = report.claimed,
                delivered = report.delivered,
                online = engine.is_online(),
                "scheduled sweep done"
            ),
            Err(DeliveryError::SweepInProgress) => debug!("sweep already running, skipping tick"),
            Err(e) => warn!(error = %e, "scheduled sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::transport::MockTransport;
    use ballotq_core::{HmacSigner, RecordStore};
    use std::time::Duration;

    fn engine() -> Arc<DeliveryEngine<MockTransport>> {
        Arc::new(DeliveryEngine::new(
            Arc::new(RecordStore::in_memory()),
            MockTransport::new(),
            Arc::new(HmacSigner::new(b"scheduler-tests").unwrap()),
            DeliveryConfig::default(),
        ))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_start_and_every_period() {
        let engine = engine();
        let scheduler = Scheduler::new(Arc::clone(&engine), SchedulerConfig::new(Duration::from_secs(60)));
        engine.cast().unwrap();

        scheduler.start().unwrap();
        settle().await;
        assert!(engine.store().is_empty());
        assert_eq!(engine.stats().sweeps, 1);

        engine.cast().unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(engine.store().is_empty());
        assert_eq!(engine.stats().sweeps, 2);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_sweeps_immediately() {
        let engine = engine();
        let config = SchedulerConfig::new(Duration::from_secs(3600)).with_start_online(false);
        let scheduler = Scheduler::new(Arc::clone(&engine), config);
        assert!(!scheduler.is_online());
        engine.cast().unwrap();

        scheduler.start().unwrap();
        settle().await;
        assert_eq!(engine.transport().attempts(), 0);
        assert_eq!(engine.store().len(), 1);

        scheduler.set_online(true);
        settle().await;
        assert_eq!(engine.transport().attempts(), 1);
        assert!(engine.store().is_empty());

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_runs_out_of_band() {
        let engine = engine();
        let scheduler = Scheduler::new(Arc::clone(&engine), SchedulerConfig::new(Duration::from_secs(3600)));
        scheduler.start().unwrap();
        settle().await;

        engine.cast().unwrap();
        scheduler.trigger();
        settle().await;
        assert!(engine.store().is_empty());

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_errors() {
        let scheduler = Scheduler::new(engine(), SchedulerConfig::default());
        assert!(matches!(
            scheduler.stop().await,
            Err(DeliveryError::NotRunning)
        ));

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start(), Err(DeliveryError::AlreadyRunning)));

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());

        // Restartable after a stop.
        scheduler.start().unwrap();
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_rejected() {
        let engine = engine();
        let scheduler = Scheduler::new(Arc::clone(&engine), SchedulerConfig::new(Duration::ZERO));
        engine.cast().unwrap();

        assert!(matches!(
            scheduler.start(),
            Err(DeliveryError::InvalidConfig { .. })
        ));
        assert!(!scheduler.is_running());
        settle().await;
        assert_eq!(engine.stats().sweeps, 0);
        assert_eq!(engine.store().len(), 1);
        assert!(matches!(
            scheduler.stop().await,
            Err(DeliveryError::NotRunning)
        ));
    }
}
