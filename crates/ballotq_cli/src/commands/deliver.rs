//! Sweep and run command implementations.

use ballotq_delivery::{
    DeliveryConfig, DeliveryEngine, HttpTransport, ReqwestClient, Scheduler,
    SchedulerConfig, SweepReport,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Where and how to deliver.
pub struct Target<'a> {
    /// Queue directory.
    pub dir: &'a Path,
    /// Secret for signing records.
    pub signing_key: &'a str,
    /// Acceptor base URL.
    pub endpoint: &'a str,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
}

type HttpEngine = DeliveryEngine<HttpTransport<ReqwestClient>>;

fn engine(target: &Target<'_>) -> Result<HttpEngine, Box<dyn std::error::Error>> {
    let store = Arc::new(super::open_store(target.dir)?);
    let signer = Arc::new(super::signer(target.signing_key)?);
    let client = ReqwestClient::new(target.attempt_timeout)?;
    let transport = HttpTransport::new(target.endpoint, client);
    let config = DeliveryConfig::new().with_attempt_timeout(target.attempt_timeout);
    Ok(DeliveryEngine::new(store, transport, signer, config))
}

/// Runs the sweep command.
pub async fn sweep(target: &Target<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine(target)?;
    let report = engine.sweep().await?;
    print_report(&report);
    if let Some(error) = engine.transport().last_error() {
        println!("  Last transport error: {}", error);
    }
    println!("  Pending:   {}", engine.store().len());
    Ok(())
}

/// Runs the run command: sweeps every `period` until SIGINT or SIGTERM.
pub async fn run(target: &Target<'_>, period: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(engine(target)?);
    let scheduler = Scheduler::new(Arc::clone(&engine), SchedulerConfig::new(period));

    let recovered = engine.recover().await?;
    info!(
        endpoint = target.endpoint,
        pending = engine.store().len(),
        recovered,
        period_secs = period.as_secs(),
        "starting delivery"
    );
    scheduler.start()?;

    wait_for_signal().await?;

    scheduler.stop().await?;
    let stats = engine.stats();
    info!(
        sweeps = stats.sweeps,
        delivered = stats.delivered,
        failed_attempts = stats.failed_attempts,
        pending = engine.store().len(),
        "delivery stopped"
    );
    Ok(())
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("received SIGINT, shutting down");
            }
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("received Ctrl-C, shutting down");
    }
    Ok(())
}

fn print_report(report: &SweepReport) {
    println!("Sweep finished");
    println!("  Attempted: {}", report.claimed);
    println!("  Delivered: {}", report.delivered);
    println!("  Failed:    {}", report.failed);
    if report.recovered > 0 {
        println!("  Recovered: {}", report.recovered);
    }
    if report.deferred_backoff > 0 {
        println!("  Waiting:   {}", report.deferred_backoff);
    }
    if report.claim_failures + report.persist_failures > 0 {
        println!(
            "  Store errors: {}",
            report.claim_failures + report.persist_failures
        );
    }
}
