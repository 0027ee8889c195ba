use clap::Parser;
use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pulsewatch::config::AppConfig;
use pulsewatch::monitor::{
    AccessGuard, AddTarget, AdminSet, MonitorService, NativeRoleCheck, OperatorId, TargetRegistry,
};
use pulsewatch::notifications::senders::{LogSender, NotificationSender, WebhookSender};
use pulsewatch::notifications::{EventBroadcaster, NotificationDispatcher, Notifier};
use pulsewatch::probes::ProbeRouter;
use pulsewatch::version::VERSION;

const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "pulsewatch.toml")]
    config: String,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "pulsewatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

fn build_senders(config: &AppConfig) -> Vec<Arc<dyn NotificationSender>> {
    let mut senders: Vec<Arc<dyn NotificationSender>> = vec![Arc::new(LogSender::new())];
    for webhook in &config.notifications.webhooks {
        match WebhookSender::new(webhook) {
            Ok(sender) => senders.push(Arc::new(sender)),
            Err(e) => warn!(url = %webhook.url, error = %e, "Skipping misconfigured webhook."),
        }
    }
    senders
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();

    let config = AppConfig::load(Some(&args.config))?;
    init_logging(&config.log_dir);
    info!(version = VERSION, "Starting pulsewatch...");
    match &config.source {
        Some(path) => info!(path = %path.display(), "Loaded config file."),
        None => info!(path = %args.config, "Config file not found, using defaults."),
    }

    let registry_config = config.registry_config();
    let probe = Arc::new(ProbeRouter::with_defaults(registry_config.probe_timeout)?);
    info!(schemes = ?probe.schemes(), "Probes ready.");

    let broadcaster = Arc::new(EventBroadcaster::new(config.notifications.event_buffer));
    let dispatcher = NotificationDispatcher::new(
        build_senders(&config),
        config.notifications.only_status_changes,
    )
    .spawn(broadcaster.subscribe());

    let native_admins: HashSet<OperatorId> = config
        .access
        .native_admins
        .iter()
        .map(|id| OperatorId::new(id.as_str()))
        .collect();
    let native_role: Arc<dyn NativeRoleCheck> =
        Arc::new(move |caller: &OperatorId| native_admins.contains(caller));
    let guard = AccessGuard::new(
        AdminSet::with_members(config.access.admins.iter().map(|id| OperatorId::new(id.as_str()))),
        native_role,
    );

    let notifier: Arc<dyn Notifier> = broadcaster.clone();
    let registry = TargetRegistry::new(registry_config, probe, notifier);
    let service = MonitorService::new(registry, guard, config.monitor.scope);

    // Seed targets come from the operator's own config file and bypass the guard.
    for seed in &config.targets {
        let request = AddTarget::from_secs(
            seed.address.as_str(),
            seed.interval_secs,
            seed.owner.as_str(),
        );
        let result = match request {
            Ok(request) => service.registry().add(request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(address = %seed.address, error = %e, "Failed to register configured target.");
        }
    }
    info!(targets = service.registry().len(), "Monitoring running. Press Ctrl-C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received, stopping all monitor tasks.");
    service.shutdown().await;

    // Dropping the last broadcaster handle closes the channel and lets the
    // dispatcher drain.
    drop(service);
    drop(broadcaster);
    if tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher)
        .await
        .is_err()
    {
        warn!("Notification dispatcher did not drain in time.");
    }
    info!("pulsewatch stopped.");
    Ok(())
}
