use anyhow::Result;
use netthrottle::command::{CommandRunner, SystemRunner};
use netthrottle::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Saved interface if it still exists, else the first selectable one.
fn initial_interface(
    saved: Option<String>,
    available: &[models::Interface],
) -> Option<String> {
    saved
        .filter(|name| available.iter().any(|i| &i.name == name))
        .or_else(|| available.first().map(|i| i.name.clone()))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let capabilities = platform::Capabilities::detect(&app_config.shaping);

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(
        app_config.shaping.binaries(),
        app_config.shaping.use_sudo,
    ));
    let orchestrator = Arc::new(orchestrator::Orchestrator::new(
        runner.clone(),
        capabilities,
        app_config.shaping.redirect_device.clone(),
    ));
    let inspector = Arc::new(status::StatusInspector::new(runner, capabilities));
    let sysinfo_repo = Arc::new(sysinfo_repo::SysinfoRepo::new());

    let settings_store = Arc::new(settings::SettingsStore::new(&app_config.settings.path));
    let saved = settings_store.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable settings");
        settings::Settings::default()
    });
    let interfaces = sysinfo_repo.get_interfaces().await?;
    let selected = initial_interface(saved.interface, &interfaces);
    tracing::info!(
        interface = ?selected,
        available = interfaces.len(),
        supports_shaping = capabilities.supports_shaping,
        "starting"
    );

    let (throughput_tx, _) =
        broadcast::channel::<models::ThroughputEvent>(app_config.sampler.broadcast_capacity);
    let (selected_tx, selected_rx) = watch::channel(selected);
    let ws_throughput_connections = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let sampler_handle = sampler::spawn(
        sampler::SamplerDeps {
            source: sysinfo_repo.clone(),
            selected_rx,
            tx: throughput_tx.clone(),
            ws_throughput_connections: ws_throughput_connections.clone(),
            shutdown_rx,
        },
        sampler::SamplerConfig {
            sample_interval_ms: app_config.sampler.sample_interval_ms,
            publish_every: app_config.sampler.publish_every,
            stats_log_interval_secs: app_config.sampler.stats_log_interval_secs,
        },
    );

    let app = routes::app(routes::AppState {
        orchestrator,
        inspector,
        sysinfo_repo,
        throughput_tx,
        selected_tx: Arc::new(selected_tx),
        settings: settings_store,
        ws_throughput_connections,
    });
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = sampler_handle.await;
        }
    }

    Ok(())
}
