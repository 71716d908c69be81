use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use clubbook::engine::BookingService;
use clubbook::maintenance;
use clubbook::notify::NotifyHub;
use clubbook::repository::WalRepository;
use clubbook::settings::Settings;
use clubbook::shell::Shell;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log))
        .with_writer(std::io::stderr)
        .init();

    clubbook::observability::init(settings.metrics_port)?;

    std::fs::create_dir_all(&settings.data_dir)?;

    let repo = Arc::new(WalRepository::open(&settings.wal_path())?);
    let service = BookingService::open(repo.clone(), Arc::new(NotifyHub::new())).await?;
    let shell = Shell::new(Arc::new(service), settings.suggestion_days);

    info!("clubbook ready");
    info!("  data_dir: {}", settings.data_dir.display());
    info!(
        "  metrics: {}",
        settings
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor = tokio::spawn(maintenance::run_compactor(
        repo.clone(),
        settings.compact_threshold,
        settings.compact_interval(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                if let Some(reply) = shell.run_line(&line).await {
                    stdout.write_all(format!("{reply}\n").as_bytes()).await?;
                    stdout.flush().await?;
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    compactor.abort();
    if let Err(e) = repo.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("clubbook stopped");
    Ok(())
}
