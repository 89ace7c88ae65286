use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ots_attestor::anchoring::{AttestationService, CalendarAttestor};
use ots_attestor::chain::{ChainTipOracle, EsploraOracle};
use ots_attestor::config::{
    Config, DEFAULT_CALENDAR_URL, DEFAULT_DATA_DIR, DEFAULT_ESPLORA_URL, DEFAULT_RELAYS,
    DEFAULT_TOPIC,
};
use ots_attestor::relay::{EventSource, Publisher, RelayPool, RelayPublisher};
use ots_attestor::{Ingestor, Keys, MatureConfig, Maturer, RecordStore};

#[derive(Parser, Debug)]
#[command(name = "ots-attestor", about = "Timestamps pub/sub messages on Bitcoin")]
struct Args {
    /// Hex-encoded secret key for signing completion events
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    /// Calendar server base URL
    #[arg(long, env = "CALENDAR", default_value = DEFAULT_CALENDAR_URL)]
    calendar: String,

    /// Esplora API base URL
    #[arg(long, env = "ESPLORA", default_value = DEFAULT_ESPLORA_URL)]
    esplora: String,

    /// Comma-separated relay endpoints
    #[arg(long, env = "RELAYS", value_delimiter = ',')]
    relays: Vec<String>,

    /// Topic tag to subscribe to
    #[arg(long, env = "TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Directory holding record artifacts
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Seconds between maturation cycles
    #[arg(long, env = "MATURE_INTERVAL_SECS", default_value_t = 3600)]
    mature_interval_secs: u64,

    /// Seconds before the first maturation cycle
    #[arg(long, env = "WARMUP_DELAY_SECS", default_value_t = 5)]
    warmup_delay_secs: u64,

    /// Seconds allowed per network attempt within a cycle
    #[arg(long, env = "ATTEMPT_TIMEOUT_SECS", default_value_t = 60)]
    attempt_timeout_secs: u64,

    /// Seconds before resubscribing after losing all relay connections
    #[arg(long, env = "RESUBSCRIBE_DELAY_SECS", default_value_t = 300)]
    resubscribe_delay_secs: u64,

    /// HTTP client timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 60)]
    http_timeout_secs: u64,

    /// Log filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Config {
        let relays = if self.relays.is_empty() {
            DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect()
        } else {
            self.relays
        };
        Config {
            secret_key: self.secret_key,
            calendar_url: self.calendar,
            esplora_url: self.esplora,
            relays,
            topic: self.topic,
            data_dir: self.data_dir,
            backlog_limit: 1,
            mature_interval: Duration::from_secs(self.mature_interval_secs),
            warmup_delay: Duration::from_secs(self.warmup_delay_secs),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            resubscribe_delay: Duration::from_secs(self.resubscribe_delay_secs),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.into_config();
    let keys = Keys::parse(&config.secret_key)?;
    info!(pubkey = %keys.public_key(), "loaded identity");

    let store = Arc::new(RecordStore::open(&config.data_dir)?);
    let attestor: Arc<dyn AttestationService> = Arc::new(CalendarAttestor::new(
        &config.calendar_url,
        config.http_timeout,
    )?);
    let oracle: Arc<dyn ChainTipOracle> =
        Arc::new(EsploraOracle::new(&config.esplora_url, config.http_timeout)?);
    let source: Arc<dyn EventSource> = Arc::new(RelayPool::new(
        config.relays.clone(),
        &config.topic,
        config.backlog_limit,
    ));
    let publisher: Arc<dyn Publisher> = Arc::new(RelayPublisher::new(keys));

    let ingestor = Ingestor::new(
        Arc::clone(&store),
        Arc::clone(&attestor),
        source,
        config.resubscribe_delay,
    );
    let maturer = Maturer::new(
        store,
        attestor,
        oracle,
        publisher,
        MatureConfig {
            interval: config.mature_interval,
            warmup: config.warmup_delay,
            attempt_timeout: config.attempt_timeout,
        },
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    let ingest_handle = {
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { ingestor.run(shutdown).await })
    };
    let mature_handle = {
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { maturer.run(shutdown).await })
    };

    info!(
        relays = config.relays.len(),
        topic = %config.topic,
        data_dir = %config.data_dir,
        "attestation lifecycle manager started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());

    let _ = ingest_handle.await;
    let _ = mature_handle.await;
    info!("stopped");
    Ok(())
}
