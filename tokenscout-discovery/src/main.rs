//! TOKENSCOUT Discovery CLI
//!
//! Entry point for the discovery binary. Provides subcommands for:
//! - `run` - Start live ingestion and discovery
//! - `backfill` - Replay a historical window through the same pipeline
//! - `version` - Show version information

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tokenscout_discovery::config::{LoggingSettings, MetricsSettings, Settings};
use tokenscout_discovery::detectors::{FirstSightDetector, SpikeConfig, SpikeDetector};
use tokenscout_discovery::error::{AppError, Result};
use tokenscout_discovery::metadata::{MetadataEnricher, MetadataFetcher};
use tokenscout_discovery::parsers::{DexEvent, ParserRegistry, amm::AmmLogParser, curve::CurveLogParser};
use tokenscout_discovery::runner::{Runner, RunnerConfig};
use tokenscout_discovery::sources::{BackfillSource, PushLiquiditySource, PushSwapSource};
use tokenscout_discovery::store::MemoryStore;

/// TOKENSCOUT Discovery Service
#[derive(Parser, Debug)]
#[command(name = "tokenscout-discovery")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Environment name (selects config/{environment}.toml)
    #[arg(short, long, default_value = "development")]
    environment: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start live ingestion and discovery
    Run,

    /// Replay a historical window through the pipeline
    Backfill {
        /// Program address to backfill (default: every configured program)
        #[arg(long)]
        address: Option<String>,

        /// Window start, milliseconds since the Unix epoch (inclusive)
        #[arg(long)]
        from_ms: i64,

        /// Window end, milliseconds since the Unix epoch (exclusive)
        #[arg(long)]
        to_ms: i64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("tokenscout-discovery {}", tokenscout_discovery::VERSION);
        return Ok(());
    }

    let settings = Settings::load(&cli.environment)?;
    settings
        .validate()
        .map_err(|errors| AppError::Initialization(errors.join("; ")))?;

    init_logging(&settings.logging);
    init_metrics(&settings.metrics)?;

    info!(
        version = tokenscout_discovery::VERSION,
        environment = %cli.environment,
        "starting TOKENSCOUT discovery"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Run => run_live(&settings, cancel).await,
        Commands::Backfill {
            address,
            from_ms,
            to_ms,
        } => run_backfill(&settings, address, from_ms, to_ms, cancel).await,
        Commands::Version => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIRING
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the pipeline needs, wired over the in-memory store.
///
/// SQL and columnar backends implement the same port traits and slot in
/// here without touching the pipeline.
struct Pipeline {
    rpc: Arc<scout_rpc::RpcClient>,
    registry: Arc<ParserRegistry>,
    store: MemoryStore,
    runner: Runner,
}

fn build_pipeline(settings: &Settings, cancel: &CancellationToken) -> Result<Pipeline> {
    let client_config = scout_rpc::ClientConfig {
        commitment: settings.rpc.commitment.clone(),
        ..scout_rpc::ClientConfig::default()
            .with_timeout(settings.rpc.request_timeout())
            .with_max_retries(settings.rpc.max_retries)
            .with_retry_base_delay(settings.rpc.retry_base_delay())
            .with_retry_max_delay(settings.rpc.retry_max_delay())
    };
    let rpc = Arc::new(
        scout_rpc::RpcClient::with_config(&settings.rpc.http_url, client_config)?
            .with_cancellation(cancel.clone()),
    );

    let mut registry = ParserRegistry::new();
    if !settings.programs.amm_program.is_empty() {
        registry.register(Arc::new(AmmLogParser::new(
            &settings.programs.amm_program,
            &settings.programs.quote_mint,
        )?));
    }
    if !settings.programs.curve_program.is_empty() {
        registry.register(Arc::new(CurveLogParser::new(&settings.programs.curve_program)));
    }
    let registry = Arc::new(registry);

    let store = MemoryStore::new();
    let first_sight = Arc::new(FirstSightDetector::new(Arc::new(store.clone())));

    let spike_config = SpikeConfig {
        k_vol: settings.detection.volume_multiplier,
        k_swaps: settings.detection.swap_count_multiplier,
        ..SpikeConfig::default()
    };
    let mut spike = SpikeDetector::new(
        spike_config,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    );
    if settings.detection.liquidity_spike {
        spike = spike.with_liquidity_store(Arc::new(store.clone()));
    }

    let enricher = Arc::new(MetadataEnricher::new(
        MetadataFetcher::new(Arc::clone(&rpc), &settings.programs.metadata_program),
        Arc::new(store.clone()),
    ));

    let runner_config = RunnerConfig {
        lag_window_slots: settings.runner.lag_window_slots,
        flush_interval: settings.runner.flush_interval(),
        detection_interval: settings.runner.detection_interval(),
    };
    let runner = Runner::new(
        runner_config,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        first_sight,
        Arc::new(spike),
    )
    .with_enricher(enricher)
    .with_progress(Arc::new(store.clone()));

    Ok(Pipeline {
        rpc,
        registry,
        store,
        runner,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIVE MODE
// ═══════════════════════════════════════════════════════════════════════════════

async fn run_live(settings: &Settings, cancel: CancellationToken) -> Result<()> {
    let pipeline = build_pipeline(settings, &cancel)?;
    pipeline.runner.restore_progress().await;

    let push_config = scout_rpc::PushConfig {
        commitment: settings.rpc.commitment.clone(),
        notification_buffer: settings.channels.event_buffer,
        ..scout_rpc::PushConfig::default()
    };

    // Two independent push connections: providers deduplicate identical
    // subscriptions on one connection, which would collapse the swap and
    // liquidity streams into the same channel.
    let swap_push = Arc::new(scout_rpc::PushClient::connect(
        &settings.rpc.ws_url,
        push_config.clone(),
    )?);
    let liquidity_push = Arc::new(scout_rpc::PushClient::connect(
        &settings.rpc.ws_url,
        push_config,
    )?);

    let programs = settings.programs.configured_programs();
    let (swap_tx, swap_rx) = mpsc::channel(settings.channels.event_buffer);
    let (liquidity_tx, liquidity_rx) = mpsc::channel(settings.channels.event_buffer);

    let swap_source = PushSwapSource::new(
        Arc::clone(&pipeline.rpc),
        Arc::clone(&swap_push),
        Arc::clone(&pipeline.registry),
        programs.clone(),
    );
    let liquidity_source = PushLiquiditySource::new(
        Arc::clone(&pipeline.rpc),
        Arc::clone(&liquidity_push),
        Arc::clone(&pipeline.registry),
        programs,
    )
    .with_candidate_store(Arc::new(pipeline.store.clone()));

    // A source failure (e.g. a subscription that never confirms) is fatal:
    // cancelling here makes the runner drain its buffers and exit.
    let swap_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = swap_source.run(swap_tx, swap_cancel.clone()).await {
            error!(error = %e, "swap source failed");
            swap_cancel.cancel();
        }
    });
    let liquidity_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = liquidity_source.run(liquidity_tx, liquidity_cancel.clone()).await {
            error!(error = %e, "liquidity source failed");
            liquidity_cancel.cancel();
        }
    });

    let result = pipeline.runner.run(swap_rx, liquidity_rx, cancel).await;

    swap_push.close();
    liquidity_push.close();

    info!(
        candidates = pipeline.store.candidate_count(),
        swaps = pipeline.store.swap_count(),
        "discovery stopped"
    );
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// BACKFILL MODE
// ═══════════════════════════════════════════════════════════════════════════════

async fn run_backfill(
    settings: &Settings,
    address: Option<String>,
    from_ms: i64,
    to_ms: i64,
    cancel: CancellationToken,
) -> Result<()> {
    if from_ms >= to_ms {
        return Err(AppError::Initialization("from_ms must precede to_ms".into()));
    }

    let pipeline = build_pipeline(settings, &cancel)?;
    let source = BackfillSource::new(Arc::clone(&pipeline.rpc), Arc::clone(&pipeline.registry));

    let addresses = address.map_or_else(|| settings.programs.configured_programs(), |a| vec![a]);
    let mut events = Vec::new();
    for address in &addresses {
        info!(address = %address, from_ms, to_ms, "backfilling");
        events.extend(source.fetch_range(address, from_ms, to_ms, &cancel).await?);
    }
    info!(events = events.len(), "backfill fetched, replaying through the runner");

    let (swap_tx, swap_rx) = mpsc::channel(settings.channels.event_buffer);
    let (liquidity_tx, liquidity_rx) = mpsc::channel(settings.channels.event_buffer);

    // Feed concurrently with the runner; dropping the senders ends the
    // streams and the runner drains everything before returning.
    let feeder = tokio::spawn(async move {
        for event in events {
            let sent = match event {
                DexEvent::Swap(swap) => swap_tx.send(swap).await.is_ok(),
                DexEvent::Liquidity(liquidity) => liquidity_tx.send(liquidity).await.is_ok(),
            };
            if !sent {
                warn!("runner stopped before the backfill drained");
                break;
            }
        }
    });

    let result = pipeline.runner.run(swap_rx, liquidity_rx, cancel).await;
    let _ = feeder.await;

    info!(
        candidates = pipeline.store.candidate_count(),
        swaps = pipeline.store.swap_count(),
        liquidity = pipeline.store.liquidity_count(),
        "backfill replay complete"
    );
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVABILITY SETUP
// ═══════════════════════════════════════════════════════════════════════════════

fn init_logging(settings: &LoggingSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.level));

    if settings.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn init_metrics(settings: &MetricsSettings) -> Result<()> {
    if !settings.enabled {
        return Ok(());
    }
    let address: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .map_err(|e| AppError::Initialization(format!("bad metrics address: {e}")))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .map_err(|e| AppError::Initialization(format!("metrics exporter: {e}")))?;

    info!(%address, "Prometheus exporter listening");
    Ok(())
}
