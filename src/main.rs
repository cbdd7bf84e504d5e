use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sui_buy_watcher::detection::balance_analyzer::BalanceAnalyzer;
use sui_buy_watcher::types::StoreKind;
use sui_buy_watcher::{
    CursorStore, EventClassifier, FanoutSink, JsonFileStore, LogSink, MemoryStore, MonitorConfig,
    NotificationSink, RaffleBook, RaffleSink, RpcGateway, SuiRpcClient, TelegramSink,
    TransactionCache, WatcherOrchestrator, create_default_config, load_config,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Watch Sui DEX venues for buys of one token
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every configured venue until Ctrl+C
    Watch {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Print the tracked token's net delta and verdict for a transaction
    Classify { digest: String },
    /// List the event types emitted by a transaction
    Events { digest: String },
    /// List the coin types in a transaction's balance changes
    CoinTypes { digest: String },
    /// Write a commented default config file
    InitConfig {
        /// Replace the config file if it already exists
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let force = matches!(cli.command, Command::InitConfig { force: true });
    if matches!(cli.command, Command::InitConfig { .. }) || !cli.config.exists() {
        init_tracing("info");
        info!("Creating default config file...");
        create_default_config(&cli.config, force).with_context(|| {
            format!("Failed to write {:?} (use init-config --force to replace it)", cli.config)
        })?;
        info!("Please edit {:?} with the token and venues to watch", cli.config);
        return Ok(());
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config {:?}", cli.config))?;
    init_tracing(&config.log_level);

    let client = SuiRpcClient::new(
        &config.rpc_endpoint,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let gateway = Arc::new(RpcGateway::new(Arc::new(client), config.retry));

    match cli.command {
        Command::Watch { once } => watch(config, gateway, once).await,
        Command::Classify { digest } => classify(&config, gateway, &digest).await,
        Command::Events { digest } => print_events(&gateway, &digest).await,
        Command::CoinTypes { digest } => print_coin_types(&config, &gateway, &digest).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

async fn watch(config: MonitorConfig, gateway: Arc<RpcGateway>, once: bool) -> Result<()> {
    info!("Starting Sui buy watcher for {}", config.tracked_token);

    let cache = Arc::new(TransactionCache::new(config.tx_cache_capacity));
    let classifier = Arc::new(EventClassifier::new(
        &config.tracked_token,
        config.token_decimals,
        gateway,
        cache,
    ));

    let store: Arc<dyn CursorStore> = match config.store_kind {
        StoreKind::Memory => {
            warn!("Using in-memory store: cursors and seen keys are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreKind::File => Arc::new(
            JsonFileStore::open(&config.store_path)
                .await
                .with_context(|| format!("Failed to open store {:?}", config.store_path))?,
        ),
    };

    let mut sink = FanoutSink::default();
    sink.push(Arc::new(LogSink));
    if let Some(ref telegram) = config.telegram {
        sink.push(Arc::new(TelegramSink::new(telegram)?));
        info!("📨 Telegram notifications enabled");
    }

    let raffle = config.raffle.as_ref().map(|settings| {
        let book = Arc::new(RaffleBook::new());
        book.start(settings.prize, settings.duration_hours, Utc::now());
        book
    });
    if let Some(ref book) = raffle {
        sink.push(Arc::new(RaffleSink::new(book.clone())));
    }
    let sink: Arc<dyn NotificationSink> = Arc::new(sink);

    let mut orchestrator = WatcherOrchestrator::build(&config, classifier, store, sink);

    if once {
        let summary = orchestrator.run_once().await;
        info!(
            "Single pass done: {} venues ok, {} failed, {} notified",
            summary.succeeded.len(),
            summary.failed.len(),
            summary.notified()
        );
    } else {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal, stopping after the current pass");
                signal.cancel();
            }
        });

        info!("Watcher is running. Press Ctrl+C to stop.");
        orchestrator
            .run(Duration::from_secs(config.poll_interval_secs), shutdown)
            .await;
    }

    if let Some(book) = raffle {
        report_raffle(&book);
    }

    info!("Shutting down...");
    Ok(())
}

fn report_raffle(book: &RaffleBook) {
    info!("");
    info!("🎟️ RAFFLE STATS:");
    info!("   Total tickets:  {}", book.total_tickets());
    info!("   Unique wallets: {}", book.unique_wallets());
    for (rank, (wallet, tickets)) in book.leaderboard(10).into_iter().enumerate() {
        info!("   {:>2}. {} {}", rank + 1, wallet, tickets);
    }

    let ended = book.current().is_some_and(|r| !r.is_active(Utc::now()));
    if ended {
        if let Some(winner) = book.pick_winner(&mut rand::thread_rng()) {
            info!("   Winner: {}", winner);
        }
    }
}

async fn classify(config: &MonitorConfig, gateway: Arc<RpcGateway>, digest: &str) -> Result<()> {
    let classifier = EventClassifier::new(
        &config.tracked_token,
        config.token_decimals,
        gateway,
        Arc::new(TransactionCache::new(1)),
    );
    let detail = classifier
        .fetch_transaction(digest)
        .await
        .with_context(|| format!("Failed to fetch transaction {}", digest))?;
    let verdict = classifier.verdict(&detail);

    println!("Transaction: {}", digest);
    println!("Tracked:     {}", config.tracked_token);
    println!("Net delta:   {}", verdict.net_delta);
    if let Some(ui) = verdict.ui_amount {
        println!("Amount:      {} {}", ui.normalize(), config.token_symbol);
    }
    if let Some(ref buyer) = verdict.buyer {
        println!("Buyer:       {}", buyer);
    }
    println!("Verdict:     {}", verdict.kind);
    println!("Link:        {}", config.explorer_link(digest));
    Ok(())
}

async fn print_events(gateway: &RpcGateway, digest: &str) -> Result<()> {
    let detail = gateway
        .get_transaction(digest)
        .await
        .with_context(|| format!("Failed to fetch transaction {}", digest))?;

    if detail.event_types.is_empty() {
        println!("No events in {}", digest);
    }
    for (i, event_type) in detail.event_types.iter().enumerate() {
        println!("[{}] {}", i, event_type);
    }
    Ok(())
}

async fn print_coin_types(config: &MonitorConfig, gateway: &RpcGateway, digest: &str) -> Result<()> {
    let detail = gateway
        .get_transaction(digest)
        .await
        .with_context(|| format!("Failed to fetch transaction {}", digest))?;

    let analyzer = BalanceAnalyzer::new(config.tracked_token.as_str());
    let nets: BTreeMap<String, i128> = analyzer
        .net_deltas(&detail.balance_changes)
        .into_iter()
        .map(|d| (d.coin_type, d.delta))
        .collect();

    let mut listed = Vec::new();
    for change in &detail.balance_changes {
        if listed.contains(&change.coin_type) {
            continue;
        }
        listed.push(change.coin_type.clone());
        let net = nets.get(&change.coin_type).copied().unwrap_or(0);
        let marker = if change.coin_type == config.tracked_token { " *" } else { "" };
        println!("{} net {}{}", change.coin_type, net, marker);
    }
    if listed.is_empty() {
        println!("No balance changes in {}", digest);
    }
    Ok(())
}
