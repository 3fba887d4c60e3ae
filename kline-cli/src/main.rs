//! K-line Terminal
//!
//! Command-line client that connects to a market-data server, fetches candle
//! series for a set of symbols and timeframes, and reports how each request
//! performed.
//!
//! Subcommands:
//!   - `quick-connect` - connect to the public data endpoint without auth
//!   - `connect`       - connect to a chosen endpoint, optionally authenticated
//!   - `fetch`         - run a batch of candle requests and print the results
//!   - `watch`         - stream live updates for one series
//!   - `timeframes`    - list the supported timeframe labels

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kline_core::{Endpoint, KlineError, LogLevel, MarketDataClient};
use kline_services::{
    parse_symbols, render_performance, render_results, resolve_client, ClientSession,
    ClientSource, KlineQuery, TimeframeRequest, TIMEFRAMES,
};

// ---------------------------------------------------------------------------
// CLI argument structs
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "kline-terminal",
    version,
    about = "Fetch and benchmark K-line (candlestick) data from TradingView",
    propagate_version = true
)]
struct Cli {
    /// Log verbosity: trace, debug, info, warn, error, fatal
    #[arg(long, global = true, env = "KLINE_LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Directory of recorded candle fixtures, used when the remote client is
    /// unavailable or with --offline
    #[arg(long, global = true, env = "KLINE_FIXTURE_DIR")]
    fixtures: Option<PathBuf>,

    /// Skip the remote client and replay fixtures only
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the data endpoint without authentication
    QuickConnect,
    /// Test a connection to an endpoint
    Connect(ConnectionArgs),
    /// Fetch candles for every symbol and timeframe
    Fetch(FetchArgs),
    /// Stream live series updates for a symbol
    Watch(WatchArgs),
    /// List supported timeframe labels
    Timeframes,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Server endpoint: data, prodata, widgetdata, charts-polygon
    #[arg(long, default_value = "data")]
    endpoint: Endpoint,

    /// TradingView session id for authenticated access
    #[arg(long, env = "TV_SESSION_ID", hide_env_values = true)]
    session_id: Option<String>,
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Symbol to fetch (repeatable), e.g. BINANCE:BTCUSDT.P
    #[arg(short = 's', long = "symbol")]
    symbols: Vec<String>,

    /// File with one symbol per line
    #[arg(long)]
    symbols_file: Option<PathBuf>,

    /// Timeframe as label[:amount] (repeatable), e.g. 1h:200 or 1D
    #[arg(short = 't', long = "timeframe", default_value = "1h:200")]
    timeframes: Vec<TimeframeRequest>,

    /// Log realtime events while the batch runs
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Write the JSON report to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Symbol whose series updates to follow
    #[arg(short = 's', long, default_value = "BINANCE:BTCUSDT.P")]
    symbol: String,

    /// Timeframe as label[:amount]
    #[arg(short = 't', long, default_value = "1m:10")]
    timeframe: TimeframeRequest,

    /// How long to keep listening
    #[arg(long, default_value_t = 30)]
    seconds: u64,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(level: LogLevel) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.filter_directive())),
        )
        .init();
}

fn client_sources(cli: &Cli) -> Vec<ClientSource> {
    let mut sources = Vec::new();
    if !cli.offline {
        sources.push(ClientSource::Remote);
    }
    if let Some(dir) = &cli.fixtures {
        sources.push(ClientSource::Fixtures(dir.clone()));
    }
    sources
}

fn load_client(cli: &Cli) -> anyhow::Result<Arc<dyn MarketDataClient>> {
    match resolve_client(&client_sources(cli)).into_client() {
        Ok(client) => Ok(client),
        Err(e) => {
            error!("{}", e);
            println!("Status: {}", e);
            Err(e.into())
        }
    }
}

fn collect_symbols(args: &FetchArgs) -> anyhow::Result<Vec<String>> {
    let mut text = args.symbols.join("\n");
    if let Some(path) = &args.symbols_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read symbols file {}", path.display()))?;
        text.push('\n');
        text.push_str(&contents);
    }
    Ok(parse_symbols(&text))
}

fn connection_status(session: &ClientSession) -> String {
    match session.endpoint() {
        Some(endpoint) if session.is_authenticated() => {
            format!("Connected to {} (authenticated)", endpoint)
        }
        Some(endpoint) => format!("Connected to {} (public data)", endpoint),
        None => "Disconnected".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run_connect(session: &mut ClientSession, args: Option<&ConnectionArgs>) -> Result<(), KlineError> {
    let result = match args {
        Some(args) => {
            session
                .connect(args.endpoint, args.session_id.clone())
                .await
        }
        None => session.quick_connect().await,
    };

    match &result {
        Ok(()) => println!("Status: {}", connection_status(session)),
        Err(e) => println!("Status: Connection failed: {}", e),
    }
    result
}

async fn run_fetch(session: &mut ClientSession, args: &FetchArgs) -> anyhow::Result<()> {
    let symbols = collect_symbols(args)?;
    let query = KlineQuery::new(symbols, args.timeframes.clone(), args.connection.endpoint);
    if let Err(e) = query.validate() {
        println!("Status: {}", e);
        return Err(e.into());
    }

    run_connect(session, Some(&args.connection)).await?;
    if args.realtime {
        session.enable_realtime_logging();
    }

    let report = match session.load_data(&query).await {
        Ok(report) => report,
        Err(e) => {
            error!("Data loading error: {}", e);
            println!("Status: Data loading failed: {}", e);
            session.disconnect().await;
            return Err(e.into());
        }
    };

    println!();
    print!("{}", render_results(&report));
    println!();
    print!("{}", render_performance(&report.summary));

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    println!(
        "Status: Loaded {}/{} series",
        report.summary.successful, report.summary.total_requests
    );
    session.disconnect().await;
    Ok(())
}

async fn run_watch(session: &mut ClientSession, args: &WatchArgs) -> anyhow::Result<()> {
    run_connect(session, Some(&args.connection)).await?;
    session.enable_realtime_logging();

    let mut watch = match session.watch_series(&args.symbol, &args.timeframe).await {
        Ok(watch) => watch,
        Err(e) => {
            error!("Failed to watch {}: {}", args.symbol, e);
            println!("Status: Watch failed: {}", e);
            session.disconnect().await;
            return Err(e.into());
        }
    };

    info!("Watching {} for {}s (Ctrl+C to stop)", args.symbol, args.seconds);
    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupt);
    let mut updates = 0u64;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut interrupt => {
                info!("Interrupted");
                break;
            }
            event = watch.next() => match event {
                Some(event) if matches!(event.name.as_str(), "du" | "timescale_update") => updates += 1,
                Some(event) if event.name.ends_with("_error") => {
                    warn!(event = %event.name, params = ?event.params, "Watch reported {}", event.name);
                }
                Some(_) => {}
                None => {
                    warn!("Connection closed while watching");
                    break;
                }
            },
        }
    }

    if watch.skipped() > 0 {
        warn!(skipped = watch.skipped(), "Fell behind the update stream");
    }
    watch.unsubscribe();
    session.disconnect().await;
    println!("Status: Received {} series updates for {}", updates, args.symbol);
    Ok(())
}

fn print_timeframes() {
    println!("{:<6} {:<6} {:<12} {}", "LABEL", "API", "TEXT", "DEFAULT");
    for spec in TIMEFRAMES {
        println!(
            "{:<6} {:<6} {:<12} {}",
            spec.label, spec.api, spec.text, spec.default_amount
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    let cli = Cli::parse();
    init_tracing(cli.log_level);

    if let Commands::Timeframes = cli.command {
        print_timeframes();
        return Ok(());
    }

    info!("Starting K-line Terminal");
    let client = load_client(&cli)?;
    let mut session = ClientSession::new(client);
    session.set_log_level(cli.log_level);

    match &cli.command {
        Commands::QuickConnect => {
            run_connect(&mut session, None).await?;
            session.disconnect().await;
        }
        Commands::Connect(args) => {
            run_connect(&mut session, Some(args)).await?;
            session.disconnect().await;
        }
        Commands::Fetch(args) => run_fetch(&mut session, args).await?,
        Commands::Watch(args) => run_watch(&mut session, args).await?,
        Commands::Timeframes => {}
    }

    Ok(())
}
