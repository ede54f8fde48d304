use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use stonkgaze_core::analyzer::remote::HttpAnalyzer;
use stonkgaze_core::analyzer::traits::{clamp_troll_level, Analyzer};
use stonkgaze_core::models::panel::{PanelState, PanelStatus};
use stonkgaze_core::models::portfolio::TradeCommand;
use stonkgaze_core::models::settings::Settings;
use stonkgaze_core::services::snapshot_source::{PageContent, PageEvent, StaticPage};
use stonkgaze_core::storage::store::FileStore;
use stonkgaze_core::StonkGaze;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "stonkgaze", about = "Turn any page into a (questionable) trade idea", version)]
struct Cli {
    /// Analysis service base URL.
    #[arg(long, global = true, env = "STONKGAZE_API_URL")]
    api_url: Option<String>,
    /// Where preferences and the paper portfolio are kept.
    #[arg(long, global = true, env = "STONKGAZE_DATA_DIR", default_value = ".stonkgaze")]
    data_dir: PathBuf,
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a page through the full snapshot -> analysis -> panel pipeline.
    Analyze(AnalyzeArgs),
    /// Ask the service for its canned demo analysis.
    Demo {
        #[arg(long)]
        troll_level: Option<i64>,
    },
    /// Check that the analysis service is up.
    Health,
    Portfolio(PortfolioArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Read the page text from a file.
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,
    /// Page text given inline.
    #[arg(long)]
    text: Option<String>,
    #[arg(long, default_value = "Untitled page")]
    title: String,
    #[arg(long, default_value = "about:blank")]
    url: String,
    /// Also stored as the new preference.
    #[arg(long)]
    troll_level: Option<i64>,
}

#[derive(Args, Debug)]
struct PortfolioArgs {
    #[command(subcommand)]
    command: PortfolioCommand,
}

#[derive(Subcommand, Debug)]
enum PortfolioCommand {
    Show,
    Buy(TradeArgs),
    Sell(TradeArgs),
    /// Back to starting cash, no positions, no history.
    Reset,
}

#[derive(Args, Debug, Clone)]
struct TradeArgs {
    ticker: String,
    #[arg(long)]
    shares: f64,
    #[arg(long)]
    price: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::from_env().context("invalid STONKGAZE_* environment")?;
    if let Some(url) = cli.api_url.clone() {
        settings.api_base_url = url;
    }

    match cli.command {
        Commands::Analyze(args) => run_analyze(settings, &cli.data_dir, args).await,
        Commands::Demo { troll_level } => run_demo(settings, &cli.data_dir, troll_level).await,
        Commands::Health => run_health(settings).await,
        Commands::Portfolio(args) => run_portfolio(settings, &cli.data_dir, args.command),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "stonkgaze=debug,stonkgaze_core=debug"
    } else {
        "stonkgaze=info,stonkgaze_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_app(settings: Settings, data_dir: &Path) -> Result<StonkGaze> {
    let store = FileStore::open(data_dir)
        .with_context(|| format!("cannot open data directory {}", data_dir.display()))?;
    Ok(StonkGaze::new(settings, Arc::new(store))?)
}

async fn run_analyze(settings: Settings, data_dir: &Path, args: AnalyzeArgs) -> Result<()> {
    let text = match (&args.file, args.text) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => bail!("nothing to analyze: pass --file or --text"),
    };

    let deadline = settings.settle_window()
        + settings.debounce()
        + settings.request_timeout()
        + Duration::from_secs(5);
    let app = open_app(settings, data_dir)?;
    if let Some(level) = args.troll_level {
        app.preferences().set_troll_level(clamp_troll_level(level))?;
    }

    let analyzer = Arc::new(HttpAnalyzer::from_settings(app.settings()));
    let (mut panel, panel_task) = app.open_panel();
    let coordinator = app.start_coordinator(analyzer);
    let reader = Arc::new(StaticPage(PageContent {
        title: args.title,
        url: args.url,
        text,
    }));
    let (page_events, page_task) = app.start_page(reader);
    page_events.send(PageEvent::Load).await?;
    info!(troll_level = app.troll_level(), "page loaded, waiting for analysis");

    let outcome = tokio::time::timeout(deadline, wait_for_verdict(&mut panel)).await;

    coordinator.abort();
    page_task.abort();
    panel_task.abort();

    let state = match outcome {
        Ok(state) => state?,
        Err(_) => bail!("no verdict within {}s", deadline.as_secs()),
    };
    println!("{}", serde_json::to_string_pretty(&state)?);
    if state.status == PanelStatus::Error {
        bail!(state.error.unwrap_or_else(|| "analysis failed".into()));
    }

    if let Some(result) = &state.result {
        let mut ledger = app.open_ledger();
        if let Some(market) = &state.market {
            ledger.observe_market(result, market);
        }
        let suggestion = ledger.suggestion(result, state.market.as_ref());
        println!("{}", serde_json::to_string_pretty(&suggestion)?);
    }
    Ok(())
}

async fn wait_for_verdict(panel: &mut watch::Receiver<PanelState>) -> Result<PanelState> {
    loop {
        panel.changed().await.context("panel stopped before a verdict")?;
        let state = panel.borrow_and_update().clone();
        debug!(status = ?state.status, "panel update");
        if matches!(state.status, PanelStatus::Success | PanelStatus::Error) {
            return Ok(state);
        }
    }
}

async fn run_demo(settings: Settings, data_dir: &Path, troll_level: Option<i64>) -> Result<()> {
    let app = open_app(settings, data_dir)?;
    let level = match troll_level {
        Some(level) => clamp_troll_level(level),
        None => app.troll_level(),
    };
    let analyzer = HttpAnalyzer::from_settings(app.settings());
    let outcome = analyzer.analyze_demo(level).await?;
    if let Some(warning) = &outcome.warning {
        tracing::warn!(%warning, "demo response degraded");
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn run_health(settings: Settings) -> Result<()> {
    let analyzer = HttpAnalyzer::from_settings(&settings);
    if analyzer.health().await? {
        println!("{} is healthy", analyzer.base_url());
        Ok(())
    } else {
        bail!("{} answered but is not healthy", analyzer.base_url())
    }
}

fn run_portfolio(settings: Settings, data_dir: &Path, command: PortfolioCommand) -> Result<()> {
    let app = open_app(settings, data_dir)?;
    let mut ledger = app.open_ledger();

    let command = match command {
        PortfolioCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&ledger.summary())?);
            return Ok(());
        }
        PortfolioCommand::Reset => {
            ledger.reset()?;
            println!("portfolio reset, cash ${:.2}", ledger.cash());
            return Ok(());
        }
        PortfolioCommand::Buy(t) => TradeCommand::buy(t.ticker, t.shares, t.price),
        PortfolioCommand::Sell(t) => TradeCommand::sell(t.ticker, t.shares, t.price),
    };

    let execution = ledger.execute(command)?;
    let trade = &execution.trade;
    println!(
        "{} {} {} @ ${:.2} (total ${:.2}), cash left ${:.2}",
        trade.trade_type,
        trade.shares,
        trade.ticker,
        trade.price,
        trade.total(),
        ledger.cash()
    );
    if let Some(e) = execution.persist_error {
        bail!("trade applied but not saved: {e}");
    }
    Ok(())
}
