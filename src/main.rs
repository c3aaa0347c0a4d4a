//! QuoteEngine - Main Entry Point
//!
//! Runs the authoritative price monitor and, on request, prints the best
//! available quote per duration bucket and bet direction.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use quote_engine::common::traits::PriceSource;
use quote_engine::config::loader::load_config;
use quote_engine::price::event_channel;
use quote_engine::price::sources::{
    DecimalsCache, ExchangeCandleSource, ExchangeTickerSource, OnchainAggregatorSource,
    ProxyPriceSource,
};
use quote_engine::quote::codec::parse_all;
use quote_engine::{
    best_by_bucket, calculate_payout, Asset, BetDirection, ChartFeed, FeedTable, ParsedQuote,
    PositionSizer, PriceCascade, PriceEvent, PriceMonitor, VenueClient,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Comma-separated list of assets to monitor (defaults to every configured feed)
    #[arg(long)]
    assets: Option<String>,

    /// Fetch the quote book once and log the best quote per bucket
    #[arg(long)]
    show_quotes: bool,

    /// With --show-quotes, also size each best quote for this spend
    #[arg(long)]
    spend: Option<Decimal>,
}

fn init_logging(log_level: &str) -> Result<()> {
    if std::env::var("RUST_LOG").is_ok() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn select_assets(requested: Option<&str>, feeds: &FeedTable) -> Result<Vec<Asset>> {
    match requested {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Asset>().map_err(anyhow::Error::from))
            .collect(),
        None => Ok(feeds.assets()),
    }
}

fn log_sizing(sizer: &PositionSizer, asset: Asset, quote: &ParsedQuote, spend: Decimal) {
    match sizer.size(quote, spend) {
        Ok(sized) => match sized.contracts() {
            Ok(contracts) => {
                info!(%asset, %spend, %contracts, ceiling = ?sized.ceiling, "Sized quote")
            }
            Err(e) => warn!(%asset, %spend, "Contract count not displayable: {}", e),
        },
        Err(e) => warn!(%asset, %spend, "Cannot size quote: {}", e),
    }
}

async fn show_quotes(
    venue: &VenueClient,
    feeds: &FeedTable,
    assets: &[Asset],
    sizing: Option<(&PositionSizer, Decimal)>,
) -> Result<()> {
    let raws = venue.fetch_quotes().await?;
    let quotes = parse_all(&raws, feeds);
    let now = Utc::now();
    info!("Quote book: {} usable of {} decoded", quotes.len(), raws.len());

    for asset in assets {
        for direction in [BetDirection::Up, BetDirection::Down] {
            let best = best_by_bucket(&quotes, *asset, direction, now);
            if best.is_empty() {
                info!(%asset, ?direction, "No quote available");
                continue;
            }
            for (bucket, quote) in best {
                match calculate_payout(quote) {
                    Ok(payout) => info!(
                        %asset,
                        ?direction,
                        %bucket,
                        strikes = %quote.strike_label(),
                        premium = %quote.premium,
                        payout = %payout.payout_label(),
                        roi = %payout.roi_label(),
                        "Best quote"
                    ),
                    Err(e) => {
                        warn!(%asset, %bucket, "Skipping quote: {}", e);
                        continue;
                    }
                }
                if let Some((sizer, spend)) = sizing {
                    log_sizing(sizer, *asset, quote, spend);
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    init_logging(&args.log_level)?;

    info!("Starting QuoteEngine application");
    info!("Configuration file: {}", args.config);

    let config = load_config(Some(&args.config))?;
    let feeds = config.feed_table()?;
    let assets = select_assets(args.assets.as_deref(), &feeds)?;
    let timeout = config.request_timeout();

    // Authoritative cascade: on-chain aggregator, then proxy, then exchange ticker
    let decimals = Arc::new(DecimalsCache::new());
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(OnchainAggregatorSource::new(
            &config.chain.rpc_url,
            feeds.clone(),
            decimals,
            timeout,
        )?),
        Arc::new(ProxyPriceSource::new(&config.price.proxy_url, timeout)?),
        Arc::new(ExchangeTickerSource::new(&config.price.exchange_url, timeout)?),
    ];
    let cascade = Arc::new(PriceCascade::new(sources));

    let candles = ExchangeCandleSource::new(
        &config.price.exchange_url,
        &config.price.candle_interval,
        config.price.candle_limit,
        timeout,
    )?;
    let chart = Arc::new(ChartFeed::new(
        Arc::new(candles),
        config.price.history_capacity,
    ));

    if args.show_quotes {
        let venue = VenueClient::with_timeout(&config.venue.quotes_url, timeout)?;
        let sizer = config.position_sizer();
        let sizing = args.spend.map(|spend| (&sizer, spend));
        if let Err(e) = show_quotes(&venue, &feeds, &assets, sizing).await {
            warn!("Could not load quotes: {}", e);
        }
    }

    let (tx, mut rx) = event_channel();
    let monitor = PriceMonitor::spawn(
        cascade,
        chart,
        assets,
        config.monitor_settings(),
        tx,
    );

    info!("Application initialized successfully");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(PriceEvent::Authoritative(reading)) => info!(
                    asset = %reading.asset,
                    price = %reading.price,
                    source = %reading.source,
                    stale = reading.stale,
                    "Authoritative price"
                ),
                Some(PriceEvent::Unavailable { asset }) => {
                    warn!(%asset, "Authoritative price unavailable")
                }
                Some(PriceEvent::Chart { asset, sample }) => {
                    info!(%asset, price = %sample.price, at = %sample.timestamp, "Chart price")
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, cleaning up...");
                break;
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}
