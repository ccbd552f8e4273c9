// src/main.rs
use std::path::PathBuf;
use std::process::exit;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn, Level};
use url::Url;

use vulnscout::analysis::Evidence;
use vulnscout::config::Config;
use vulnscout::events::{EventSink, ProgressEvent};
use vulnscout::pipeline::Scanner;
use vulnscout::reporting::ReportManager;

#[derive(Parser)]
#[command(name = "vulnscout")]
#[command(about = "Crawl, probe and triage an authorized web target")]
struct Args {
    #[command(subcommand)]
    command: Cli,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Cli {
    /// Crawl a target and save the crawl outcome
    Crawl {
        #[arg(help = "Seed URL")]
        url: String,

        #[arg(long, help = "Maximum pages to visit")]
        max_pages: Option<usize>,

        #[arg(long, help = "Pages acquired concurrently per batch")]
        batch_size: Option<usize>,
    },

    /// Actively probe one URL's parameters and the origin's sensitive paths
    Fuzz {
        #[arg(help = "URL with query parameters")]
        url: String,
    },

    /// Crawl, fuzz, analyze and write the report
    Scan {
        #[arg(help = "Seed URL")]
        url: String,

        #[arg(long, help = "Maximum pages to visit")]
        max_pages: Option<usize>,
    },

    /// Analyze a previously saved evidence bundle
    Analyze {
        #[arg(help = "Path to evidence JSON")]
        evidence: PathBuf,
    },

    /// Initialize config
    Init {
        #[arg(short, long, help = "Force overwrite existing configuration")]
        force: bool,
    },
}

/// Log every progress event as it arrives
async fn log_events(mut rx: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::CrawlState(state) => info!("Crawl {:?}", state),
            ProgressEvent::PageCrawled(result) => match &result.error {
                Some(e) => warn!("[{}] {} failed: {}", result.status, result.url, e),
                None => info!("[{}] {} ({} links, {} forms, {} API calls)",
                              result.status, result.url, result.links.len(), result.forms.len(), result.api_calls.len()),
            },
            ProgressEvent::UrlsDiscovered { new_urls, frontier } => {
                debug!("{} new URLs, {} pending", new_urls.len(), frontier.len())
            }
            ProgressEvent::FuzzFinding(finding) => {
                warn!("{} ({:?}) at {}", finding.vulnerability_type, finding.confidence, finding.url)
            }
            ProgressEvent::FuzzCompleted { findings } => info!("Fuzzing done: {} findings", findings),
            ProgressEvent::QuotaStatus { available, cooling_down, exhausted } => {
                info!("Keys: {} available, {} cooling down{}", available, cooling_down,
                      if exhausted { " (exhausted)" } else { "" })
            }
            ProgressEvent::ClusterAnalyzed { cluster_id, vulnerabilities } => {
                info!("Cluster {} analyzed: {} vulnerabilities", cluster_id, vulnerabilities)
            }
            ProgressEvent::ModelDowngraded { model } => warn!("Analysis model downgraded to {}", model),
            ProgressEvent::ReportReady(report) => {
                info!("Report ready: {} vulnerabilities ({} critical, {} high)",
                      report.statistics.total, report.statistics.critical, report.statistics.high)
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if let Cli::Init { force } = args.command {
        let path = Config::init(force)?;
        println!("Configuration initialized at {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;

    match &args.command {
        Cli::Crawl { max_pages, batch_size, .. } => {
            if let Some(max_pages) = max_pages {
                config.crawler.max_pages = *max_pages;
            }
            if let Some(batch_size) = batch_size {
                config.crawler.batch_size = *batch_size;
            }
        }
        Cli::Scan { max_pages: Some(max_pages), .. } => config.crawler.max_pages = *max_pages,
        _ => {}
    }

    let (events, rx) = EventSink::channel();
    let logger = tokio::spawn(log_events(rx));

    let reports = ReportManager::new(config.global.data_dir.join("reports"));
    let scanner = Scanner::new(config, events);

    let stop = scanner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight work");
            stop.cancel();
        }
    });

    match args.command {
        Cli::Crawl { url, .. } => {
            let outcome = scanner.crawl(&url).await?;
            let name = format!("crawl-{}", Utc::now().format("%Y%m%d-%H%M%S"));
            let path = reports.save_json(&name, &outcome).await?;
            println!("Crawled {} pages ({} pending, {} domains), state {:?}",
                     outcome.results.len(), outcome.pending().len(), outcome.aggregate.domains.len(), outcome.state);
            println!("Crawl outcome saved to {}", path.display());
        }
        Cli::Fuzz { url } => {
            let parsed = Url::parse(&url).with_context(|| format!("Invalid URL {}", url))?;
            let findings = scanner.fuzz(&[url.clone()], &parsed.origin().ascii_serialization()).await?;
            for finding in &findings {
                println!("[{:?}] {} {} {}", finding.confidence, finding.vulnerability_type, finding.url,
                         finding.parameter.as_deref().unwrap_or("-"));
            }
            println!("{} findings", findings.len());
        }
        Cli::Scan { url, .. } => {
            let output = scanner.scan(&url).await?;
            println!("{} vulnerabilities ({} critical, {} high)",
                     output.report.statistics.total, output.report.statistics.critical, output.report.statistics.high);
            println!("Evidence: {}", output.evidence_path.display());
            for path in &output.report_paths {
                println!("Report: {}", path.display());
            }
        }
        Cli::Analyze { evidence } => {
            let bundle = Evidence::load(&evidence)?;
            let report = scanner.analyze(&bundle).await?;
            let (_, paths) = scanner.save(&report, &bundle).await?;
            for path in &paths {
                println!("Report: {}", path.display());
            }
        }
        Cli::Init { .. } => {}
    }

    drop(scanner);
    let _ = logger.await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        exit(1);
    }

    Ok(())
}
