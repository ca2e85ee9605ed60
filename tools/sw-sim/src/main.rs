//! Offline worker simulator for built Sitekit sites.
//!
//! Runs the worker's install/activate lifecycle and fetch routing against a
//! static build output, without a browser.
//!
//! ## Usage
//!
//! ```bash
//! # Precache from dist/ and show cache contents
//! sw-sim install --site dist/
//!
//! # Show how a request would be routed
//! sw-sim route /fonts/serif.woff2
//!
//! # Fetch pages with the network cut after install
//! sw-sim fetch / /lore/ /unseen/ --site dist/ --offline --html
//!
//! # Precache from a running server instead of a build
//! sw-sim install --origin http://localhost:4321/
//!
//! # Print the effective configuration
//! sw-sim config --config sw.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sitekit_common::{init_logging, LogConfig, LogFormat};
use sitekit_sw::{
    EventOutcome, Fetcher, HttpFetcher, Request, ServiceWorker, WorkerConfig, WorkerEvent,
};
use url::Url;

mod site;

use site::{Connectivity, DirFetcher};

#[derive(Parser)]
#[command(name = "sw-sim")]
#[command(about = "Offline worker simulator for built Sitekit sites")]
struct Cli {
    /// Worker configuration (JSON); defaults are used when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate the worker against a site directory
    Install {
        /// Built site directory
        #[arg(short, long, default_value = "dist")]
        site: PathBuf,
        /// Live origin to fetch from instead of a site directory
        #[arg(long, conflicts_with = "site")]
        origin: Option<Url>,
    },

    /// Print the route a request would take
    Route {
        /// Root-relative path or absolute URL
        path: String,
        /// Send an HTML Accept header
        #[arg(long)]
        html: bool,
        /// Request method
        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// Start the worker, then dispatch fetch events
    Fetch {
        /// Root-relative paths to fetch, in order
        #[arg(required = true)]
        paths: Vec<String>,
        /// Built site directory
        #[arg(short, long, default_value = "dist")]
        site: PathBuf,
        /// Live origin to fetch from instead of a site directory
        #[arg(long, conflicts_with = "site")]
        origin: Option<Url>,
        /// Cut the network after install
        #[arg(long)]
        offline: bool,
        /// Send an HTML Accept header
        #[arg(long)]
        html: bool,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(LogConfig::from_verbosity(cli.verbose).with_format(format));

    let mut config = match cli.config {
        Some(ref path) => WorkerConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WorkerConfig::default(),
    };

    match cli.command {
        Commands::Install { site, origin } => {
            let network = open_network(&mut config, &site, origin)?;
            let worker = ServiceWorker::new(config, network)?;
            let (precache, activation) = worker.start().await?;

            println!(
                "Precached: {}{}",
                precache.cached.len(),
                if precache.is_complete() { "" } else { " (incomplete)" }
            );
            for (url, error) in &precache.failed {
                println!("  failed  {} ({})", url.path(), error);
            }
            println!("Deleted stale caches: {}", activation.deleted.len());
            print_cache_report(&worker).await;
        }

        Commands::Route { path, html, method } => {
            let worker = ServiceWorker::new(config, Arc::new(HttpFetcher::new()))?;
            let request = build_request(worker.config(), &path, html, &method)?;
            println!("{} {} -> {:?}", request.method, request.url, worker.router().classify(&request));
        }

        Commands::Fetch {
            paths,
            site,
            origin,
            offline,
            html,
        } => {
            let network = open_network(&mut config, &site, origin)?;
            let worker = ServiceWorker::new(config, network.clone())?;
            worker.start().await?;
            if offline {
                network.set_online(false);
            }

            for path in &paths {
                let request = build_request(worker.config(), path, html, "GET")?;
                let outcome = worker
                    .dispatch_and_settle(WorkerEvent::Fetch(request))
                    .await?;
                println!("{}", describe(path, &outcome));
            }
            print_cache_report(&worker).await;
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// The network the worker fetches through: a live origin when given (which
/// also becomes the worker's origin), the site directory otherwise.
fn open_network(
    config: &mut WorkerConfig,
    site: &Path,
    origin: Option<Url>,
) -> anyhow::Result<Arc<Connectivity>> {
    let inner: Arc<dyn Fetcher> = match origin {
        Some(origin) => {
            config.origin = origin;
            Arc::new(HttpFetcher::new())
        }
        None => Arc::new(DirFetcher::new(site)?),
    };
    Ok(Arc::new(Connectivity::new(inner)))
}

fn build_request(
    config: &WorkerConfig,
    path: &str,
    html: bool,
    method: &str,
) -> anyhow::Result<Request> {
    let url = config.resolve(path)?;
    let method = http::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method {method}"))?;

    let request = if html {
        Request {
            method,
            ..Request::navigate(url)
        }
    } else {
        Request::new(method, url)
    };
    Ok(request)
}

fn describe(path: &str, outcome: &EventOutcome) -> String {
    match outcome {
        EventOutcome::Responded(fetched) => format!(
            "{path}: {} from {:?} ({} bytes, {})",
            fetched.response.status.as_u16(),
            fetched.source,
            fetched.response.body.len(),
            fetched.response.content_type().unwrap_or("no content type")
        ),
        EventOutcome::FetchFailed(e) => format!("{path}: failed ({e})"),
        EventOutcome::Passthrough(reason) => format!("{path}: not intercepted ({reason:?})"),
        other => format!("{path}: {other:?}"),
    }
}

async fn print_cache_report(worker: &ServiceWorker) {
    println!("Caches:");
    for (name, entries) in worker.cache_report().await {
        println!("  {name:<28} {entries} entries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let config = WorkerConfig::default();

        let request = build_request(&config, "/lore/", true, "get").unwrap();
        assert_eq!(request.method, http::Method::GET);
        assert!(request.accepts_html());
        assert_eq!(request.url.as_str(), "http://localhost:4321/lore/");

        let post = build_request(&config, "/api", false, "POST").unwrap();
        assert_eq!(post.method, http::Method::POST);
        assert!(!post.accepts_html());
    }

    #[test]
    fn test_origin_and_site_conflict() {
        let cli = Cli::try_parse_from(["sw-sim", "install", "--origin", "https://saga.example/"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Install { origin: Some(ref origin), .. } if origin.as_str() == "https://saga.example/"
        ));

        let fetch = Cli::try_parse_from(["sw-sim", "fetch", "/", "--origin", "https://saga.example"])
            .unwrap();
        assert!(matches!(fetch.command, Commands::Fetch { origin: Some(_), .. }));

        assert!(Cli::try_parse_from([
            "sw-sim", "install", "--site", "dist", "--origin", "https://saga.example/",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["sw-sim", "install", "--origin", "not a url"]).is_err());
    }

    #[test]
    fn test_origin_becomes_worker_origin() {
        let mut config = WorkerConfig::default();
        let origin = Url::parse("https://saga.example/").unwrap();

        open_network(&mut config, Path::new("does-not-matter"), Some(origin.clone())).unwrap();

        assert_eq!(config.origin, origin);
        assert_eq!(
            config.static_urls().unwrap()[0].as_str(),
            "https://saga.example/"
        );
    }

    #[test]
    fn test_missing_site_directory_is_an_error() {
        let mut config = WorkerConfig::default();
        assert!(open_network(&mut config, Path::new("/definitely/not/a/site"), None).is_err());
        assert_eq!(config.origin, WorkerConfig::default().origin);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["sw-sim", "-vv", "fetch", "/", "/lore/", "--offline"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Fetch { ref paths, offline: true, .. } if paths.len() == 2
        ));
    }
}
