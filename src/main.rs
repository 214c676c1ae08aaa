//! Standalone proxy pool refresher.
//!
//! Bootstraps the pool (validating saved proxies, fetching more when needed),
//! prints the result and optionally keeps the pool topped up in the background.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use log::{info, warn};
use smart_proxy_pool::{
    BootstrapPrompt, BootstrapStatus, CapabilityClass, FallbackChoice, ProxyPool, ProxyPoolConfig,
    SourceRegistry, UserChoice,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about = "Maintains a pool of validated HTTP/SSL proxies", long_about = None)]
struct Args {
    /// Minimum working proxies needed.
    #[arg(long, env = "PROXY_POOL_MIN_PROXIES", default_value_t = 3)]
    min_proxies: usize,

    /// Proxy validation timeout in seconds.
    #[arg(long, env = "PROXY_POOL_TIMEOUT", default_value_t = 15)]
    timeout: u64,

    /// Concurrency hint. Accepted for compatibility and logged; probes are not capped by it.
    #[arg(long, env = "PROXY_POOL_WORKERS", default_value_t = 10)]
    workers: usize,

    /// Maximum pages fetched from paginated sources.
    #[arg(long, env = "PROXY_POOL_MAX_PAGES", default_value_t = 10)]
    max_pages: usize,

    /// JSON file holding the saved pools.
    #[arg(long, env = "PROXY_POOL_CACHE_FILE", default_value = "saved-proxies.json")]
    cache_file: PathBuf,

    /// Test and keep plain HTTP proxies too.
    #[arg(long, env = "PROXY_POOL_NO_SSL")]
    no_ssl: bool,

    /// Print the source configuration and exit.
    #[arg(long)]
    show_sources: bool,

    /// Enable a source for this run (see --show-sources for names).
    #[arg(long, value_name = "SOURCE_NAME")]
    enable_source: Vec<String>,

    /// Disable a source for this run.
    #[arg(long, value_name = "SOURCE_NAME")]
    disable_source: Vec<String>,

    /// Flip a source's enabled flag for this run.
    #[arg(long, value_name = "SOURCE_NAME")]
    toggle_source: Vec<String>,

    /// Disable sources that often block scrapers.
    #[arg(long)]
    disable_blocked: bool,

    /// Never prompt; fetch when proxies are missing.
    #[arg(long, env = "PROXY_POOL_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Keep the pool topped up in the background until Ctrl-C.
    #[arg(long)]
    maintain: bool,
}

impl Args {
    fn sources(&self) -> Result<SourceRegistry> {
        let mut sources = SourceRegistry::builtin();
        for key in &self.enable_source {
            sources.enable(key)?;
        }
        for key in &self.disable_source {
            sources.disable(key)?;
        }
        for key in &self.toggle_source {
            sources.toggle(key)?;
        }
        if self.disable_blocked {
            sources.disable_often_blocked();
        }
        Ok(sources)
    }

    fn config(&self, sources: SourceRegistry) -> ProxyPoolConfig {
        ProxyPoolConfig::builder()
            .sources(sources)
            .min_working_proxies(self.min_proxies)
            .validation_timeout(Duration::from_secs(self.timeout))
            .max_workers(self.workers)
            .max_pages_per_source(self.max_pages)
            .cache_file(self.cache_file.clone())
            .ssl_only(!self.no_ssl)
            .build()
    }
}

/// Asks the bootstrap questions on the terminal.
struct TerminalPrompt {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalPrompt {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Show `menu` until one of `answers` is typed. `None` on EOF or Ctrl-C.
    async fn ask(&self, menu: &str, answers: &[&str]) -> Option<usize> {
        let mut lines = self.lines.lock().await;
        let mut stdout = tokio::io::stdout();
        loop {
            stdout.write_all(menu.as_bytes()).await.ok()?;
            stdout.flush().await.ok()?;

            let line = tokio::select! {
                line = lines.next_line() => line.ok()??,
                _ = tokio::signal::ctrl_c() => return None,
            };
            if let Some(idx) = answers.iter().position(|a| *a == line.trim()) {
                return Some(idx);
            }
            println!("Please enter one of: {}", answers.join(", "));
        }
    }
}

#[async_trait]
impl BootstrapPrompt for TerminalPrompt {
    async fn choose(&self, min_working_proxies: usize) -> Option<UserChoice> {
        let menu = format!(
            "\nNo working proxies available (need {min_working_proxies})\n\
             1. Continue without proxies (faster, but may get blocked)\n\
             2. Wait for proxy fetching (slower, but more reliable)\n\
             3. Exit and try again later\n\
             Enter your choice (1/2/3): "
        );
        let choice = self.ask(&menu, &["1", "2", "3"]).await?;
        Some([UserChoice::ProceedWithout, UserChoice::FetchAndWait, UserChoice::Abort][choice])
    }

    async fn choose_after_empty_fetch(&self) -> Option<FallbackChoice> {
        let menu = "\nNo working proxies found after fetching\n\
                    1. Continue without proxies\n\
                    2. Exit and try again later\n\
                    Enter your choice (1/2): ";
        let choice = self.ask(menu, &["1", "2"]).await?;
        Some([FallbackChoice::ProceedWithout, FallbackChoice::Abort][choice])
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let sources = match args.sources() {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(1);
        }
    };

    if args.show_sources {
        println!("{}", sources.status());
        return ExitCode::SUCCESS;
    }

    let config = args.config(sources);
    info!(
        "SSL-only mode: {}, min working proxies: {}, validation timeout: {}s, max pages: {}, workers: {}",
        config.ssl_only,
        config.min_working_proxies,
        config.validation_timeout.as_secs(),
        config.max_pages_per_source,
        config.max_workers
    );
    let cache_file = config.cache_file.clone();
    let pool = ProxyPool::new(config);

    let interactive = !args.non_interactive && std::io::stdin().is_terminal();
    let terminal = TerminalPrompt::new();
    let prompt: Option<&dyn BootstrapPrompt> = if interactive { Some(&terminal) } else { None };
    let report = pool.bootstrap(prompt).await;

    let stats = pool.get_stats();
    println!("\nStatus: {}", report);
    println!("Working proxies: {} SSL, {} HTTP", stats.ssl_count, stats.http_count);
    println!("Dead proxies: {}", stats.dead_count);
    println!("Saved to: {}", cache_file.display());
    for class in [CapabilityClass::Ssl, CapabilityClass::Http] {
        for (i, endpoint) in pool.endpoints(class).iter().enumerate() {
            println!("  {:2}. [{}] {}", i + 1, class, endpoint);
        }
    }

    if args.maintain && matches!(report.status, BootstrapStatus::Ready | BootstrapStatus::Insufficient) {
        let mut handle = pool.start_maintenance();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping maintenance"),
            _ = handle.finished() => {}
        }
        let cycles = handle.stop().await;
        info!("Maintenance ran {} cycles; pool holds {}", cycles, pool.get_stats().total());
    }

    match report.status {
        BootstrapStatus::Ready | BootstrapStatus::NoProxies => ExitCode::SUCCESS,
        BootstrapStatus::Insufficient => {
            warn!("Pool is below the minimum of {}", args.min_proxies);
            ExitCode::from(2)
        }
        BootstrapStatus::Exit => ExitCode::from(3),
    }
}
