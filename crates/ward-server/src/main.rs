//! Ward office letter service executable
//!
//! `serve` runs the HTTP API, `backup` copies the database and media files.

mod http;
mod middleware;

use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use ward_core::config::{CounterBackend, FailurePolicy};
use ward_core::document::FsDocumentArchive;
use ward_core::{
    notifier_from_config, paths, BackupRunner, CounterCache, FileLetterStore, LetterWorkflow,
    MemoryCounterCache, RateLimiter, RedisCounterCache, StaticDirectory, WardConfig,
};

fn cli() -> Command {
    Command::new("ward-server")
        .version("1.0.0")
        .about("Ward office letter service")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path [default: /app/config/ward.json]")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory for letter records, documents and the resident directory")
                .default_value("/data/ward")
                .global(true),
        )
        .arg(
            Arg::new("backups-dir")
                .long("backups-dir")
                .value_name("DIR")
                .help("Directory receiving backup folders")
                .default_value("/data/backups")
                .global(true),
        )
        .subcommand(
            Command::new("serve").about("Start the HTTP API").arg(
                Arg::new("bind")
                    .long("bind")
                    .value_name("ADDR")
                    .help("Listen address")
                    .default_value("0.0.0.0:8080"),
            ),
        )
        .subcommand(
            Command::new("backup")
                .about("Backup database and media files")
                .arg(
                    Arg::new("email")
                        .long("email")
                        .help("Send backup completion email to admins")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();

    let data_dir = string_arg(&matches, "data-dir")?;
    if let Err(e) = paths::init_data_root(data_dir.clone()) {
        log::warn!("Data root initialization warning: {}", e);
    }
    log::info!("Using data directory: {}", data_dir);

    let backups_dir = string_arg(&matches, "backups-dir")?;
    if let Err(e) = paths::init_backups_root(backups_dir.clone()) {
        log::warn!("Backups root initialization warning: {}", e);
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(paths::config_path);
    let config = WardConfig::from_file(&config_path).with_context(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;
    log::info!("Loaded configuration from {}", config_path.display());

    match matches.subcommand() {
        Some(("serve", sub)) => serve(config, &string_arg(sub, "bind")?).await,
        Some(("backup", sub)) => backup(config, sub.get_flag("email")).await,
        _ => anyhow::bail!("No action specified. Use --help for options."),
    }
}

fn string_arg(matches: &ArgMatches, name: &str) -> anyhow::Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("Missing argument --{}", name))
}

async fn serve(config: WardConfig, bind: &str) -> anyhow::Result<()> {
    for dir in paths::all_data_directories() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let counter_cache: Arc<dyn CounterCache> = match config.rate_limit.backend {
        CounterBackend::Memory => {
            log::warn!("Using in-process rate limit counters; limits are not shared between instances");
            Arc::new(MemoryCounterCache::new())
        }
        CounterBackend::Redis => {
            let url = config.rate_limit.redis_url.as_deref().unwrap_or_default();
            log::info!("Connecting rate limit counters to {}", url);
            match (RedisCounterCache::connect(url).await, config.rate_limit.failure_policy) {
                (Ok(cache), _) => Arc::new(cache),
                (Err(e), FailurePolicy::FailOpen) => {
                    log::warn!(
                        "Counter cache unreachable at startup ({}), admitting requests until it recovers",
                        e
                    );
                    Arc::new(RedisCounterCache::new(url)?)
                }
                (Err(e), FailurePolicy::FailClosed) => {
                    return Err(e).context("Counter cache unreachable and failure policy is fail_closed")
                }
            }
        }
    };
    let limiter = RateLimiter::new(counter_cache, config.rate_limit.failure_policy)
        .with_exempt_roles(config.rate_limit.exempt_roles.clone());

    let directory_path = paths::directory_path();
    let directory = if directory_path.exists() {
        StaticDirectory::from_file(&directory_path)?
    } else {
        log::warn!(
            "Resident directory {} not found, no resident can submit requests",
            directory_path.display()
        );
        StaticDirectory::default()
    };

    let store = FileLetterStore::new(paths::letters_dir())?;
    log::info!("Letter requests stored at {}", paths::letters_dir().display());

    let workflow = LetterWorkflow::new(
        Arc::new(store),
        Arc::new(directory),
        notifier_from_config(&config.mail, config.workflow.notification_timeout())?,
        Arc::new(FsDocumentArchive::new(paths::generated_letters_dir())?),
        &config,
    );

    let state = http::AppState {
        workflow: Arc::new(workflow),
        limiter: Arc::new(limiter),
        rate_limit: Arc::new(config.rate_limit.clone()),
    };

    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid listen address {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Ward letter service listening on http://{}", addr);

    axum::serve(
        listener,
        http::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn backup(config: WardConfig, email: bool) -> anyhow::Result<()> {
    let runner = BackupRunner::new(&config.storage, paths::backups_dir());

    let report = if email {
        let notifier = notifier_from_config(&config.mail, config.workflow.notification_timeout())?;
        runner.run_and_report(notifier.as_ref(), &config.mail.admins).await?
    } else {
        runner.run()?
    };

    log::info!(
        "Backup completed successfully: {} ({} files, {} old backups removed)",
        report.folder.display(),
        report.files_copied,
        report.pruned.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let matches = cli()
            .try_get_matches_from(["ward-server", "serve", "--bind", "127.0.0.1:9000"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "serve");
        assert_eq!(sub.get_one::<String>("bind").unwrap(), "127.0.0.1:9000");
        assert!(matches.get_one::<String>("config").is_none());

        let matches = cli()
            .try_get_matches_from(["ward-server", "backup", "--email", "--backups-dir", "/tmp/b"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "backup");
        assert!(sub.get_flag("email"));
        assert_eq!(sub.get_one::<String>("backups-dir").unwrap(), "/tmp/b");
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(cli().try_get_matches_from(["ward-server"]).is_err());
    }
}
