//! SeqPort - command-line client for the SeqPort sequencing platform.

use clap::{Parser, Subcommand};
use seqport::api::{render_json, ApiClient, ApiError};
use seqport::config::ClientConfig;
use seqport::upload::{upload_files, UploadError, UploadOptions, DEFAULT_CONCURRENCY};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const BAD_AUTH_MSG: &str = "\nYour login credentials appear to be bad. Try logging out:\n    seqport logout\n\nAnd then logging back in:\n    seqport login\n";

const SUPPORT_MSG: &str = "Please contact support@seqport.bio for assistance.";

/// SeqPort - upload sequencing data and query platform resources
#[derive(Parser, Debug)]
#[command(name = "seqport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter directive (e.g. warn, info, seqport=debug)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload raw input files to the platform
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Maximum simultaneous uploads
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        max_threads: usize,

        /// Upload files one at a time, in input order
        #[arg(long)]
        sequential: bool,
    },

    /// List samples, or fetch specific samples by UUID
    Samples {
        uuids: Vec<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List analyses, or fetch specific analyses by UUID
    Analyses {
        uuids: Vec<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Download raw analysis data to this path (single UUID only)
        #[arg(long)]
        raw: Option<PathBuf>,

        /// Fetch table data (single UUID only)
        #[arg(long)]
        table: bool,
    },

    /// List references, or fetch specific references by UUID
    References {
        uuids: Vec<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Store an API key for later invocations
    Login {
        /// API key from your account settings page
        #[arg(long)]
        api_key: String,
    },

    /// Remove stored credentials
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence; the flag is the fallback directive.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Login { api_key } => {
            let path = seqport::auth::store(&api_key)?;
            println!("Credentials written to {}", path.display());
            return Ok(());
        }
        Command::Logout => {
            if seqport::auth::clear()? {
                println!("Logged out.");
            } else {
                println!("No stored credentials.");
            }
            return Ok(());
        }
        command => {
            let config = ClientConfig::from_env()?;
            let credentials = seqport::auth::load()?;
            run(command, config, credentials).await?;
        }
    }

    Ok(())
}

async fn run(
    command: Command,
    config: ClientConfig,
    credentials: seqport::Credentials,
) -> anyhow::Result<()> {
    match command {
        Command::Upload {
            files,
            max_threads,
            sequential,
        } => {
            if max_threads != DEFAULT_CONCURRENCY && !sequential {
                println!("Uploading with up to {max_threads} threads.");
            }
            let options = UploadOptions {
                concurrency_limit: max_threads,
                enable_concurrency: !sequential,
            };
            match upload_files(&config, &credentials, &files, options).await {
                Ok(report) if report.all_succeeded() => {}
                Ok(report) => {
                    for (path, error) in &report.failed {
                        eprintln!("Failed to upload {}: {error}", path.display());
                    }
                    for path in &report.cancelled {
                        eprintln!("Skipped {}", path.display());
                    }
                    eprintln!("{SUPPORT_MSG}");
                    std::process::exit(1);
                }
                Err(UploadError::AuthenticationFailed) => {
                    eprintln!("{BAD_AUTH_MSG}");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("{e}");
                    eprintln!("{SUPPORT_MSG}");
                    std::process::exit(1);
                }
            }
        }

        Command::Samples { uuids, pretty } => {
            let client = ApiClient::new(config, credentials)?;
            print_resources(&client, "samples", &uuids, pretty).await?;
        }

        Command::References { uuids, pretty } => {
            let client = ApiClient::new(config, credentials)?;
            print_resources(&client, "references", &uuids, pretty).await?;
        }

        Command::Analyses {
            uuids,
            pretty,
            raw,
            table,
        } => {
            if raw.is_some() && table {
                anyhow::bail!("Can only request raw or table data at the same time.");
            }
            let client = ApiClient::new(config.clone(), credentials)?;
            if let Some(dest) = raw {
                if uuids.len() != 1 {
                    anyhow::bail!("Can only request raw data on one Analysis at a time.");
                }
                let url = config.endpoint(&format!("analyses/{}/raw", uuids[0]))?;
                let target = run_api(client.download_file(url, &dest)).await?;
                println!("Successfully downloaded to {}", target.display());
            } else if table {
                if uuids.len() != 1 {
                    anyhow::bail!("Can only request table data on one Analysis at a time.");
                }
                let value = run_api(client.get("analyses", &uuids[0], "/table")).await?;
                println!("{}", render_json(&value, pretty));
            } else {
                print_resources(&client, "analyses", &uuids, pretty).await?;
            }
        }

        // Login and Logout are handled before credential loading.
        Command::Login { .. } | Command::Logout => unreachable!(),
    }

    Ok(())
}

async fn print_resources(
    client: &ApiClient,
    route: &str,
    uuids: &[String],
    pretty: bool,
) -> anyhow::Result<()> {
    if uuids.is_empty() {
        let value = run_api(client.list(route)).await?;
        println!("{}", render_json(&value, pretty));
    } else {
        for uuid in uuids {
            let value = run_api(client.get(route, uuid, "")).await?;
            println!("{}", render_json(&value, pretty));
        }
    }
    Ok(())
}

/// Await an API call, mapping bad credentials to the re-login message.
async fn run_api<T>(
    fut: impl std::future::Future<Output = Result<T, ApiError>>,
) -> anyhow::Result<T> {
    match fut.await {
        Ok(value) => Ok(value),
        Err(ApiError::AuthenticationFailed) => {
            eprintln!("{BAD_AUTH_MSG}");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
