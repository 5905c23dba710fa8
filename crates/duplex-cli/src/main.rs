//! `duplexctl`: pack, inspect, query and watch routing-table blobs.

mod commands;
mod settings;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use duplex_config::DecodeLimits;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::commands::{CliResult, RouteQuery};
use crate::settings::WatchSettings;

#[derive(Parser)]
#[command(name = "duplexctl")]
#[command(about = "Operator tool for duplex routing-table blobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Scratch-arena sizing shared by the commands that decode a blob.
#[derive(Args)]
struct DecodeArgs {
    /// Bytes in the scratch arena the table is decoded into
    #[arg(long, default_value_t = 1024 * 1024)]
    arena_bytes: usize,

    /// Maximum number of services
    #[arg(long, default_value_t = 256)]
    max_services: u32,

    /// Maximum number of hosts
    #[arg(long, default_value_t = 256)]
    max_hosts: u32,
}

impl DecodeArgs {
    fn limits(&self) -> DecodeLimits {
        DecodeLimits::new(self.max_services, self.max_hosts)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a TOML routing description and publish it as a blob
    Pack {
        /// TOML routing description
        input: PathBuf,
        /// Blob file to write
        output: PathBuf,
        /// Version stamped on the blob
        #[arg(long)]
        version: u64,
        #[command(flatten)]
        decode: DecodeArgs,
    },
    /// Print the services and hosts in a blob
    Inspect {
        blob: PathBuf,
        #[command(flatten)]
        decode: DecodeArgs,
    },
    /// Resolve one request against a blob
    Route {
        blob: PathBuf,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "/")]
        path: String,
        /// Request tag; repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Point used to pick a weighted upstream
        #[arg(long, default_value_t = 0)]
        point: u64,
        #[command(flatten)]
        decode: DecodeArgs,
    },
    /// Keep a live slot pair refreshed from a blob file
    Watch {
        blob: PathBuf,
        /// TOML settings file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn main() -> CliResult {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Pack {
            input,
            output,
            version,
            decode,
        } => {
            let doc = commands::read_document(&input)?;
            commands::pack(
                &doc,
                &output,
                version,
                &decode.limits(),
                decode.arena_bytes,
                &mut out,
            )?;
        }
        Commands::Inspect { blob, decode } => {
            commands::inspect(&blob, &decode.limits(), decode.arena_bytes, &mut out)?;
        }
        Commands::Route {
            blob,
            host,
            path,
            tags,
            point,
            decode,
        } => {
            let query = RouteQuery {
                host: &host,
                path: &path,
                tags: &tags,
                point,
            };
            commands::route(&blob, &query, &decode.limits(), decode.arena_bytes, &mut out)?;
        }
        Commands::Watch {
            blob,
            config,
            seconds,
        } => {
            let settings = match config {
                Some(path) => WatchSettings::load(&path)?,
                None => WatchSettings::default(),
            };
            commands::watch(&blob, &settings, seconds.map(Duration::from_secs), &mut out)?;
        }
    }
    Ok(())
}
