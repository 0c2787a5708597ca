//! Main entry point for the streamsift CLI

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use streamsift::cli::{Args, Command, OutputFormatter, VerbosityLevel};
use streamsift::decode::aes::{AesResolver, CiphertextSource, IvCandidate};
use streamsift::decode::{auto_decode, packer, DecodePipeline};
use streamsift::harvest::PackedScriptHarvester;
use streamsift::media::{HttpFetcher, Scanner};
use streamsift::{SiftConfig, SiftError};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    init_logging(args.verbosity_level());
    debug!("Starting streamsift with args: {:?}", args);

    let config = args.load_config().context("Failed to load configuration")?;
    let formatter = OutputFormatter::new(args.verbosity_level(), args.json);

    match &args.command {
        Command::Decode { chain, input } => {
            let text = read_text(input)?;
            let result =
                DecodePipeline::new(chain.clone()).run(text.trim_end_matches(['\r', '\n']));
            formatter.print_decode(&result, chain)?;
        }
        Command::AutoDecode { max_depth, input } => {
            let text = read_text(input)?;
            let result = auto_decode(text.trim(), *max_depth);
            formatter.print_auto_decode(&result)?;
        }
        Command::Unpack { input } => {
            let source = read_file(input)?;
            match packer::try_unpack(&source) {
                Ok(unpacked) => {
                    if args.json {
                        formatter.print_json(&serde_json::json!({ "unpacked": unpacked }))?;
                    } else {
                        println!("{}", unpacked);
                    }
                }
                Err(reason) => {
                    // Same contract as the library: hand back the input untouched
                    formatter.warning(&format!("not unpacked: {}", reason));
                    if args.json {
                        formatter.print_json(&serde_json::json!({ "unpacked": source }))?;
                    } else {
                        print!("{}", source);
                    }
                }
            }
        }
        Command::Harvest { input } => {
            let html = read_file(input)?;
            let result = PackedScriptHarvester::from_config(&config).harvest(&html);
            formatter.print_harvest(&result)?;
        }
        Command::Decrypt { key, ivs, hex, url } => {
            handle_decrypt(&config, &formatter, key, ivs, hex.as_deref(), url.as_deref()).await?;
        }
        Command::Scan { input, page_url } => {
            let html = read_file(input)?;
            let result = Scanner::new(config.clone()).scan_html(&html, page_url.as_deref());
            formatter.print_scan(&result)?;
            if !result.success {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

/// Handle the decrypt subcommand
async fn handle_decrypt(
    config: &SiftConfig,
    formatter: &OutputFormatter,
    key: &str,
    ivs: &[String],
    hex: Option<&str>,
    url: Option<&str>,
) -> Result<()> {
    let candidates = ivs
        .iter()
        .map(|iv| IvCandidate::parse(iv))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Invalid IV candidate")?;
    let resolver = AesResolver::new(key, candidates).context("Invalid key")?;

    let source = match (hex, url) {
        (Some(hex), _) => CiphertextSource::Literal(hex.to_string()),
        (None, Some(url)) => CiphertextSource::Fetch(url.to_string()),
        (None, None) => anyhow::bail!("either --hex or --url is required"),
    };
    let fetcher = HttpFetcher::from_config(config).context("Failed to build HTTP client")?;

    match resolver.resolve(&source, &fetcher, config.fetch_timeout).await {
        Ok(decrypted) => {
            info!("Decryption succeeded with IV {}", decrypted.iv);
            formatter.print_decrypted(&decrypted)?;
            Ok(())
        }
        Err(SiftError::DecryptionFailed { attempts }) => {
            formatter.print_decryption_failure(&attempts)?;
            std::process::exit(1);
        }
        Err(e) => Err(e).context("Decryption failed"),
    }
}

/// Read a literal argument, or stdin when it is '-'
fn read_text(input: &str) -> Result<String> {
    if input == "-" {
        read_stdin()
    } else {
        Ok(input.to_string())
    }
}

/// Read a file, or stdin when the path is '-'
fn read_file(input: &str) -> Result<String> {
    if input == "-" {
        read_stdin()
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) {
    // RUST_LOG wins over the verbosity flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
