//! Command line argument parsing

use crate::config::SiftConfig;
use crate::decode::layers::Encoding;
use crate::error::SiftError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Decode obfuscated page content and resolve media sources
#[derive(Parser, Debug)]
#[command(name = "streamsift", author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// JSON configuration file; flags below override it
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Per-detector timeout (e.g., 5s, 1500ms)
    #[arg(long, global = true, value_name = "DURATION")]
    pub probe_timeout: Option<humantime::Duration>,

    /// Ciphertext fetch timeout (e.g., 15s)
    #[arg(long, global = true, value_name = "DURATION")]
    pub fetch_timeout: Option<humantime::Duration>,

    /// Override User-Agent header
    #[arg(long, global = true, value_name = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply an explicit chain of decode layers, outermost first
    Decode {
        /// Comma separated layers: base64, base64url, hex, url, rot13, reverse, unpack
        #[arg(short, long, value_delimiter = ',', required = true)]
        chain: Vec<Encoding>,

        /// Text to decode, or '-' for stdin
        input: String,
    },

    /// Guess and peel encoding layers until the text stops changing
    AutoDecode {
        /// Maximum number of layers to peel
        #[arg(long, default_value = "8")]
        max_depth: usize,

        /// Text to decode, or '-' for stdin
        input: String,
    },

    /// Unpack a P.A.C.K.E.R. script
    Unpack {
        /// Script file, or '-' for stdin
        input: String,
    },

    /// Find, unpack and mine every packed script in an HTML document
    Harvest {
        /// HTML file, or '-' for stdin
        input: String,
    },

    /// Decrypt AES-128-CBC hex ciphertext against candidate IVs
    Decrypt {
        /// 16 character key
        #[arg(long)]
        key: String,

        /// Candidate IV (16 characters or 32 hex digits); repeat in trial order
        #[arg(long = "iv", required = true, value_name = "IV")]
        ivs: Vec<String>,

        /// Hex ciphertext
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        hex: Option<String>,

        /// Endpoint returning the hex ciphertext
        #[arg(long)]
        url: Option<String>,
    },

    /// Scan an HTML document for media sources without a browser
    Scan {
        /// HTML file, or '-' for stdin
        input: String,

        /// URL the document was served from, for resolving relative sources
        #[arg(long, value_name = "URL")]
        page_url: Option<String>,
    },
}

impl Args {
    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Get probe timeout as Duration, if given
    pub fn probe_timeout_duration(&self) -> Option<Duration> {
        self.probe_timeout.map(Into::into)
    }

    /// Get fetch timeout as Duration, if given
    pub fn fetch_timeout_duration(&self) -> Option<Duration> {
        self.fetch_timeout.map(Into::into)
    }

    /// Build the effective configuration: file first, then flags
    pub fn load_config(&self) -> Result<SiftConfig, SiftError> {
        let mut config = match &self.config {
            Some(path) => SiftConfig::from_file(path)?,
            None => SiftConfig::default(),
        };
        if let Some(timeout) = self.probe_timeout_duration() {
            config = config.with_probe_timeout(timeout);
        }
        if let Some(timeout) = self.fetch_timeout_duration() {
            config = config.with_fetch_timeout(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

impl VerbosityLevel {
    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode_chain_parsing() {
        let args =
            Args::try_parse_from(["streamsift", "decode", "--chain", "base64,rot13", "abc"])
                .unwrap();
        assert_eq!(
            args.command,
            Command::Decode {
                chain: vec![Encoding::Base64, Encoding::Rot13],
                input: "abc".to_string(),
            }
        );
        assert!(
            Args::try_parse_from(["streamsift", "decode", "--chain", "base99", "abc"]).is_err()
        );
        assert!(Args::try_parse_from(["streamsift", "decode", "abc"]).is_err());
    }

    #[test]
    fn test_decrypt_requires_a_ciphertext_source() {
        let ok = Args::try_parse_from([
            "streamsift", "decrypt", "--key", "0123456789abcdef", "--iv", "a", "--iv", "b", "--hex", "00",
        ])
        .unwrap();
        match ok.command {
            Command::Decrypt { ivs, hex, url, .. } => {
                assert_eq!(ivs, vec!["a", "b"]);
                assert_eq!(hex.as_deref(), Some("00"));
                assert!(url.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(
            Args::try_parse_from(["streamsift", "decrypt", "--key", "k", "--iv", "a"]).is_err()
        );
        assert!(Args::try_parse_from([
            "streamsift", "decrypt", "--key", "k", "--iv", "a", "--hex", "00", "--url", "https://x.example/",
        ])
        .is_err());
    }

    #[test]
    fn test_args_verbosity_level() {
        let args = Args::try_parse_from(["streamsift", "unpack", "-"]).unwrap();
        assert_eq!(args.verbosity_level(), VerbosityLevel::Normal);

        let args = Args::try_parse_from(["streamsift", "unpack", "-", "--quiet"]).unwrap();
        assert_eq!(args.verbosity_level(), VerbosityLevel::Quiet);
        assert_eq!(args.verbosity_level().log_filter(), "error");

        let args = Args::try_parse_from(["streamsift", "-v", "harvest", "page.html"]).unwrap();
        assert_eq!(args.verbosity_level(), VerbosityLevel::Verbose);
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"probeTimeout": "2s", "fallbackWindow": 5000}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::try_parse_from([
            "streamsift", "scan", "page.html", "--config", &path, "--fetch-timeout", "30s",
        ])
        .unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.fallback_window, 5000);

        let args =
            Args::try_parse_from(["streamsift", "scan", "page.html", "--probe-timeout", "250ms"])
                .unwrap();
        assert_eq!(args.load_config().unwrap().probe_timeout, Duration::from_millis(250));
    }
}
