//! Output formatting for human and JSON modes

use crate::cli::args::VerbosityLevel;
use crate::decode::aes::{DecryptedSource, DecryptionAttempt};
use crate::decode::layers::{AutoDecodeResult, DecodeResult, Encoding};
use crate::harvest::HarvestResult;
use crate::media::{AggregateResult, DetectorStatus};
use colored::Colorize;
use serde::Serialize;

/// Output formatter for streamsift
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    json: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel, json: bool) -> Self {
        Self { verbosity, json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print any serialisable value as pretty JSON
    pub fn print_json<T: Serialize>(&self, value: &T) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet && !self.json {
            eprintln!("{} {}", "info:".blue().bold(), message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet && !self.json {
            eprintln!("{} {}", "✔".green().bold(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    /// Print a decode result; the decoded text always goes to stdout
    pub fn print_decode(
        &self,
        result: &DecodeResult,
        chain: &[Encoding],
    ) -> serde_json::Result<()> {
        if self.json {
            return self.print_json(result);
        }
        println!("{}", result.output);
        if self.verbosity == VerbosityLevel::Verbose {
            self.info(&format!("chain: {}", format_chain(chain)));
        }
        if result.is_likely_url {
            self.success("output looks like a URL");
        }
        Ok(())
    }

    pub fn print_auto_decode(&self, result: &AutoDecodeResult) -> serde_json::Result<()> {
        if self.json {
            return self.print_json(result);
        }
        println!("{}", result.result.output);
        if result.applied_chain.is_empty() {
            self.warning("no encoding layer recognised");
        } else {
            self.info(&format!("peeled: {}", format_chain(&result.applied_chain)));
        }
        Ok(())
    }

    pub fn print_harvest(&self, result: &HarvestResult) -> serde_json::Result<()> {
        if self.json {
            return self.print_json(result);
        }
        if result.is_empty() {
            self.warning(&format!(
                "no packed script unpacked ({} candidate block(s))",
                result.blocks_found
            ));
            return Ok(());
        }
        self.success(&format!(
            "unpacked {} of {} block(s)",
            result.unpacked_scripts.len(),
            result.blocks_found
        ));
        for url in &result.extracted_urls {
            if result.stream_urls.contains(url) {
                println!("{} {}", "stream".green(), url);
            } else {
                println!("{} {}", "url   ".dimmed(), url);
            }
        }
        if self.verbosity == VerbosityLevel::Verbose {
            for (index, script) in result.unpacked_scripts.iter().enumerate() {
                println!("{}", format!("--- script {} ---", index + 1).dimmed());
                println!("{}", script);
            }
        }
        Ok(())
    }

    pub fn print_decrypted(&self, result: &DecryptedSource) -> serde_json::Result<()> {
        if self.json {
            return self.print_json(result);
        }
        self.success(&format!(
            "decrypted with IV {} after {} attempt(s)",
            result.iv,
            result.attempts.len()
        ));
        match &result.extracted_url {
            Some(url) if result.is_stream_url => println!("{} {}", "stream".green(), url),
            Some(url) => println!("{} {}", "url".cyan(), url),
            None => println!("{}", result.plaintext),
        }
        Ok(())
    }

    /// Report every failed IV trial
    pub fn print_decryption_failure(
        &self,
        attempts: &[DecryptionAttempt],
    ) -> serde_json::Result<()> {
        if self.json {
            return self.print_json(&serde_json::json!({
                "success": false,
                "attempts": attempts,
            }));
        }
        self.error(&format!("none of {} IV candidate(s) worked", attempts.len()));
        for attempt in attempts {
            eprintln!("  {} {}", "✘".red(), attempt.iv_candidate);
        }
        Ok(())
    }

    pub fn print_scan(&self, result: &AggregateResult) -> serde_json::Result<()> {
        if self.json {
            return self.print_json(result);
        }
        match &result.player_type_detected {
            Some(player) => self.info(&format!("player: {}", player.bold())),
            None => self.info("player: none recognised"),
        }
        for source in &result.sources {
            let label = source
                .quality_label
                .as_deref()
                .map(|label| format!(" [{}]", label))
                .unwrap_or_default();
            println!(
                "{:<12} {:<15} {}{}",
                source.source_tag.to_string().cyan(),
                source.media_kind.to_string(),
                source.url,
                label
            );
        }
        if self.verbosity == VerbosityLevel::Verbose {
            for report in &result.detectors {
                let status = match report.status {
                    DetectorStatus::Ok => "ok".green(),
                    DetectorStatus::Empty => "empty".normal(),
                    DetectorStatus::TimedOut => "timed out".yellow(),
                    DetectorStatus::Failed => "failed".red(),
                    DetectorStatus::Skipped => "skipped".dimmed(),
                };
                eprintln!("  {:<14} {} ({} ms)", report.name, status, report.elapsed_ms);
            }
        }
        if result.success {
            self.success(&format!("{} source(s)", result.counts.total));
        } else {
            self.warning("no media sources found");
        }
        Ok(())
    }
}

fn format_chain(chain: &[Encoding]) -> String {
    chain
        .iter()
        .map(|encoding| encoding.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
