//! js-playground - run JavaScript snippets in an isolated sandbox.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use common::{Job, Language};
use js_sandbox::{Sandbox, SandboxConfig};
use playground::Renderer;

/// js-playground - run JavaScript in an isolated sandbox
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source file to run (reads stdin when omitted or "-")
    file: Option<PathBuf>,

    /// Language of the source
    #[arg(short, long, default_value = "javascript")]
    language: String,

    /// Nesting depth at which values collapse
    #[arg(long, default_value_t = js_sandbox::config::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Wall-clock limit in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Engine loop iteration limit
    #[arg(long)]
    loop_limit: Option<u64>,

    /// Print records as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn sandbox_config(&self) -> SandboxConfig {
        let mut config = SandboxConfig::default().with_max_depth(self.max_depth);
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(limit) = self.loop_limit {
            config = config.with_loop_iteration_limit(limit);
        }
        config
    }

    fn read_source(&self) -> Result<String> {
        match &self.file {
            Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            _ => {
                let mut source = String::new();
                std::io::stdin()
                    .read_to_string(&mut source)
                    .context("failed to read stdin")?;
                Ok(source)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout only carries records
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!("js-playground v{}", playground::VERSION);

    let language: Language = args.language.parse()?;
    let source = args.read_source()?;
    let job = Job::new(source).with_language(language);

    let sandbox = Sandbox::new(args.sandbox_config());
    let records = sandbox.run(job).await;

    let renderer = Renderer::from_json_flag(args.json);
    for record in &records {
        println!("{}", renderer.render(record)?);
    }

    let faulted = records.iter().any(|record| record.is_fault());
    info!("{} record(s){}", records.len(), if faulted { ", run faulted" } else { "" });

    if faulted {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::parse_from(["js-playground"]);
        assert!(args.file.is_none());
        assert_eq!(args.language, "javascript");
        assert_eq!(args.max_depth, 10);
        assert!(!args.json);
    }

    #[test]
    fn test_args_with_file() {
        let args = Args::parse_from(["js-playground", "snippet.js", "--json"]);
        assert_eq!(args.file, Some(PathBuf::from("snippet.js")));
        assert!(args.json);
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "js-playground",
            "--max-depth",
            "3",
            "--timeout-ms",
            "250",
            "--loop-limit",
            "1000",
        ]);
        let config = args.sandbox_config();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.loop_iteration_limit, Some(1000));
    }

    #[test]
    fn test_unknown_language_rejected() {
        let args = Args::parse_from(["js-playground", "--language", "python"]);
        assert!(args.language.parse::<Language>().is_err());
    }
}
