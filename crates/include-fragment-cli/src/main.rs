//! include-fragment — entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use include_fragment_cli::{read_input, write_output, Flags, ResolveConfig, Resolver};

#[derive(Parser)]
#[command(
    name = "include-fragment",
    about = "Expand <include-fragment> placeholders in static HTML",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every placeholder and splice the fragments into the document.
    Resolve {
        /// Input HTML file ("-" or omitted for stdin).
        input: Option<PathBuf>,

        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base URL for relative src values.
        /// Also reads from INCLUDE_FRAGMENT_BASE_URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Accept value for placeholders without an accept attribute.
        /// Also reads from INCLUDE_FRAGMENT_ACCEPT.
        #[arg(long)]
        accept: Option<String>,

        /// Per-request timeout in milliseconds.
        /// Also reads from INCLUDE_FRAGMENT_TIMEOUT_MS.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Rounds of nested placeholder expansion.
        /// Also reads from INCLUDE_FRAGMENT_MAX_DEPTH.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Print a JSON report of every placeholder to stderr.
        #[arg(long)]
        report: bool,

        /// Exit with status 1 if any placeholder failed.
        #[arg(long)]
        strict: bool,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   include-fragment completions bash > ~/.local/share/bash-completion/completions/include-fragment
    ///   include-fragment completions zsh > ~/.zfunc/_include-fragment
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve {
            input,
            output,
            base_url,
            accept,
            timeout_ms,
            max_depth,
            report,
            strict,
        } => {
            let config = ResolveConfig::from_env(&Flags {
                accept,
                timeout_ms,
                base_url,
                max_depth,
            })?;
            tracing::debug!("config: {config:?}");

            let markup = read_input(input.as_deref()).await?;
            let resolution = Resolver::new(config).resolve(&markup).await;
            write_output(output.as_deref(), &resolution.html).await?;

            tracing::info!(
                "resolved {} placeholder(s) in {} round(s), {} failed",
                resolution.elements.len(),
                resolution.rounds,
                resolution.errored()
            );

            if report {
                eprintln!("{}", serde_json::to_string_pretty(&resolution.elements)?);
            }

            if strict && resolution.has_errors() {
                eprintln!("{} placeholder(s) failed", resolution.errored());
                std::process::exit(1);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "include-fragment", &mut std::io::stdout());
        }
    }

    Ok(())
}
