use clap::{Parser, Subcommand};
use stem2chart::{Config, StemToChart};
use std::path::PathBuf;
use tracing::info;

/// Stem-to-Chart Conversion System
#[derive(Parser)]
#[command(name = "stem2chart")]
#[command(about = "Turn isolated drum stems into a tempo-mapped .chart note section")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect hits in a song directory and write the chart
    Convert {
        /// Song directory with kick-/snare-/drums-other- stems and a notes.chart
        dir: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output chart file name (relative to the song directory)
        #[arg(short, long)]
        output: Option<String>,

        /// Name of the note section to append
        #[arg(long)]
        section: Option<String>,

        /// Also write the JSON analysis report
        #[arg(long)]
        report: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Quiet output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            dir,
            config,
            output,
            section,
            report,
            verbose,
            quiet,
        } => {
            if verbose && quiet {
                anyhow::bail!("Cannot specify both --verbose and --quiet");
            }

            init_logging(match (verbose, quiet) {
                (true, _) => "debug",
                (_, true) => "warn",
                _ => "info",
            });

            // Load configuration
            let mut config = if let Some(config_path) = config {
                stem2chart::config::load_config(config_path)?
            } else {
                Config::default()
            };

            if let Some(output) = output {
                config.export.output_file = output;
            }
            if let Some(section) = section {
                config.export.section_name = section;
            }
            config.export.write_report |= report;

            let processor = StemToChart::new(config)?;

            info!("Processing {}...", dir.display());
            let conversion = processor.process(&dir)?;

            info!(
                "Wrote {} notes to {}",
                conversion.notes.len(),
                processor.output_path(&dir).display()
            );
        }
        Commands::ValidateConfig { config } => {
            let config = stem2chart::config::load_config(config)?;
            println!("Configuration is valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
