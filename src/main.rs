//! `sv-bencher` main executable.

pub mod bench;
pub mod common;
pub mod trf;

use clap::{Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Structural variant comparison and annotation",
    long_about = "Benchmark structural variant call sets and annotate tandem repeats"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Benchmark a comparison call set against a baseline truth set.
    Bench(bench::Args),
    /// Annotate variants in tandem repeat regions.
    Trf(trf::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // `--debug` on a sub command overrides the global verbosity.
    let force_debug = match &cli.command {
        Commands::Bench(args) => args.debug,
        Commands::Trf(args) => args.debug,
    };

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if force_debug {
            tracing::Level::DEBUG
        } else {
            match cli.common.verbose.log_level() {
                Some(level) => match level {
                    log::Level::Error => tracing::Level::ERROR,
                    log::Level::Warn => tracing::Level::WARN,
                    log::Level::Info => tracing::Level::INFO,
                    log::Level::Debug => tracing::Level::DEBUG,
                    log::Level::Trace => tracing::Level::TRACE,
                },
                None => tracing::Level::INFO,
            }
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    let result = tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Bench(args) => {
                bench::run(&cli.common, args)?;
            }
            Commands::Trf(args) => {
                trf::run(&cli.common, args)?;
            }
        }

        Ok::<(), anyhow::Error>(())
    });

    if let Err(err) = result {
        if err.downcast_ref::<common::ParamsError>().is_some() {
            eprintln!("Couldn't run sv-bencher. Please fix parameters.");
            std::process::exit(100);
        }
        return Err(err);
    }
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
