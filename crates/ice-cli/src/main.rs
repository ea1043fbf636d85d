// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Command Line Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `ice`: forward solves, drag/stiffness inversions and prior sampling
//! on the synthetic domains or on fields read from an `.npz` archive.

mod commands;
mod scenario;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ice")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Shallow-shelf ice-flow solver and inversion driver", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the momentum balance once
    Forward(commands::forward::ForwardArgs),
    /// Recover log-drag and/or log-stiffness from velocity observations
    Invert(commands::invert::InvertArgs),
    /// Draw samples from the Laplacian prior
    Sample(commands::sample::SampleArgs),
    /// Load and check a configuration file
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Forward(args) => commands::forward::execute(args),
        Commands::Invert(args) => commands::invert::execute(args),
        Commands::Sample(args) => commands::sample::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
