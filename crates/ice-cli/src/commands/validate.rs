//! `ice validate`: parse a configuration and report the mesh it builds.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ice_types::config::ModelConfig;
use tracing::info;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let text = args.config.to_string_lossy();
    let config = ModelConfig::from_file(&text)
        .with_context(|| format!("{} is not a valid configuration", args.config.display()))?;
    let mesh = config.create_mesh();
    info!(
        name = %config.name,
        vertices = mesh.n_vertices(),
        cells = mesh.n_cells(),
        calving_sides = ?config.domain.calving_sides,
        formulation = %config.momentum.formulation,
        controls = ?config.inversion.controls,
        "configuration ok"
    );
    Ok(())
}
