//! Configuration and field sources shared by the subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use ice_core::io::read_fields;
use ice_core::synthetic::{ice_shelf_channel, ice_stream, uniform_slab};
use ice_types::config::{DomainConfig, ModelConfig};
use ice_types::mesh::{DomainSide, TriMesh};
use ice_types::state::{ModelFields, VelocityField};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Flat-bed slab of uniform thickness
    Slab,
    /// Grounded stream with a sticky drag patch
    Stream,
    /// Channel ending in a floating tongue
    Shelf,
}

impl Scenario {
    /// Default domain for runs without `--config`.
    fn default_config(self) -> ModelConfig {
        let (name, x_max, y_max, nx, ny, calving) = match self {
            Scenario::Slab => ("uniform-slab", 10_000.0, 10_000.0, 16, 16, Vec::new()),
            Scenario::Stream => ("ice-stream", 6000.0, 6000.0, 16, 16, Vec::new()),
            Scenario::Shelf => ("shelf-channel", 40_000.0, 10_000.0, 32, 8, vec![DomainSide::East]),
        };
        let mut cfg = ModelConfig {
            name: name.to_string(),
            domain: DomainConfig {
                x_min: 0.0,
                x_max,
                y_min: 0.0,
                y_max,
                nx,
                ny,
                calving_sides: calving,
            },
            physics: Default::default(),
            momentum: Default::default(),
            solver: Default::default(),
            inversion: Default::default(),
            prior: Default::default(),
        };
        cfg.solver.max_iterations = 100;
        cfg
    }

    pub fn fields(self, mesh: &TriMesh, config: &ModelConfig) -> ModelFields {
        match self {
            Scenario::Slab => uniform_slab(mesh, &config.physics, -400.0, 500.0, 1000f64.ln()),
            Scenario::Stream => ice_stream(mesh, &config.physics),
            Scenario::Shelf => ice_shelf_channel(mesh, &config.physics),
        }
    }
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Synthetic geometry used when no field archive is given
    #[arg(short, long, value_enum, default_value = "stream")]
    pub scenario: Scenario,

    /// Field archive (.npz) replacing the synthetic geometry
    #[arg(short, long)]
    pub fields: Option<PathBuf>,

    /// Seed of the random initial guess; system entropy when absent
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Resolved run inputs.
pub struct Setup {
    pub config: ModelConfig,
    pub mesh: TriMesh,
    pub fields: ModelFields,
    pub velocity: Option<VelocityField>,
}

fn load_config(path: &Path) -> Result<ModelConfig> {
    let text = path.to_string_lossy();
    ModelConfig::from_file(&text).with_context(|| format!("loading config {}", path.display()))
}

impl SourceArgs {
    pub fn config(&self) -> Result<ModelConfig> {
        match &self.config {
            Some(path) => load_config(path),
            None => Ok(self.scenario.default_config()),
        }
    }

    pub fn setup(&self) -> Result<Setup> {
        let config = self.config()?;
        let mesh = config.create_mesh();
        let (fields, velocity) = match &self.fields {
            Some(path) => {
                read_fields(path).with_context(|| format!("reading fields {}", path.display()))?
            }
            None => (self.scenario.fields(&mesh, &config), None),
        };
        fields
            .validate(&mesh)
            .context("fields do not match the configured mesh")?;
        let source = match &self.fields {
            Some(path) => path.display().to_string(),
            None => format!("{:?}", self.scenario),
        };
        info!(
            name = %config.name,
            vertices = mesh.n_vertices(),
            cells = mesh.n_cells(),
            source = %source,
            "run set up"
        );
        Ok(Setup {
            config,
            mesh,
            fields,
            velocity,
        })
    }
}
