//! `ice sample`: draws from the Laplacian prior `N(0, A⁻¹ M A⁻¹)`.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ice_core::prior::build_prior;
use ndarray::Array2;
use ndarray_npy::NpzWriter;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::scenario::SourceArgs;

#[derive(Args, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Number of samples
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Mass weight δ; taken from the configuration when absent
    #[arg(long)]
    pub delta: Option<f64>,

    /// Stiffness weight γ; taken from the configuration when absent
    #[arg(long)]
    pub gamma: Option<f64>,

    /// Output archive; samples are stored row-wise under `samples`
    #[arg(short, long, default_value = "prior_samples.npz")]
    pub output: PathBuf,
}

pub fn execute(args: SampleArgs) -> Result<()> {
    let config = args.source.config()?;
    let mesh = config.create_mesh();
    let delta = args.delta.unwrap_or(config.prior.delta);
    let gamma = args.gamma.unwrap_or(config.prior.gamma);
    let prior = build_prior(&mesh, delta, gamma, &config.prior).context("building prior")?;

    let mut rng = match args.source.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let nv = mesh.n_vertices();
    let mut samples = Array2::<f64>::zeros((args.count, nv));
    for (k, mut row) in samples.rows_mut().into_iter().enumerate() {
        let draw = prior.sample_with_rng(&mut rng).with_context(|| format!("sample {k}"))?;
        row.assign(&ndarray::ArrayView1::from(&draw[..]));
    }
    let rms = (samples.iter().map(|v| v * v).sum::<f64>() / samples.len().max(1) as f64).sqrt();
    info!(count = args.count, delta, gamma, rms, "prior samples drawn");

    let file = File::create(&args.output).with_context(|| format!("creating {}", args.output.display()))?;
    let mut npz = NpzWriter::new_compressed(file);
    npz.add_array("samples", &samples)?;
    npz.finish()?;
    info!(path = %args.output.display(), "samples written");
    Ok(())
}
