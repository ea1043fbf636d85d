//! `ice invert`: adjoint inversion for log-drag and/or log-stiffness.
//!
//! Without observations in the field source, runs a twin experiment:
//! the source fields are solved forward, the velocity is perturbed with
//! Gaussian noise and the inversion starts from a uniform drag.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ice_core::inversion::{invert, invert_with_rng};
use ice_core::io::write_fields;
use ice_core::solver::solve_with_rng;
use ice_core::synthetic::{noisy_observations, observations_from_velocity, STREAM_LOG_DRAG};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tracing::{info, warn};

use crate::scenario::SourceArgs;

#[derive(Args, Debug)]
pub struct InvertArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Standard deviation of synthetic observations [m/yr]
    #[arg(long, default_value = "1.0")]
    pub noise: f64,

    /// First-guess log-drag of a twin experiment
    #[arg(long, default_value_t = STREAM_LOG_DRAG)]
    pub initial_alpha: f64,

    /// Output archive with the recovered fields and velocity
    #[arg(short, long, default_value = "inversion.npz")]
    pub output: PathBuf,

    /// Optional JSON summary including the functional trace
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

pub fn execute(args: InvertArgs) -> Result<()> {
    let setup = args.source.setup()?;
    let mut fields = setup.fields;
    let mut rng = match args.source.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    if fields.observations.is_none() {
        let observations = match &setup.velocity {
            Some(velocity) => {
                info!("observations taken from the archived velocity");
                observations_from_velocity(&setup.mesh, velocity, args.noise)?
            }
            None => {
                warn!(noise = args.noise, "no observations given, running a twin experiment");
                let (truth, _) = solve_with_rng(&setup.mesh, &fields, &setup.config, &mut rng)
                    .context("solving the synthetic truth")?;
                let obs = noisy_observations(&setup.mesh, &truth, args.noise, &mut rng)?;
                fields.alpha = Array1::from_elem(setup.mesh.n_vertices(), args.initial_alpha);
                obs
            }
        };
        fields.observations = Some(observations);
    }

    let result = match args.source.seed {
        Some(_) => invert_with_rng(&setup.mesh, &fields, &setup.config, &mut rng),
        None => invert(&setup.mesh, &fields, &setup.config),
    }
    .context("inversion failed")?;

    info!(
        j = result.breakdown.total,
        misfit = result.breakdown.misfit,
        regularization = result.breakdown.regularization,
        iterations = result.iterations,
        evaluations = result.trace.len(),
        stop = ?result.stop,
        elapsed_ms = result.elapsed_ms,
        "inversion done"
    );

    fields.alpha = result.alpha.clone();
    fields.beta = result.beta.clone();
    write_fields(&args.output, &fields, Some(&result.velocity))
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(path = %args.output.display(), "recovered fields written");

    if let Some(path) = &args.summary {
        super::write_summary(
            path,
            &json!({
                "name": setup.config.name,
                "stop": format!("{:?}", result.stop),
                "iterations": result.iterations,
                "misfit": result.breakdown.misfit,
                "regularization": result.breakdown.regularization,
                "total": result.breakdown.total,
                "trace": result.trace,
                "iterate_trace": result.iterate_trace,
                "forward_converged": result.forward_report.converged,
                "elapsed_ms": result.elapsed_ms,
            }),
        )?;
    }
    Ok(())
}
