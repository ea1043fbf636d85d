//! `ice forward`: one momentum solve.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ice_core::io::write_fields;
use ice_core::solver::{solve, solve_with_rng};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tracing::info;

use crate::scenario::SourceArgs;

#[derive(Args, Debug)]
pub struct ForwardArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output archive with the fields and the velocity solution
    #[arg(short, long, default_value = "forward.npz")]
    pub output: PathBuf,

    /// Optional JSON summary of the solve
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

pub fn execute(args: ForwardArgs) -> Result<()> {
    let setup = args.source.setup()?;
    let (velocity, report) = match args.source.seed {
        Some(seed) => solve_with_rng(&setup.mesh, &setup.fields, &setup.config, &mut StdRng::seed_from_u64(seed)),
        None => solve(&setup.mesh, &setup.fields, &setup.config),
    }
    .context("forward solve failed")?;

    info!(
        converged = report.converged,
        iterations = report.iterations,
        residual = report.residual,
        max_speed = velocity.max_speed(),
        elapsed_ms = report.solve_time_ms,
        "forward solve finished"
    );

    write_fields(&args.output, &setup.fields, Some(&velocity))
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(path = %args.output.display(), "solution written");

    if let Some(path) = &args.summary {
        super::write_summary(
            path,
            &json!({
                "name": setup.config.name,
                "converged": report.converged,
                "iterations": report.iterations,
                "residual": report.residual,
                "initial_residual": report.initial_residual,
                "linear_iterations": report.linear_iterations,
                "max_speed": velocity.max_speed(),
                "solve_time_ms": report.solve_time_ms,
            }),
        )?;
    }
    Ok(())
}
