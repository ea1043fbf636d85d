// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Field Persistence
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Named-array `.npz` archives of a field set and, optionally, a
//! velocity solution.

use std::fs::File;
use std::path::Path;

use ice_types::error::{IceError, IceResult};
use ice_types::state::{ModelFields, VelocityField, VelocityObservations};
use ndarray::Array1;
use ndarray_npy::{NpzReader, NpzWriter};

const OBSERVATION_KEYS: [&str; 5] = ["u_obs", "v_obs", "u_std", "v_std", "obs_mask"];

/// Write `fields` (and `velocity`, when given) to a compressed archive.
pub fn write_fields(path: &Path, fields: &ModelFields, velocity: Option<&VelocityField>) -> IceResult<()> {
    let file = File::create(path)?;
    let mut npz = NpzWriter::new_compressed(file);
    let mut add = |key: &str, array: &Array1<f64>| {
        npz.add_array(key, array)
            .map_err(|e| IceError::Persistence(format!("failed to write {key} to npz: {e}")))
    };

    add("bed", &fields.bed)?;
    add("thickness", &fields.thickness)?;
    add("mask", &fields.mask)?;
    add("alpha", &fields.alpha)?;
    add("beta", &fields.beta)?;
    add("bmelt", &fields.bmelt)?;
    add("smb", &fields.smb)?;
    if let Some(obs) = &fields.observations {
        add("u_obs", &obs.u_obs)?;
        add("v_obs", &obs.v_obs)?;
        add("u_std", &obs.u_std)?;
        add("v_std", &obs.v_std)?;
        add("obs_mask", &obs.obs_mask)?;
    }
    if let Some(u) = velocity {
        add("velocity", &u.values)?;
    }

    npz.finish()
        .map_err(|e| IceError::Persistence(format!("failed to finish npz '{}': {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "fields written");
    Ok(())
}

fn read_array1(npz: &mut NpzReader<File>, key: &str) -> IceResult<Array1<f64>> {
    npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix1>(&format!("{key}.npy"))
        .or_else(|_| npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix1>(key))
        .map_err(|e| IceError::Persistence(format!("failed to read {key} from npz: {e}")))
}

fn contains(names: &[String], key: &str) -> bool {
    names.iter().any(|n| n == key || n.strip_suffix(".npy") == Some(key))
}

/// Read an archive written by [`write_fields`]. Observations are present
/// only when all five observation arrays are.
pub fn read_fields(path: &Path) -> IceResult<(ModelFields, Option<VelocityField>)> {
    let file = File::open(path)?;
    let mut npz = NpzReader::new(file)
        .map_err(|e| IceError::Persistence(format!("failed to open npz '{}': {e}", path.display())))?;
    let names = npz
        .names()
        .map_err(|e| IceError::Persistence(format!("failed to list npz '{}': {e}", path.display())))?;

    let observations = if OBSERVATION_KEYS.iter().all(|k| contains(&names, k)) {
        Some(VelocityObservations {
            u_obs: read_array1(&mut npz, "u_obs")?,
            v_obs: read_array1(&mut npz, "v_obs")?,
            u_std: read_array1(&mut npz, "u_std")?,
            v_std: read_array1(&mut npz, "v_std")?,
            obs_mask: read_array1(&mut npz, "obs_mask")?,
        })
    } else {
        None
    };

    let fields = ModelFields {
        bed: read_array1(&mut npz, "bed")?,
        thickness: read_array1(&mut npz, "thickness")?,
        mask: read_array1(&mut npz, "mask")?,
        alpha: read_array1(&mut npz, "alpha")?,
        beta: read_array1(&mut npz, "beta")?,
        bmelt: read_array1(&mut npz, "bmelt")?,
        smb: read_array1(&mut npz, "smb")?,
        observations,
    };
    let velocity = if contains(&names, "velocity") {
        Some(VelocityField {
            values: read_array1(&mut npz, "velocity")?,
        })
    } else {
        None
    };
    Ok((fields, velocity))
}
