// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Seconds in a (365-day) year. Velocities are in m/yr throughout.
pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Density of ice (kg/m^3)
pub const RHO_ICE: f64 = 917.0;

/// Density of sea water (kg/m^3)
pub const RHO_SEAWATER: f64 = 1030.0;

/// Gravitational acceleration (m/s^2)
pub const GRAVITY: f64 = 9.81;

/// Glen flow-law exponent
pub const GLEN_N: f64 = 3.0;

/// Glen rate factor (Pa^-3 yr^-1), 3.5e-25 Pa^-3 s^-1 converted to years.
pub const GLEN_A: f64 = 3.5e-25 * SECONDS_PER_YEAR;

/// Strain-rate floor added to the effective strain rate squared (yr^-1).
pub const STRAIN_RATE_FLOOR: f64 = 1.0e-5;

/// Probe offset and zero tolerance of the margin boundary predicate.
pub const MARGIN_PROBE_TOL: f64 = 1.0e-2;

/// Mask values above this are ice.
pub const ICE_MASK_TOL: f64 = 1.0e-6;
