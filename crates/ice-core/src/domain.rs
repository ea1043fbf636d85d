// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Domain Classifier
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Cell and facet labels, the floating/grounded switch and the margin
//! boundary predicate that pins velocity outside the ice.

use ice_types::config::PhysicsParams;
use ice_types::mesh::{DomainSide, TriMesh};
use ice_types::state::ModelFields;
use ndarray::Array1;

/// Region tag of one cell. Assigned once at model setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellRegion {
    NoIce,
    FloatingIce,
    GroundedIce,
    FloatingIceObserved,
    GroundedIceObserved,
}

impl CellRegion {
    pub fn is_ice(self) -> bool {
        self != CellRegion::NoIce
    }

    pub fn is_grounded(self) -> bool {
        matches!(
            self,
            CellRegion::GroundedIce | CellRegion::GroundedIceObserved
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            CellRegion::FloatingIce | CellRegion::FloatingIceObserved
        )
    }

    pub fn is_observed(self) -> bool {
        matches!(
            self,
            CellRegion::FloatingIceObserved | CellRegion::GroundedIceObserved
        )
    }
}

/// Boundary-condition tag of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetTag {
    Default,
    /// Domain wall touching ice: zero velocity.
    LateralNoFlow,
    /// Ice/ocean interface: hydrostatic pressure balance.
    Terminus,
    /// Ice edge on land inside the domain.
    InteriorNoFlow,
}

/// Hard floating/grounded switch: ice floats when its thickness does not
/// exceed the flotation thickness.
#[inline]
pub fn is_floating(thickness: f64, flotation_thickness: f64) -> bool {
    thickness <= flotation_thickness
}

/// Cell and facet labels of one model.
#[derive(Debug, Clone)]
pub struct DomainLabels {
    pub cells: Vec<CellRegion>,
    pub facets: Vec<FacetTag>,
}

impl DomainLabels {
    /// Label cells from mask, flotation and observation coverage, then
    /// tag the edges of the ice region.
    pub fn classify(
        mesh: &TriMesh,
        fields: &ModelFields,
        physics: &PhysicsParams,
        calving_sides: &[DomainSide],
    ) -> Self {
        let bed = fields.bed.to_vec();
        let thick = fields.thickness.to_vec();

        let cells: Vec<CellRegion> = (0..mesh.n_cells())
            .map(|c| {
                if fields.mask[c] <= physics.ice_mask_tol {
                    return CellRegion::NoIce;
                }
                let h = mesh.cell_mean(c, &thick);
                let hs = physics.flotation_thickness(mesh.cell_mean(c, &bed));
                let observed = fields
                    .observations
                    .as_ref()
                    .map(|o| o.obs_mask[c] > 0.0)
                    .unwrap_or(false);
                match (is_floating(h, hs), observed) {
                    (true, false) => CellRegion::FloatingIce,
                    (true, true) => CellRegion::FloatingIceObserved,
                    (false, false) => CellRegion::GroundedIce,
                    (false, true) => CellRegion::GroundedIceObserved,
                }
            })
            .collect();

        let facets = mesh
            .edges()
            .iter()
            .map(|e| match e.neighbor {
                None => {
                    if !cells[e.cell].is_ice() {
                        FacetTag::Default
                    } else if e.side.map(|s| calving_sides.contains(&s)).unwrap_or(false) {
                        FacetTag::Terminus
                    } else {
                        FacetTag::LateralNoFlow
                    }
                }
                Some(nb) => {
                    let (a, b) = (cells[e.cell].is_ice(), cells[nb].is_ice());
                    if a == b {
                        return FacetTag::Default;
                    }
                    let dry = if a { nb } else { e.cell };
                    if mesh.cell_mean(dry, &bed) < 0.0 {
                        FacetTag::Terminus
                    } else {
                        FacetTag::InteriorNoFlow
                    }
                }
            })
            .collect();

        DomainLabels { cells, facets }
    }

    pub fn count(&self, region: CellRegion) -> usize {
        self.cells.iter().filter(|&&r| r == region).count()
    }

    pub fn ice_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_ice())
            .map(|(c, _)| c)
    }

    /// Vertices touching at least one ice cell.
    pub fn active_vertices(&self, mesh: &TriMesh) -> Vec<bool> {
        let mut active = vec![false; mesh.n_vertices()];
        for c in self.ice_cells() {
            for v in mesh.cell(c) {
                active[v] = true;
            }
        }
        active
    }
}

/// Pointwise predicate marking points whose neighbourhood carries no ice.
///
/// Holds its own copy of the mask, so later mask edits do not leak in.
/// Every hit is recorded for diagnostics.
#[derive(Debug, Clone)]
pub struct MarginPredicate<'m> {
    mesh: &'m TriMesh,
    mask: Vec<f64>,
    tol: f64,
    boundary_points: Vec<[f64; 2]>,
    hits: usize,
}

impl<'m> MarginPredicate<'m> {
    pub fn new(mesh: &'m TriMesh, mask: &Array1<f64>, tol: f64) -> Self {
        MarginPredicate {
            mesh,
            mask: mask.to_vec(),
            tol,
            boundary_points: Vec::new(),
            hits: 0,
        }
    }

    /// Mask at `p`; points outside the domain read as ice-free.
    fn mask_at(&self, p: [f64; 2]) -> f64 {
        self.mesh.cell_value(&self.mask, p).unwrap_or(0.0)
    }

    /// True when the mask at `p` and at the four probes `p ± tol` along
    /// each axis all lie within `tol` of zero.
    pub fn inside(&mut self, p: [f64; 2]) -> bool {
        let t = self.tol;
        let probes = [
            p,
            [p[0] + t, p[1]],
            [p[0] - t, p[1]],
            [p[0], p[1] + t],
            [p[0], p[1] - t],
        ];
        let max = probes
            .iter()
            .map(|&q| self.mask_at(q))
            .fold(f64::NEG_INFINITY, f64::max);
        let hit = max.abs() <= t;
        if hit {
            self.boundary_points.push(p);
            self.hits += 1;
        }
        hit
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn boundary_points(&self) -> &[[f64; 2]] {
        &self.boundary_points
    }
}

/// Degrees of freedom held at zero velocity.
#[derive(Debug, Clone)]
pub struct DirichletSet {
    /// One flag per velocity dof (`2 * vertex + component`).
    pub constrained: Vec<bool>,
    pub lateral_vertices: usize,
    pub margin_vertices: usize,
    pub inactive_vertices: usize,
}

impl DirichletSet {
    pub fn n_constrained(&self) -> usize {
        self.constrained.iter().filter(|&&c| c).count()
    }

    /// Zero the constrained entries of a dof vector.
    pub fn apply_zero(&self, values: &mut [f64]) {
        for (v, &c) in values.iter_mut().zip(&self.constrained) {
            if c {
                *v = 0.0;
            }
        }
    }
}

/// Collect zero-velocity conditions: lateral no-flow walls, vertices the
/// margin predicate marks as ice-free, and vertices touching no ice.
pub fn dirichlet_dofs(
    mesh: &TriMesh,
    labels: &DomainLabels,
    mask: &Array1<f64>,
    probe_tol: f64,
) -> DirichletSet {
    let nv = mesh.n_vertices();
    let mut pinned = vec![false; nv];

    let mut lateral = vec![false; nv];
    for (e, tag) in mesh.edges().iter().zip(&labels.facets) {
        if *tag == FacetTag::LateralNoFlow {
            lateral[e.vertices[0]] = true;
            lateral[e.vertices[1]] = true;
        }
    }

    let mut predicate = MarginPredicate::new(mesh, mask, probe_tol);
    let mut margin = 0;
    for (v, p) in mesh.vertices().iter().enumerate() {
        if predicate.inside(*p) {
            pinned[v] = true;
            margin += 1;
        }
    }

    let active = labels.active_vertices(mesh);
    let mut inactive = 0;
    for v in 0..nv {
        if lateral[v] {
            pinned[v] = true;
        }
        if !active[v] {
            pinned[v] = true;
            inactive += 1;
        }
    }

    tracing::debug!(
        lateral = lateral.iter().filter(|&&l| l).count(),
        margin,
        inactive,
        "Dirichlet conditions collected"
    );

    DirichletSet {
        constrained: pinned.iter().flat_map(|&p| [p, p]).collect(),
        lateral_vertices: lateral.iter().filter(|&&l| l).count(),
        margin_vertices: predicate.hits(),
        inactive_vertices: inactive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ice_types::state::VelocityObservations;

    fn disk_mask(mesh: &TriMesh, cx: f64, cy: f64, r: f64) -> Array1<f64> {
        mesh.cellwise_from_fn(|x, y| {
            if (x - cx).hypot(y - cy) < r {
                1.0
            } else {
                0.0
            }
        })
        .into()
    }

    #[test]
    fn test_floating_switch_is_hard() {
        assert!(is_floating(100.0, 100.0));
        assert!(is_floating(99.9, 100.0));
        assert!(!is_floating(100.0 + 1e-12, 100.0));
        assert!(!is_floating(10.0, -5.0));
    }

    #[test]
    fn test_margin_predicate_disk() {
        let mesh = TriMesh::rectangle(0.0, 10.0, 0.0, 10.0, 40, 40);
        let mask = disk_mask(&mesh, 5.0, 5.0, 3.0);
        let mut pred = MarginPredicate::new(&mesh, &mask, 1e-2);

        // Ice at the centre and just inside the rim
        assert!(!pred.inside([5.0, 5.0]));
        assert!(!pred.inside([5.0 + 2.5, 5.0]));
        // Ice-free cell just outside the rim; the west probe lands in ice
        let outside_rim = [8.005, 5.1];
        assert_eq!(mask[mesh.locate(outside_rim).unwrap()], 0.0);
        assert!(mask[mesh.locate([7.995, 5.1]).unwrap()] > 0.0);
        assert!(!pred.inside(outside_rim));
        // Same cell, every probe ice-free
        assert!(pred.inside([8.1, 5.1]));
        // Open water and outside the domain
        assert!(pred.inside([9.0, 9.0]));
        assert!(pred.inside([0.5, 5.0]));
        assert!(pred.inside([-3.0, 5.0]));
        assert!(pred.inside([50.0, 50.0]));

        assert_eq!(pred.hits(), pred.boundary_points().len());
        assert_eq!(pred.hits(), 5);
        assert!(pred.boundary_points().contains(&[9.0, 9.0]));
    }

    #[test]
    fn test_margin_predicate_copies_mask() {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, 4, 4);
        let mut mask = Array1::ones(mesh.n_cells());
        let mut pred = MarginPredicate::new(&mesh, &mask, 1e-2);
        mask.fill(0.0);
        assert!(!pred.inside([0.5, 0.5]));
        assert_eq!(pred.hits(), 0);
    }

    #[test]
    fn test_classify_regions_and_facets() {
        // Grounded upstream half (bed above flotation), floating downstream.
        let mesh = TriMesh::rectangle(0.0, 4.0, 0.0, 2.0, 4, 2);
        let physics = PhysicsParams::default();
        let mut fields = ModelFields::uniform(&mesh, &physics, -500.0, 400.0, 0.0);
        for (v, p) in mesh.vertices().iter().enumerate() {
            if p[0] < 2.0 {
                fields.bed[v] = -100.0;
            }
        }
        // Last column of rectangles is open ocean
        for c in 0..mesh.n_cells() {
            if mesh.centroid(c)[0] > 3.0 {
                fields.mask[c] = 0.0;
            }
        }
        let labels = DomainLabels::classify(&mesh, &fields, &physics, &[]);

        for c in 0..mesh.n_cells() {
            let x = mesh.centroid(c)[0];
            let r = labels.cells[c];
            if x > 3.0 {
                assert_eq!(r, CellRegion::NoIce);
            } else if x < 1.0 {
                assert_eq!(r, CellRegion::GroundedIce);
            } else if x > 2.0 {
                assert_eq!(r, CellRegion::FloatingIce);
            }
        }

        let mut terminus_length = 0.0;
        for (e, tag) in mesh.edges().iter().zip(&labels.facets) {
            if *tag == FacetTag::Terminus {
                terminus_length += e.length;
                let mid_x = 0.5 * (mesh.vertex(e.vertices[0])[0] + mesh.vertex(e.vertices[1])[0]);
                assert!((mid_x - 3.0).abs() < 1e-12);
            }
            if e.side == Some(DomainSide::West) {
                assert_eq!(*tag, FacetTag::LateralNoFlow);
            }
        }
        assert!((terminus_length - 2.0).abs() < 1e-12);
        assert_eq!(labels.count(CellRegion::NoIce), 4);
    }

    #[test]
    fn test_classify_accepts_reversed_layout() {
        let mesh = TriMesh::rectangle(0.0, 4.0, 0.0, 2.0, 4, 2);
        let physics = PhysicsParams::default();
        let mut fields = ModelFields::uniform(&mesh, &physics, -500.0, 400.0, 0.0);
        for (v, p) in mesh.vertices().iter().enumerate() {
            fields.bed[v] = -100.0 - 150.0 * p[0];
        }
        let expected = DomainLabels::classify(&mesh, &fields, &physics, &[DomainSide::East]);

        // Same values stored back to front
        let mut reversed = fields.clone();
        for field in [&mut reversed.bed, &mut reversed.thickness] {
            let mut flipped: Array1<f64> = field.iter().rev().cloned().collect();
            flipped.invert_axis(ndarray::Axis(0));
            assert!(flipped.as_slice().is_none());
            *field = flipped;
        }
        assert_eq!(reversed.bed, fields.bed);

        let labels = DomainLabels::classify(&mesh, &reversed, &physics, &[DomainSide::East]);
        assert_eq!(labels.cells, expected.cells);
        assert_eq!(labels.facets, expected.facets);
        assert!(labels.cells.iter().any(|r| r.is_floating()));
        assert!(labels.cells.iter().any(|r| r.is_grounded()));
    }

    #[test]
    fn test_interior_margin_on_land_is_no_flow() {
        let mesh = TriMesh::rectangle(0.0, 2.0, 0.0, 1.0, 2, 1);
        let physics = PhysicsParams::default();
        let mut fields = ModelFields::uniform(&mesh, &physics, 50.0, 100.0, 0.0);
        fields.mask[2] = 0.0;
        fields.mask[3] = 0.0;
        let labels = DomainLabels::classify(&mesh, &fields, &physics, &[DomainSide::East]);
        assert!(labels.facets.contains(&FacetTag::InteriorNoFlow));
        assert!(!labels.facets.contains(&FacetTag::Terminus));
    }

    #[test]
    fn test_calving_side_and_observed_cells() {
        let mesh = TriMesh::rectangle(0.0, 2.0, 0.0, 1.0, 2, 1);
        let physics = PhysicsParams::default();
        let mut fields = ModelFields::uniform(&mesh, &physics, -800.0, 300.0, 0.0);
        let nv = mesh.n_vertices();
        let mut obs_mask = Array1::zeros(mesh.n_cells());
        obs_mask[0] = 1.0;
        fields.observations = Some(VelocityObservations {
            u_obs: Array1::zeros(nv),
            v_obs: Array1::zeros(nv),
            u_std: Array1::ones(nv),
            v_std: Array1::ones(nv),
            obs_mask,
        });
        let labels = DomainLabels::classify(&mesh, &fields, &physics, &[DomainSide::East]);
        assert_eq!(labels.cells[0], CellRegion::FloatingIceObserved);
        assert_eq!(labels.cells[1], CellRegion::FloatingIce);
        for (e, tag) in mesh.edges().iter().zip(&labels.facets) {
            match e.side {
                Some(DomainSide::East) => assert_eq!(*tag, FacetTag::Terminus),
                Some(_) => assert_eq!(*tag, FacetTag::LateralNoFlow),
                None => assert_eq!(*tag, FacetTag::Default),
            }
        }
    }

    #[test]
    fn test_dirichlet_pins_walls_and_open_water() {
        let mesh = TriMesh::rectangle(0.0, 4.0, 0.0, 4.0, 4, 4);
        let physics = PhysicsParams::default();
        let mut fields = ModelFields::uniform(&mesh, &physics, -100.0, 500.0, 0.0);
        for c in 0..mesh.n_cells() {
            if mesh.centroid(c)[0] > 2.0 {
                fields.mask[c] = 0.0;
            }
        }
        let labels = DomainLabels::classify(&mesh, &fields, &physics, &[]);
        let bcs = dirichlet_dofs(&mesh, &labels, &fields.mask, physics.margin_probe_tol);

        let free_vertex = |v: usize| !bcs.constrained[2 * v] && !bcs.constrained[2 * v + 1];
        // Interior ice vertex is free
        assert!(free_vertex(6));
        // Ice-front vertex (2, 2) inside the domain stays free
        assert!(free_vertex(12));
        // West wall and open water are pinned
        assert!(!free_vertex(5));
        assert!(!free_vertex(9));
        assert!(bcs.inactive_vertices > 0);
        assert_eq!(bcs.constrained.len(), 2 * mesh.n_vertices());
    }
}
