// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Mesh
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Structured triangulation of a rectangle with P1 geometry.
//!
//! Each of the `nx * ny` rectangles is cut along its lower-left to
//! upper-right diagonal:
//!
//! ```text
//!  v01 ------ v11
//!   |  T1   /  |
//!   |     /    |
//!   |   /  T0  |
//!  v00 ------ v10
//! ```
//!
//! Vertices are numbered row-major (`j * (nx + 1) + i`), rectangle `r`
//! holds cells `2r` (T0) and `2r + 1` (T1). Both triangles are stored
//! counter-clockwise.

use serde::{Deserialize, Serialize};

/// Side of the rectangular domain a boundary edge lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainSide {
    West,
    East,
    South,
    North,
}

/// Mesh edge with its adjacent cells.
#[derive(Debug, Clone)]
pub struct Edge {
    pub vertices: [usize; 2],
    /// First adjacent cell; `normal` points out of it.
    pub cell: usize,
    /// Second adjacent cell, `None` on the domain boundary.
    pub neighbor: Option<usize>,
    /// Unit normal pointing out of `cell`.
    pub normal: [f64; 2],
    pub length: f64,
    /// Domain side for boundary edges.
    pub side: Option<DomainSide>,
}

impl Edge {
    pub fn is_boundary(&self) -> bool {
        self.neighbor.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct TriMesh {
    pub nx: usize,
    pub ny: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub dx: f64,
    pub dy: f64,
    vertices: Vec<[f64; 2]>,
    cells: Vec<[usize; 3]>,
    gradients: Vec<[[f64; 2]; 3]>,
    cell_area: f64,
    edges: Vec<Edge>,
    vertex_neighbors: Vec<Vec<usize>>,
}

impl TriMesh {
    /// Triangulate `[x_min, x_max] x [y_min, y_max]` with `nx * ny`
    /// rectangles.
    pub fn rectangle(x_min: f64, x_max: f64, y_min: f64, y_max: f64, nx: usize, ny: usize) -> Self {
        let nx = nx.max(1);
        let ny = ny.max(1);
        let dx = (x_max - x_min) / nx as f64;
        let dy = (y_max - y_min) / ny as f64;

        let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push([x_min + i as f64 * dx, y_min + j as f64 * dy]);
            }
        }

        let vid = |i: usize, j: usize| j * (nx + 1) + i;
        let mut cells = Vec::with_capacity(2 * nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                cells.push([vid(i, j), vid(i + 1, j), vid(i + 1, j + 1)]);
                cells.push([vid(i, j), vid(i + 1, j + 1), vid(i, j + 1)]);
            }
        }

        let gradients = cells
            .iter()
            .map(|c| basis_gradients(vertices[c[0]], vertices[c[1]], vertices[c[2]]))
            .collect();
        let cell_area = 0.5 * dx * dy;

        let diag = (dx * dx + dy * dy).sqrt();
        let mut edges = Vec::with_capacity(3 * nx * ny + nx + ny);
        for j in 0..ny {
            for i in 0..nx {
                let r = j * nx + i;
                let t0 = 2 * r;
                let t1 = 2 * r + 1;

                edges.push(Edge {
                    vertices: [vid(i, j), vid(i + 1, j + 1)],
                    cell: t0,
                    neighbor: Some(t1),
                    normal: [-dy / diag, dx / diag],
                    length: diag,
                    side: None,
                });

                // bottom edge: T0 here, T1 of the rectangle below
                let below = (j > 0).then(|| 2 * ((j - 1) * nx + i) + 1);
                edges.push(Edge {
                    vertices: [vid(i, j), vid(i + 1, j)],
                    cell: t0,
                    neighbor: below,
                    normal: [0.0, -1.0],
                    length: dx,
                    side: below.is_none().then_some(DomainSide::South),
                });

                // right edge: T0 here, T1 of the rectangle to the right
                let right = (i + 1 < nx).then(|| 2 * (j * nx + i + 1) + 1);
                edges.push(Edge {
                    vertices: [vid(i + 1, j), vid(i + 1, j + 1)],
                    cell: t0,
                    neighbor: right,
                    normal: [1.0, 0.0],
                    length: dy,
                    side: right.is_none().then_some(DomainSide::East),
                });

                if j + 1 == ny {
                    edges.push(Edge {
                        vertices: [vid(i + 1, j + 1), vid(i, j + 1)],
                        cell: t1,
                        neighbor: None,
                        normal: [0.0, 1.0],
                        length: dx,
                        side: Some(DomainSide::North),
                    });
                }
                if i == 0 {
                    edges.push(Edge {
                        vertices: [vid(i, j + 1), vid(i, j)],
                        cell: t1,
                        neighbor: None,
                        normal: [-1.0, 0.0],
                        length: dy,
                        side: Some(DomainSide::West),
                    });
                }
            }
        }

        let mut vertex_neighbors = vec![Vec::new(); vertices.len()];
        for cell in &cells {
            for &a in cell {
                for &b in cell {
                    vertex_neighbors[a].push(b);
                }
            }
        }
        for list in &mut vertex_neighbors {
            list.sort_unstable();
            list.dedup();
        }

        TriMesh {
            nx,
            ny,
            x_min,
            x_max,
            y_min,
            y_max,
            dx,
            dy,
            vertices,
            cells,
            gradients,
            cell_area,
            edges,
            vertex_neighbors,
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn vertex(&self, v: usize) -> [f64; 2] {
        self.vertices[v]
    }

    pub fn vertices(&self) -> &[[f64; 2]] {
        &self.vertices
    }

    pub fn cell(&self, c: usize) -> [usize; 3] {
        self.cells[c]
    }

    pub fn cells(&self) -> &[[usize; 3]] {
        &self.cells
    }

    /// Gradients of the three P1 basis functions on cell `c`.
    pub fn gradients(&self, c: usize) -> &[[f64; 2]; 3] {
        &self.gradients[c]
    }

    /// All cells of a structured mesh have the same area.
    pub fn cell_area(&self, _c: usize) -> f64 {
        self.cell_area
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Sorted list of vertices sharing a cell with `v` (including `v`).
    pub fn vertex_neighbors(&self, v: usize) -> &[usize] {
        &self.vertex_neighbors[v]
    }

    pub fn centroid(&self, c: usize) -> [f64; 2] {
        let [a, b, d] = self.cells[c];
        let (pa, pb, pd) = (self.vertices[a], self.vertices[b], self.vertices[d]);
        [
            (pa[0] + pb[0] + pd[0]) / 3.0,
            (pa[1] + pb[1] + pd[1]) / 3.0,
        ]
    }

    /// Mean of a nodal field over the vertices of cell `c` (its value at
    /// the centroid).
    pub fn cell_mean(&self, c: usize, nodal: &[f64]) -> f64 {
        let [a, b, d] = self.cells[c];
        (nodal[a] + nodal[b] + nodal[d]) / 3.0
    }

    /// Cell containing `p`, or `None` outside the domain.
    pub fn locate(&self, p: [f64; 2]) -> Option<usize> {
        let eps_x = 1e-12 * (self.x_max - self.x_min).abs().max(1.0);
        let eps_y = 1e-12 * (self.y_max - self.y_min).abs().max(1.0);
        if !(p[0] >= self.x_min - eps_x
            && p[0] <= self.x_max + eps_x
            && p[1] >= self.y_min - eps_y
            && p[1] <= self.y_max + eps_y)
        {
            return None;
        }
        let fx = ((p[0] - self.x_min) / self.dx).max(0.0);
        let fy = ((p[1] - self.y_min) / self.dy).max(0.0);
        let i = (fx.floor() as usize).min(self.nx - 1);
        let j = (fy.floor() as usize).min(self.ny - 1);
        let xi = fx - i as f64;
        let eta = fy - j as f64;
        let r = j * self.nx + i;
        Some(if xi >= eta { 2 * r } else { 2 * r + 1 })
    }

    /// Barycentric coordinates of `p` with respect to cell `c`.
    pub fn barycentric(&self, c: usize, p: [f64; 2]) -> [f64; 3] {
        let [a, b, d] = self.cells[c];
        let (pa, pb, pd) = (self.vertices[a], self.vertices[b], self.vertices[d]);
        let det = (pb[0] - pa[0]) * (pd[1] - pa[1]) - (pd[0] - pa[0]) * (pb[1] - pa[1]);
        let l1 = ((p[0] - pa[0]) * (pd[1] - pa[1]) - (pd[0] - pa[0]) * (p[1] - pa[1])) / det;
        let l2 = ((pb[0] - pa[0]) * (p[1] - pa[1]) - (p[0] - pa[0]) * (pb[1] - pa[1])) / det;
        [1.0 - l1 - l2, l1, l2]
    }

    /// Evaluate a nodal (P1) field at `p`.
    pub fn interpolate(&self, nodal: &[f64], p: [f64; 2]) -> Option<f64> {
        let c = self.locate(p)?;
        let lam = self.barycentric(c, p);
        let [a, b, d] = self.cells[c];
        Some(lam[0] * nodal[a] + lam[1] * nodal[b] + lam[2] * nodal[d])
    }

    /// Evaluate a cell-wise (piecewise constant) field at `p`.
    pub fn cell_value(&self, cellwise: &[f64], p: [f64; 2]) -> Option<f64> {
        self.locate(p).map(|c| cellwise[c])
    }

    /// Sample a function of position at every vertex.
    pub fn nodal_from_fn(&self, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        self.vertices.iter().map(|p| f(p[0], p[1])).collect()
    }

    /// Sample a function of position at every cell centroid.
    pub fn cellwise_from_fn(&self, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        (0..self.n_cells())
            .map(|c| {
                let p = self.centroid(c);
                f(p[0], p[1])
            })
            .collect()
    }
}

fn basis_gradients(p0: [f64; 2], p1: [f64; 2], p2: [f64; 2]) -> [[f64; 2]; 3] {
    let two_area = (p1[0] - p0[0]) * (p2[1] - p0[1]) - (p2[0] - p0[0]) * (p1[1] - p0[1]);
    [
        [(p1[1] - p2[1]) / two_area, (p2[0] - p1[0]) / two_area],
        [(p2[1] - p0[1]) / two_area, (p0[0] - p2[0]) / two_area],
        [(p0[1] - p1[1]) / two_area, (p1[0] - p0[0]) / two_area],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mesh = TriMesh::rectangle(0.0, 3.0, 0.0, 2.0, 3, 2);
        assert_eq!(mesh.n_vertices(), 12);
        assert_eq!(mesh.n_cells(), 12);
        // 3 per rectangle plus the north and west boundary rows
        assert_eq!(mesh.edges().len(), 3 * 6 + 3 + 2);
        let boundary = mesh.edges().iter().filter(|e| e.is_boundary()).count();
        assert_eq!(boundary, 2 * (3 + 2));
    }

    #[test]
    fn test_gradients_reproduce_linear_field() {
        let mesh = TriMesh::rectangle(-1.0, 2.0, 0.5, 3.0, 4, 3);
        let f = mesh.nodal_from_fn(|x, y| 2.0 * x - 3.0 * y + 1.0);
        for c in 0..mesh.n_cells() {
            let g = mesh.gradients(c);
            let cell = mesh.cell(c);
            let mut grad = [0.0; 2];
            for (k, &v) in cell.iter().enumerate() {
                grad[0] += f[v] * g[k][0];
                grad[1] += f[v] * g[k][1];
            }
            assert!((grad[0] - 2.0).abs() < 1e-12);
            assert!((grad[1] + 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_locate_and_interpolate() {
        let mesh = TriMesh::rectangle(0.0, 4.0, 0.0, 4.0, 4, 4);
        let f = mesh.nodal_from_fn(|x, y| x + 10.0 * y);
        for p in [[0.3, 0.1], [0.1, 0.3], [3.99, 3.99], [4.0, 4.0], [0.0, 0.0], [2.5, 1.25]] {
            let v = mesh.interpolate(&f, p).unwrap();
            assert!((v - (p[0] + 10.0 * p[1])).abs() < 1e-10, "p = {p:?}");
        }
        assert_eq!(mesh.locate([0.3, 0.1]), Some(0));
        assert_eq!(mesh.locate([0.1, 0.3]), Some(1));
        assert!(mesh.locate([-0.1, 1.0]).is_none());
        assert!(mesh.locate([1.0, 4.5]).is_none());
    }

    #[test]
    fn test_normals_point_out_of_cell() {
        let mesh = TriMesh::rectangle(0.0, 2.0, 0.0, 1.0, 2, 2);
        for e in mesh.edges() {
            let c = mesh.centroid(e.cell);
            let a = mesh.vertex(e.vertices[0]);
            let to_edge = [a[0] - c[0], a[1] - c[1]];
            let dot = to_edge[0] * e.normal[0] + to_edge[1] * e.normal[1];
            assert!(dot > 0.0, "normal points inward on edge {:?}", e.vertices);
            let n2 = e.normal[0].powi(2) + e.normal[1].powi(2);
            assert!((n2 - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_boundary_sides() {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, 3, 3);
        for side in [DomainSide::West, DomainSide::East, DomainSide::South, DomainSide::North] {
            let total: f64 = mesh
                .edges()
                .iter()
                .filter(|e| e.side == Some(side))
                .map(|e| e.length)
                .sum();
            assert!((total - 1.0).abs() < 1e-12, "{side:?} length {total}");
        }
    }
}
