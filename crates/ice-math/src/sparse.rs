// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Sparse Matrices
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Square CSR matrices with a fixed sparsity pattern.
//!
//! Finite-element assembly reuses one pattern for every Newton step, so
//! the pattern is built once and values are accumulated in place.

use ice_types::error::{IceError, IceResult};

/// Row structure of a square sparse matrix. Column indices are sorted
/// and unique within each row.
#[derive(Debug, Clone, PartialEq)]
pub struct SparsityPattern {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl SparsityPattern {
    /// Build from per-row column lists (duplicates allowed).
    pub fn from_rows(rows: Vec<Vec<usize>>) -> Self {
        let n = rows.len();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for mut cols in rows {
            cols.sort_unstable();
            cols.dedup();
            col_idx.extend(cols);
            row_ptr.push(col_idx.len());
        }
        SparsityPattern {
            n,
            row_ptr,
            col_idx,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    pub fn row_indices(&self, row: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// Position of `(row, col)` in the value array.
    pub fn find_index(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        self.row_indices(row)
            .binary_search(&col)
            .ok()
            .map(|k| start + k)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pattern: SparsityPattern,
    values: Vec<f64>,
}

impl CsrMatrix {
    pub fn zeros(pattern: SparsityPattern) -> Self {
        let nnz = pattern.nnz();
        CsrMatrix {
            pattern,
            values: vec![0.0; nnz],
        }
    }

    pub fn identity(n: usize) -> Self {
        let pattern = SparsityPattern::from_rows((0..n).map(|i| vec![i]).collect());
        CsrMatrix {
            pattern,
            values: vec![1.0; n],
        }
    }

    /// Build from `(row, col, value)` triplets; duplicates are summed.
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, f64)]) -> IceResult<Self> {
        let mut rows = vec![Vec::new(); n];
        for &(r, c, _) in triplets {
            if r >= n || c >= n {
                return Err(IceError::LinAlg(format!(
                    "triplet ({r}, {c}) outside a {n}x{n} matrix"
                )));
            }
            rows[r].push(c);
        }
        let mut m = CsrMatrix::zeros(SparsityPattern::from_rows(rows));
        for &(r, c, v) in triplets {
            m.add(r, c, v);
        }
        Ok(m)
    }

    pub fn n(&self) -> usize {
        self.pattern.n
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    /// Column indices and values of one row.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.pattern.row_ptr[row]..self.pattern.row_ptr[row + 1];
        (&self.pattern.col_idx[range.clone()], &self.values[range])
    }

    /// Accumulate into an entry of the pattern.
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        match self.pattern.find_index(row, col) {
            Some(k) => self.values[k] += value,
            None => debug_assert!(false, "entry ({row}, {col}) not in sparsity pattern"),
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.pattern
            .find_index(row, col)
            .map(|k| self.values[k])
            .unwrap_or(0.0)
    }

    pub fn fill(&mut self, value: f64) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    /// `y = A x`.
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        for (i, yi) in y.iter_mut().enumerate().take(self.n()) {
            let (cols, vals) = self.row(i);
            *yi = cols.iter().zip(vals).map(|(&j, &a)| a * x[j]).sum();
        }
    }

    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.n()];
        self.mul_vec(x, &mut y);
        y
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n()).map(|i| self.get(i, i)).collect()
    }

    /// Maximum absolute row sum.
    pub fn inf_norm(&self) -> f64 {
        (0..self.n())
            .map(|i| self.row(i).1.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    /// `a * self + b * other` for matrices sharing a pattern.
    pub fn linear_combination(&self, a: f64, other: &CsrMatrix, b: f64) -> IceResult<CsrMatrix> {
        if self.pattern != other.pattern {
            return Err(IceError::LinAlg(
                "linear combination requires identical sparsity patterns".to_string(),
            ));
        }
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(x, y)| a * x + b * y)
            .collect();
        Ok(CsrMatrix {
            pattern: self.pattern.clone(),
            values,
        })
    }

    /// Replace the rows and columns of constrained unknowns by identity.
    pub fn constrain(&mut self, constrained: &[bool]) {
        for i in 0..self.n() {
            let range = self.pattern.row_ptr[i]..self.pattern.row_ptr[i + 1];
            for k in range {
                let j = self.pattern.col_idx[k];
                if constrained[i] || constrained[j] {
                    self.values[k] = if i == j { 1.0 } else { 0.0 };
                }
            }
        }
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        let scale = self.inf_norm().max(f64::MIN_POSITIVE);
        (0..self.n()).all(|i| {
            let (cols, vals) = self.row(i);
            cols.iter()
                .zip(vals)
                .all(|(&j, &a)| (a - self.get(j, i)).abs() <= tol * scale)
        })
    }

    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let n = self.n();
        let mut dense = vec![vec![0.0; n]; n];
        for (i, row) in dense.iter_mut().enumerate() {
            let (cols, vals) = self.row(i);
            for (&j, &a) in cols.iter().zip(vals) {
                row[j] = a;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laplacian_1d(n: usize) -> CsrMatrix {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, &t).unwrap()
    }

    #[test]
    fn test_pattern_sorted_and_unique() {
        let p = SparsityPattern::from_rows(vec![vec![2, 0, 2, 1], vec![1]]);
        assert_eq!(p.row_indices(0), &[0, 1, 2]);
        assert_eq!(p.nnz(), 4);
        assert_eq!(p.find_index(0, 2), Some(2));
        assert_eq!(p.find_index(1, 0), None);
    }

    #[test]
    fn test_triplets_sum_duplicates() {
        let m = CsrMatrix::from_triplets(2, &[(0, 0, 1.0), (0, 0, 2.5), (1, 0, -1.0)]).unwrap();
        assert_eq!(m.get(0, 0), 3.5);
        assert_eq!(m.get(1, 0), -1.0);
        assert_eq!(m.get(0, 1), 0.0);
        assert!(CsrMatrix::from_triplets(2, &[(2, 0, 1.0)]).is_err());
    }

    #[test]
    fn test_mul_vec_and_norms() {
        let m = laplacian_1d(4);
        let y = m.apply(&[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(y, vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(m.inf_norm(), 4.0);
        assert_eq!(m.diagonal(), vec![2.0; 4]);
        assert!(m.is_symmetric(1e-14));
    }

    #[test]
    fn test_constrain_keeps_symmetry() {
        let mut m = laplacian_1d(5);
        m.constrain(&[true, false, false, false, true]);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(1, 0), 0.0);
        assert_eq!(m.get(2, 2), 2.0);
        assert!(m.is_symmetric(1e-14));
    }

    #[test]
    fn test_linear_combination() {
        let a = laplacian_1d(3);
        let c = a.linear_combination(2.0, &a, -1.0).unwrap();
        assert_eq!(c.to_dense(), a.to_dense());
        let other = CsrMatrix::identity(3);
        assert!(a.linear_combination(1.0, &other, 1.0).is_err());
    }
}
