//! The factorization-machine scoring engine.
//!
//! A score is `w0 + X·w + Σ_f ½·[(X·v_f)² − X²·v_f²]`, the standard rewrite
//! of the pairwise interaction sum that avoids enumerating feature pairs.
//! Relation blocks contribute through their distinct rows only: each block
//! product is computed at `B × F` cost on the block matrix and then
//! scattered to the `N` cases through the block's row mapping, so total
//! cost is `O(N·P0·K + Σ B·F·K)` regardless of how many cases share a row.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip, s};
use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::matrix::DesignMatrix;
use crate::relation::RelationBlock;
use crate::types::Real;

/// Scoring failures. Shape mismatches are caller errors and are raised
/// before any computation; no partial result is ever produced.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScoreError {
    #[error("model weights have not been initialized")]
    NotInitialized,

    #[error(
        "relation block {block}: mapping covers {mapping_len} cases but the base matrix has {n_cases} rows"
    )]
    MappingLengthMismatch {
        block: usize,
        mapping_len: usize,
        n_cases: usize,
    },

    #[error(
        "total feature width {total_width} (base matrix plus relation blocks) does not match the {n_features} model weights"
    )]
    FeatureWidthMismatch {
        total_width: usize,
        n_features: usize,
    },

    #[error("linear weight vector has {weights} entries but the factor matrix has {factor_rows} rows")]
    WeightShapeMismatch { weights: usize, factor_rows: usize },
}

/// Factorization-machine parameters plus the batch scorer.
///
/// Holds the bias `w0`, the linear weights `w` (length `P`), and the factor
/// matrix `v` (`P × K`). Parameters are set either by
/// [`initialize_weights`](Self::initialize_weights) or by constructing from
/// an externally fitted triple with [`from_weights`](Self::from_weights);
/// scoring never mutates them, so a model can be shared across threads.
#[derive(Debug, Clone)]
pub struct FactorizationMachine<R: Real> {
    n_factors: usize,
    n_groups: usize,
    w0: R,
    w: Array1<R>,
    v: Array2<R>,
    initialized: bool,
}

impl<R: Real> FactorizationMachine<R> {
    /// An uninitialized machine with `n_factors` latent factors.
    ///
    /// `n_groups` is carried for the group-wise priors an external trainer
    /// may attach; it does not influence scoring.
    pub fn new(n_factors: usize, n_groups: usize) -> Self {
        Self {
            n_factors,
            n_groups,
            w0: R::zero(),
            w: Array1::zeros(0),
            v: Array2::zeros((0, n_factors)),
            initialized: false,
        }
    }

    /// A fully initialized machine from an externally fitted parameter
    /// triple. The factor count is inferred from `v`'s column count.
    pub fn from_weights(w0: R, w: Array1<R>, v: Array2<R>) -> Result<Self, ScoreError> {
        if w.len() != v.nrows() {
            return Err(ScoreError::WeightShapeMismatch {
                weights: w.len(),
                factor_rows: v.nrows(),
            });
        }
        Ok(Self {
            n_factors: v.ncols(),
            n_groups: 1,
            w0,
            w,
            v,
            initialized: true,
        })
    }

    pub fn n_factors(&self) -> usize {
        self.n_factors
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn bias(&self) -> R {
        self.w0
    }

    pub fn linear_weights(&self) -> ArrayView1<'_, R> {
        self.w.view()
    }

    /// The `P × K` factor matrix.
    pub fn factors(&self) -> ArrayView2<'_, R> {
        self.v.view()
    }

    /// Draws every entry of the factor matrix and the linear weights, plus
    /// the bias, independently from `N(0, init_std²)` and marks the model
    /// initialized. Re-invocation overwrites the previous parameters. The
    /// caller's generator advances by one deviate per scalar drawn.
    pub fn initialize_weights<G: Rng + ?Sized>(
        &mut self,
        n_features: usize,
        init_std: R,
        rng: &mut G,
    ) {
        self.initialized = false;
        self.v = Array2::from_shape_simple_fn((n_features, self.n_factors), || {
            R::standard_normal(rng) * init_std
        });
        self.w = Array1::from_shape_simple_fn(n_features, || R::standard_normal(rng) * init_std);
        self.w0 = R::standard_normal(rng) * init_std;
        self.initialized = true;
        log::debug!(
            "initialized weights: {} features, {} factors, std {}",
            n_features,
            self.n_factors,
            init_std
        );
    }

    /// Scores a batch of cases.
    ///
    /// `x` holds the per-case base features; `relations` holds the
    /// deduplicated feature groups, whose columns follow the base columns
    /// in the weight layout, in list order. Returns one score per row of
    /// `x`. The quadratic term is evaluated factor-by-factor in parallel;
    /// contributions are summed, so results match a sequential evaluation
    /// up to floating-point summation order.
    pub fn predict_score<X, M>(
        &self,
        x: &X,
        relations: &[RelationBlock<M>],
    ) -> Result<Array1<R>, ScoreError>
    where
        X: DesignMatrix<R> + Sync,
        M: DesignMatrix<R> + Sync,
    {
        if !self.initialized {
            return Err(ScoreError::NotInitialized);
        }
        let n_cases = x.n_rows();
        let base_width = x.n_cols();
        let mut total_width = base_width;
        for (block, rel) in relations.iter().enumerate() {
            if rel.case_to_row.len() != n_cases {
                return Err(ScoreError::MappingLengthMismatch {
                    block,
                    mapping_len: rel.case_to_row.len(),
                    n_cases,
                });
            }
            total_width += rel.matrix.n_cols();
        }
        if total_width != self.w.len() {
            return Err(ScoreError::FeatureWidthMismatch {
                total_width,
                n_features: self.w.len(),
            });
        }

        log::debug!(
            "scoring {} cases: base width {}, {} relation block(s), {} factors",
            n_cases,
            base_width,
            relations.len(),
            self.n_factors
        );

        let widest_block = relations
            .iter()
            .map(|rel| rel.matrix.n_rows())
            .max()
            .unwrap_or(0);

        // Linear term: base columns per case, block columns on distinct
        // rows only, scattered to cases through the mapping.
        let mut result = Array1::from_elem(n_cases, self.w0);
        let mut case_scratch = Array1::zeros(n_cases);
        x.matvec_into(self.w.slice(s![..base_width]), case_scratch.view_mut());
        result += &case_scratch;

        let mut block_scratch = Array1::zeros(widest_block);
        let mut offset = base_width;
        for rel in relations {
            let width = rel.matrix.n_cols();
            let rows = rel.matrix.n_rows();
            let mut seg = block_scratch.slice_mut(s![..rows]);
            rel.matrix
                .matvec_into(self.w.slice(s![offset..offset + width]), seg.view_mut());
            for (score, &row) in result.iter_mut().zip(&rel.case_to_row) {
                *score += seg[row];
            }
            offset += width;
        }

        // Quadratic term: each factor's contribution is independent, so the
        // loop runs under rayon with per-worker scratch.
        let quadratic = (0..self.n_factors)
            .into_par_iter()
            .fold(
                || FactorScratch::new(n_cases, widest_block),
                |mut scratch, factor| {
                    self.accumulate_factor(x, relations, factor, base_width, &mut scratch);
                    scratch
                },
            )
            .map(|scratch| scratch.contrib)
            .reduce(|| Array1::zeros(n_cases), |a, b| a + b);
        result += &quadratic;

        Ok(result)
    }

    /// Adds one factor's interaction-identity contribution,
    /// `½·[(X·v_f)² − X²·v_f²]` with block terms routed through the
    /// mappings, into `scratch.contrib`.
    fn accumulate_factor<X, M>(
        &self,
        x: &X,
        relations: &[RelationBlock<M>],
        factor: usize,
        base_width: usize,
        scratch: &mut FactorScratch<R>,
    ) where
        X: DesignMatrix<R>,
        M: DesignMatrix<R>,
    {
        let vf = self.v.column(factor);
        let FactorScratch {
            contrib,
            q,
            c,
            block,
        } = scratch;

        x.matvec_into(vf.slice(s![..base_width]), q.view_mut());
        x.squared_matvec_into(vf.slice(s![..base_width]), c.view_mut());

        let mut offset = base_width;
        for rel in relations {
            let width = rel.matrix.n_cols();
            let rows = rel.matrix.n_rows();
            let vf_seg = vf.slice(s![offset..offset + width]);

            let mut seg = block.slice_mut(s![..rows]);
            rel.matrix.matvec_into(vf_seg, seg.view_mut());
            for (qi, &row) in q.iter_mut().zip(&rel.case_to_row) {
                *qi += seg[row];
            }

            let mut seg = block.slice_mut(s![..rows]);
            rel.matrix.squared_matvec_into(vf_seg, seg.view_mut());
            for (ci, &row) in c.iter_mut().zip(&rel.case_to_row) {
                *ci += seg[row];
            }

            offset += width;
        }

        let half = R::from_f64(0.5);
        Zip::from(&mut *contrib)
            .and(&*q)
            .and(&*c)
            .for_each(|out, &qi, &ci| {
                *out += half * (qi * qi - ci);
            });
    }
}

/// Per-worker scratch for the factor loop: the accumulated contribution,
/// the interaction sum `q`, the correction `c`, and one buffer sized to the
/// widest relation block.
struct FactorScratch<R: Real> {
    contrib: Array1<R>,
    q: Array1<R>,
    c: Array1<R>,
    block: Array1<R>,
}

impl<R: Real> FactorScratch<R> {
    fn new(n_cases: usize, widest_block: usize) -> Self {
        Self {
            contrib: Array1::zeros(n_cases),
            q: Array1::zeros(n_cases),
            c: Array1::zeros(n_cases),
            block: Array1::zeros(widest_block),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn hand_computed_score_single_case() {
        // w0 = 0.5, w = [0.1, 0.2], v = [[0.3], [0.4]], x = [1, 2].
        // linear: 0.5 + 0.1 + 0.4 = 1.0
        // q = 0.3 + 0.8 = 1.1, q²/2 = 0.605
        // c = 1·0.09 + 4·0.16 = 0.73, c/2 = 0.365
        // total = 1.0 + 0.605 − 0.365 = 1.24
        let fm =
            FactorizationMachine::from_weights(0.5, array![0.1, 0.2], array![[0.3], [0.4]])
                .unwrap();
        let x = array![[1.0, 2.0]];
        let scores = fm
            .predict_score(&x, &[] as &[RelationBlock<Array2<f64>>])
            .unwrap();
        assert_eq!(scores.len(), 1);
        assert_abs_diff_eq!(scores[0], 1.24, epsilon = 1e-12);
    }

    #[test]
    fn scoring_before_initialization_fails() {
        let fm = FactorizationMachine::<f64>::new(4, 1);
        assert!(!fm.is_initialized());
        let x = array![[1.0, 2.0]];
        let err = fm
            .predict_score(&x, &[] as &[RelationBlock<Array2<f64>>])
            .unwrap_err();
        assert_eq!(err, ScoreError::NotInitialized);
    }

    #[test]
    fn mapping_length_mismatch_is_rejected() {
        let mut fm = FactorizationMachine::<f64>::new(2, 1);
        let mut rng = StdRng::seed_from_u64(3);
        fm.initialize_weights(4, 0.1, &mut rng);

        let x = array![[1.0, 0.0], [0.0, 1.0]]; // two cases
        let block = RelationBlock::new(array![[1.0, 2.0]], vec![0]); // one entry
        let err = fm.predict_score(&x, &[block]).unwrap_err();
        assert_eq!(
            err,
            ScoreError::MappingLengthMismatch {
                block: 0,
                mapping_len: 1,
                n_cases: 2
            }
        );
    }

    #[test]
    fn feature_width_mismatch_is_rejected() {
        let mut fm = FactorizationMachine::<f64>::new(2, 1);
        let mut rng = StdRng::seed_from_u64(5);
        fm.initialize_weights(5, 0.1, &mut rng);

        // Base (2 cols) + block (2 cols) = 4 ≠ 5 model weights.
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let block = RelationBlock::new(array![[1.0, 2.0]], vec![0, 0]);
        let err = fm.predict_score(&x, &[block]).unwrap_err();
        assert_eq!(
            err,
            ScoreError::FeatureWidthMismatch {
                total_width: 4,
                n_features: 5
            }
        );
    }

    #[test]
    fn from_weights_rejects_shape_mismatch() {
        let err =
            FactorizationMachine::from_weights(0.0, array![0.1, 0.2], array![[0.3]]).unwrap_err();
        assert_eq!(
            err,
            ScoreError::WeightShapeMismatch {
                weights: 2,
                factor_rows: 1
            }
        );
    }

    #[test]
    fn initialization_shapes_and_moments() {
        let n_features = 4_000;
        let n_factors = 4;
        let init_std = 0.1;
        let mut fm = FactorizationMachine::<f64>::new(n_factors, 1);
        let mut rng = StdRng::seed_from_u64(42);
        fm.initialize_weights(n_features, init_std, &mut rng);

        assert!(fm.is_initialized());
        assert_eq!(fm.linear_weights().len(), n_features);
        assert_eq!(fm.factors().dim(), (n_features, n_factors));

        let all: Vec<f64> = fm
            .factors()
            .iter()
            .chain(fm.linear_weights().iter())
            .copied()
            .collect();
        let n = all.len() as f64;
        let mean = all.iter().sum::<f64>() / n;
        let var = all.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        assert!(mean.abs() < 0.005, "empirical mean {} too far from 0", mean);
        assert!(
            (var.sqrt() - init_std).abs() < 0.005,
            "empirical std {} too far from {}",
            var.sqrt(),
            init_std
        );
        assert!(fm.bias().is_finite());
    }

    #[test]
    fn reinitialization_overwrites_weights() {
        let mut fm = FactorizationMachine::<f64>::new(2, 1);
        let mut rng = StdRng::seed_from_u64(8);
        fm.initialize_weights(3, 0.1, &mut rng);
        let first = fm.linear_weights().to_owned();
        fm.initialize_weights(3, 0.1, &mut rng);
        assert_eq!(fm.linear_weights().len(), 3);
        assert_ne!(first, fm.linear_weights().to_owned());
    }
}
