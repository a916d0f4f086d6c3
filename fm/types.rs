//! The scalar abstraction the rest of the crate is generic over.
//!
//! Every numeric path in this crate (scoring, initialization, truncated
//! normal sampling) is written against [`Real`] so that a model can be run
//! in `f32` or `f64` without touching the algorithms. The trait also owns
//! the two deviate sources the crate needs, so callers thread a single
//! `rand::Rng` through and nothing here holds generator state.

use ndarray::{LinalgScalar, ScalarOperand};
use num_traits::{Float, NumCast};
use rand::Rng;
use rand::distributions::Distribution;
use rand_distr::{OpenClosed01, StandardNormal};
use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::AddAssign;

/// Floating-point scalar for model parameters, feature values, and scores.
///
/// Implemented for `f32` and `f64`. The generator passed to the deviate
/// methods is caller-owned and advances by exactly one deviate per call.
pub trait Real:
    Float
    + LinalgScalar
    + ScalarOperand
    + AddAssign
    + Sum<Self>
    + Debug
    + Display
    + Send
    + Sync
    + 'static
{
    /// One standard-normal deviate.
    fn standard_normal<G: Rng + ?Sized>(rng: &mut G) -> Self;

    /// One uniform deviate on `(0, 1]`. Zero is excluded so that the
    /// logarithm taken in the rejection sampler is always finite.
    fn unit_uniform<G: Rng + ?Sized>(rng: &mut G) -> Self;

    /// Converts a finite `f64` constant (e.g. `0.5`) into this scalar type.
    fn from_f64(value: f64) -> Self {
        <Self as NumCast>::from(value).expect("finite f64 constant must be representable")
    }
}

impl Real for f64 {
    fn standard_normal<G: Rng + ?Sized>(rng: &mut G) -> Self {
        StandardNormal.sample(rng)
    }

    fn unit_uniform<G: Rng + ?Sized>(rng: &mut G) -> Self {
        OpenClosed01.sample(rng)
    }
}

impl Real for f32 {
    fn standard_normal<G: Rng + ?Sized>(rng: &mut G) -> Self {
        StandardNormal.sample(rng)
    }

    fn unit_uniform<G: Rng + ?Sized>(rng: &mut G) -> Self {
        OpenClosed01.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn unit_uniform_never_returns_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let u: f64 = Real::unit_uniform(&mut rng);
            assert!(u > 0.0 && u <= 1.0, "deviate {} outside (0, 1]", u);
        }
    }

    #[test]
    fn from_f64_round_trips_constants() {
        assert_eq!(<f64 as Real>::from_f64(0.5), 0.5);
        assert_eq!(<f32 as Real>::from_f64(4.0), 4.0f32);
    }
}
