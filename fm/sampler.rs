//! One-sided truncated normal sampling.
//!
//! These are the latent-variable draws a Gibbs sampler needs for probit and
//! ordinal likelihoods: a standard normal conditioned on exceeding (or
//! falling below) a threshold. The scheme is the two-regime rejection
//! sampler of Robert, "Simulation of truncated normal variables"
//! (arXiv:0907.4010), Proposition 2.3.
//!
//! Termination is almost sure (the trial count is geometric) but not
//! bounded: a non-finite threshold can loop forever, and there is no
//! iteration cap. Callers own that hazard along with the generator they
//! pass in.

use rand::Rng;

use crate::types::Real;

/// Draws a standard normal variate conditioned on `z > mu_minus`.
///
/// For `mu_minus ≤ 0` the truncation point sits at or left of the mode, so
/// plain rejection on standard normal deviates accepts with probability at
/// least one half. For `mu_minus > 0` the target lives in the right tail
/// and an exponential envelope with rate `α* = (μ₋ + √(μ₋² + 4)) / 2` is
/// used instead: propose `z = −ln(U)/α* + μ₋`, accept with probability
/// `exp(−(z − α*)²/2)`.
pub fn sample_truncated_normal_left<R: Real, G: Rng + ?Sized>(rng: &mut G, mu_minus: R) -> R {
    if mu_minus <= R::zero() {
        loop {
            let z = R::standard_normal(rng);
            if z > mu_minus {
                return z;
            }
        }
    } else {
        let two = R::from_f64(2.0);
        let four = R::from_f64(4.0);
        let alpha_star = (mu_minus + (mu_minus * mu_minus + four).sqrt()) / two;
        loop {
            let z = -R::unit_uniform(rng).ln() / alpha_star + mu_minus;
            let rho = (-(z - alpha_star) * (z - alpha_star) / two).exp();
            if R::unit_uniform(rng) < rho {
                return z;
            }
        }
    }
}

/// Draws from `N(mean, std²)` conditioned on the result exceeding `mu_minus`.
pub fn sample_truncated_normal_left_shifted<R: Real, G: Rng + ?Sized>(
    rng: &mut G,
    mean: R,
    std: R,
    mu_minus: R,
) -> R {
    mean + std * sample_truncated_normal_left(rng, (mu_minus - mean) / std)
}

/// Draws a standard normal variate conditioned on `z < mu_plus`.
pub fn sample_truncated_normal_right<R: Real, G: Rng + ?Sized>(rng: &mut G, mu_plus: R) -> R {
    -sample_truncated_normal_left(rng, -mu_plus)
}

/// Draws from `N(mean, std²)` conditioned on the result falling below `mu_plus`.
pub fn sample_truncated_normal_right_shifted<R: Real, G: Rng + ?Sized>(
    rng: &mut G,
    mean: R,
    std: R,
    mu_plus: R,
) -> R {
    mean + std * sample_truncated_normal_right(rng, (mu_plus - mean) / std)
}
