//! Aggregate statistics over the live body set, recomputed every tick for
//! whoever draws the simulation.

use cgmath::Zero;

use crate::{
    coords::{Coords, MassPoint},
    sim::Body,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyStats<P: Coords> {
    pub count: usize,
    /// Mass-weighted center.
    pub center_of_mass: P,
    /// Unweighted mean position.
    pub mean: P,
    /// Per-axis variance of positions around `mean`.
    pub variance: P::Vector,
    /// Lightest and heaviest body. Both zero for an empty set.
    pub min_mass: f64,
    pub max_mass: f64,
    /// Mean of `ln(total_force)` over bodies that felt any force.
    pub mean_log_force: f64,
    pub variance_log_force: f64,
}

impl<P: Coords> Default for BodyStats<P> {
    fn default() -> Self {
        Self {
            count: 0,
            center_of_mass: P::origin(),
            mean: P::origin(),
            variance: P::Vector::zero(),
            min_mass: 0.0,
            max_mass: 0.0,
            mean_log_force: 0.0,
            variance_log_force: 0.0,
        }
    }
}

impl<P: Coords> BodyStats<P> {
    pub fn collect(bodies: &[Body<P>]) -> Self {
        if bodies.is_empty() {
            return Self::default();
        }

        let n = bodies.len() as f64;
        let center_of_mass = MassPoint::weighted_average(bodies.iter().map(Body::mass_point)).pos;

        let mean = P::from_vec(
            bodies
                .iter()
                .fold(P::Vector::zero(), |acc, b| acc + b.pos.to_vec())
                / n,
        );

        let mut variance = P::Vector::zero();
        for body in bodies {
            let d = body.pos.to_vec() - mean.to_vec();
            let mut squared = d;
            for i in 0..P::DIM {
                squared[i] = d[i] * d[i];
            }
            variance = variance + squared;
        }
        variance = variance / n;

        let (min_mass, max_mass) = bodies
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
                (lo.min(b.mass), hi.max(b.mass))
            });

        // Welford's running mean/variance
        let mut k = 0.0;
        let mut mean_log_force = 0.0;
        let mut m2 = 0.0;
        for body in bodies.iter().filter(|b| b.total_force > 0.0) {
            k += 1.0;
            let x = body.total_force.ln();
            let delta = x - mean_log_force;
            mean_log_force += delta / k;
            m2 += delta * (x - mean_log_force);
        }
        let variance_log_force = if k > 0.0 { m2 / k } else { 0.0 };

        Self {
            count: bodies.len(),
            center_of_mass,
            mean,
            variance,
            min_mass,
            max_mass,
            mean_log_force,
            variance_log_force,
        }
    }
}
