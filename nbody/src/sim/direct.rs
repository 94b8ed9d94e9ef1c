//! Exact O(N²) force pass, for checking the tree and for benchmarks.

use rayon::iter::{
    IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator, ParallelIterator,
};

use crate::{
    coords::Coords,
    sim::{Body, ForceSample},
};

/// Accumulate every pairwise pull into `out`, one sample per body.
pub fn force_pass<P: Coords>(
    bodies: &[Body<P>],
    g: f64,
    dt: f64,
    out: &mut [ForceSample<P::Vector>],
) {
    assert_eq!(bodies.len(), out.len(), "one sample per body");
    bodies
        .par_iter()
        .zip(out.par_iter_mut())
        .enumerate()
        .for_each(|(i, (body, out))| {
            for (other_idx, other) in bodies.iter().enumerate() {
                if other_idx == i {
                    continue;
                }
                body.add_force(&other.mass_point(), g, dt, out);
            }
        });
}

/// Apply a direct force pass and move every body, without any tree.
pub fn step<P: Coords>(
    bodies: &mut [Body<P>],
    g: f64,
    dt: f64,
    samples: &mut Vec<ForceSample<P::Vector>>,
) {
    samples.clear();
    samples.resize(bodies.len(), ForceSample::zero());
    force_pass(bodies, g, dt, samples);
    for (body, sample) in bodies.iter_mut().zip(samples.iter()) {
        body.apply(sample);
        body.advance(dt);
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Point3, Vector3, Zero};

    use super::*;

    #[test]
    fn pairwise_forces_cancel() {
        let mut bodies = vec![
            Body::at_rest(Point3::new(0.0, 0.0, 0.0), 2.0),
            Body::at_rest(Point3::new(1.0, 2.0, -1.0), 3.0),
            Body::at_rest(Point3::new(-4.0, 0.5, 2.0), 1.0),
        ];
        let mut samples = Vec::new();
        step(&mut bodies, 1.0, 1e-3, &mut samples);

        let momentum = bodies
            .iter()
            .fold(Vector3::zero(), |acc, b| acc + b.momentum());
        assert!(momentum.magnitude() < 1e-12);
        assert!(samples.iter().all(|s| s.interactions == 2));
    }
}
