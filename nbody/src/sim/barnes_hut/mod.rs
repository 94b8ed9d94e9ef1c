use std::mem;

use cgmath::InnerSpace;
use rayon::{iter::IndexedParallelIterator, iter::ParallelIterator, slice::ParallelSliceMut};

use crate::{
    constants::CHUNK_SIZE,
    coords::Coords,
    sim::ForceSample,
};

mod region;
mod tree;

pub use region::Region;
pub use tree::{BarnesHutTree, BodyId, Branch, BranchId, NodeId, StepReport};

impl<P: Coords> BarnesHutTree<P> {
    /// Everything acting on body `id`, using the mass points from the last
    /// recalibration.
    pub fn force_on(&self, id: BodyId, g: f64, dt: f64, theta: f64) -> ForceSample<P::Vector> {
        let mut out = ForceSample::zero();
        let Some(root) = self.root else {
            return out;
        };
        let body = &self.bodies[id.0];

        let estimate = 8 * (self.len() as f32).ln() as usize;
        let mut stack = Vec::with_capacity(estimate);
        stack.push(root);

        while let Some(node) = stack.pop() {
            match node {
                NodeId::Body(other) => {
                    if other == id {
                        continue;
                    }
                    body.add_force(&self.bodies[other.0].mass_point(), g, dt, &mut out);
                }
                NodeId::Branch(b) => {
                    let branch = &self.branches[b.0];
                    let distance = (branch.mass_point.pos.to_vec() - body.pos.to_vec()).magnitude();
                    // a zero distance gives inf, which always opens
                    if branch.region.size() / distance < theta {
                        body.add_force(&branch.mass_point, g, dt, &mut out);
                    } else {
                        out.opened += 1;
                        stack.extend(branch.children().iter().flatten());
                    }
                }
            }
        }
        out
    }

    /// Advance every body by one tick: recalibrate, compute forces in
    /// parallel, then move bodies and repair the tree.
    pub fn step(&mut self, g: f64, dt: f64, theta: f64) -> StepReport {
        self.recalibrate();
        self.force_pass(g, dt, theta);
        for body in &mut self.bodies {
            body.advance(dt);
        }
        self.relink_moved()
    }

    fn force_pass(&mut self, g: f64, dt: f64, theta: f64) {
        let mut samples = mem::take(&mut self.samples);
        samples.clear();
        samples.resize(self.len(), ForceSample::zero());

        let tree = &*self;
        samples
            .par_chunks_mut(CHUNK_SIZE)
            .enumerate()
            .for_each(|(chunk, out)| {
                let start = chunk * CHUNK_SIZE;
                for (offset, sample) in out.iter_mut().enumerate() {
                    *sample = tree.force_on(BodyId(start + offset), g, dt, theta);
                }
            });

        for (body, sample) in self.bodies.iter_mut().zip(&samples) {
            body.apply(sample);
        }
        self.samples = samples;
    }

    /// Samples from the most recent force pass, indexed like [`Self::bodies`].
    pub fn last_samples(&self) -> &[ForceSample<P::Vector>] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Point2, Point3, Vector2};

    use super::*;
    use crate::sim::{Body, direct};

    fn cluster() -> BarnesHutTree<Point2<f64>> {
        // a tight cluster far away from a probe body
        BarnesHutTree::with_bodies([
            Body::at_rest(Point2::new(0.0, 0.0), 1.0),
            Body::at_rest(Point2::new(100.0, 100.0), 1.0),
            Body::at_rest(Point2::new(100.5, 100.0), 1.0),
            Body::at_rest(Point2::new(100.0, 100.5), 1.0),
        ])
    }

    #[test]
    fn lone_body_feels_nothing() {
        let mut tree = BarnesHutTree::with_bodies([Body::at_rest(Point3::new(1.0, 2.0, 3.0), 5.0)]);
        tree.recalibrate();
        let sample = tree.force_on(BodyId(0), 1.0, 1.0, 0.5);
        assert_eq!(sample, ForceSample::zero());
    }

    #[test]
    fn distant_cluster_is_aggregated_or_opened_by_theta() {
        let mut tree = cluster();
        tree.recalibrate();

        let wide = tree.force_on(BodyId(0), 1.0, 1.0, 1.0);
        let exact = tree.force_on(BodyId(0), 1.0, 1.0, 0.0);

        assert!(exact.opened > wide.opened);
        assert!(exact.interactions > wide.interactions);
        assert_eq!(exact.interactions, 3);
        // the cluster pulls up and to the right either way
        assert!(wide.dv.x > 0.0 && wide.dv.y > 0.0);
        assert!((wide.dv.x - exact.dv.x).abs() < 1e-3 * exact.dv.x);
    }

    #[test]
    fn theta_zero_matches_direct_sum() {
        let mut tree = cluster();
        tree.recalibrate();

        let mut reference = vec![ForceSample::zero(); tree.len()];
        direct::force_pass(tree.bodies(), 1.0, 0.1, &mut reference);

        for (i, expected) in reference.iter().enumerate() {
            let sample = tree.force_on(BodyId(i), 1.0, 0.1, 0.0);
            assert_eq!(sample.interactions, expected.interactions);
            assert!((sample.dv - expected.dv).magnitude() <= 1e-9 * expected.dv.magnitude());
            assert!((sample.total_force - expected.total_force).abs() <= 1e-9 * expected.total_force);
        }
    }

    #[test]
    fn step_pulls_pair_together() {
        let mut tree = BarnesHutTree::with_bodies([
            Body::at_rest(Point2::new(-1.0, 0.0), 10.0),
            Body::at_rest(Point2::new(1.0, 0.0), 10.0),
        ]);
        let report = tree.step(1.0, 0.01, 0.5);

        assert_eq!(report, StepReport::default());
        let [a, b] = tree.bodies() else {
            panic!("expected two bodies");
        };
        assert!(a.vel.x > 0.0 && b.vel.x < 0.0);
        assert_eq!(a.vel, -b.vel);
        assert!(a.pos.x > -1.0 && b.pos.x < 1.0);
        assert_eq!(a.total_force, b.total_force);
        tree.verify().unwrap();
    }

    #[test]
    fn crossing_bodies_stay_in_the_tree() {
        let mut tree = BarnesHutTree::with_bodies([
            Body::new(Point2::new(-1.0, 0.1), Vector2::new(1.0, 0.0), 1.0),
            Body::new(Point2::new(1.0, -0.1), Vector2::new(-1.0, 0.0), 1.0),
        ]);
        let mut relinks = 0;
        for _ in 0..40 {
            relinks += tree.step(1e-6, 0.1, 0.5).relinks;
            assert_eq!(tree.len(), 2);
            assert!(tree.root().is_some());
            tree.verify().unwrap();
        }
        assert!(relinks > 0);
    }
}
