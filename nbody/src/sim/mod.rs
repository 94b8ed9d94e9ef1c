use std::fmt::Display;

use anyhow::Context;
use cgmath::{InnerSpace, Zero};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{
    config::PhysicsConfig,
    constants::{CHUNK_SIZE, MAX_THREADS, SOFTENING},
    coords::{Coords, MassPoint},
    stats::BodyStats,
};

pub mod barnes_hut;
pub mod direct;

use barnes_hut::{BarnesHutTree, BodyId, BranchId, StepReport};

#[derive(Debug, Clone)]
pub struct Body<P: Coords> {
    pub pos: P,
    pub vel: P::Vector,
    pub mass: f64,
    /// Sum of force magnitudes from every interaction of the last tick.
    pub total_force: f64,
    pub(crate) parent: Option<BranchId>,
}

impl<P: Coords> Body<P> {
    /// # Panics
    /// If `mass` is not a positive, finite number.
    pub fn new(pos: P, vel: P::Vector, mass: f64) -> Self {
        assert!(
            mass > 0.0 && mass.is_finite(),
            "body mass must be positive and finite, got {mass}"
        );
        Self {
            pos,
            vel,
            mass,
            total_force: 0.0,
            parent: None,
        }
    }

    pub fn at_rest(pos: P, mass: f64) -> Self {
        Self::new(pos, P::Vector::zero(), mass)
    }

    #[inline]
    pub fn mass_point(&self) -> MassPoint<P> {
        MassPoint::new(self.pos, self.mass)
    }

    #[inline]
    pub fn momentum(&self) -> P::Vector {
        self.vel * self.mass
    }

    /// Accumulate the pull of `source` on this body for a step of `dt`.
    ///
    /// The velocity change is capped so that the displacement it causes within
    /// one step never exceeds twice the separation.
    #[inline]
    pub fn add_force(
        &self,
        source: &MassPoint<P>,
        g: f64,
        dt: f64,
        out: &mut ForceSample<P::Vector>,
    ) {
        let rel = source.pos.to_vec() - self.pos.to_vec();
        let distance = rel.magnitude() + SOFTENING;
        let force = self.mass * source.mass * g / (distance * distance);
        let dv = (force / self.mass * dt).min(2.0 * distance / dt);

        out.dv = out.dv + rel * (dv / distance);
        out.total_force += force;
        out.interactions += 1;
    }

    pub(crate) fn apply(&mut self, sample: &ForceSample<P::Vector>) {
        self.vel = self.vel + sample.dv;
        self.total_force = sample.total_force;
    }

    pub(crate) fn advance(&mut self, dt: f64) {
        self.pos = self.pos.moved_by(self.vel, dt);
    }
}

/// Everything one body picks up during a force pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceSample<V> {
    /// Velocity change to apply once the pass has joined.
    pub dv: V,
    pub total_force: f64,
    /// Point masses that acted on the body, aggregated or not.
    pub interactions: u64,
    /// Branches that failed the opening-angle test and were descended into.
    pub opened: u64,
}

impl<V: Zero> ForceSample<V> {
    pub fn zero() -> Self {
        Self {
            dv: V::zero(),
            total_force: 0.0,
            interactions: 0,
            opened: 0,
        }
    }
}

pub fn compute_target_threads(n_objects: usize) -> usize {
    n_objects.div_ceil(CHUNK_SIZE).clamp(1, MAX_THREADS)
}

/// A tree of bodies plus the fixed physics it is stepped with.
pub struct Universe<P: Coords> {
    physics: PhysicsConfig,
    tree: BarnesHutTree<P>,
    generation: u64,
    stats: BodyStats<P>,
    pool: ThreadPool,
}

impl<P: Coords> Universe<P> {
    pub fn new(
        physics: PhysicsConfig,
        bodies: impl IntoIterator<Item = Body<P>>,
    ) -> anyhow::Result<Self> {
        physics.validate()?;

        let mut tree = BarnesHutTree::new();
        for body in bodies {
            tree.add(body);
        }

        let n_threads = physics
            .threads
            .unwrap_or_else(|| compute_target_threads(tree.len()));
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("nbody-force-{i}"))
            .build()
            .context("failed to build the force-pass thread pool")?;

        log::debug!(
            "universe with {} bodies, {} branches, {n_threads} threads",
            tree.len(),
            tree.branch_count()
        );

        let stats = BodyStats::collect(tree.bodies());
        Ok(Self {
            physics,
            tree,
            generation: 0,
            stats,
            pool,
        })
    }

    pub fn add(&mut self, body: Body<P>) -> BodyId {
        let id = self.tree.add(body);
        self.stats = BodyStats::collect(self.tree.bodies());
        id
    }

    pub fn add_all(&mut self, bodies: impl IntoIterator<Item = Body<P>>) {
        for body in bodies {
            self.tree.add(body);
        }
        self.stats = BodyStats::collect(self.tree.bodies());
    }

    /// Advance the simulation by one tick of `dt`.
    pub fn step(&mut self) -> StepReport {
        let PhysicsConfig {
            gravitational_constant: g,
            time_step: dt,
            theta,
            ..
        } = self.physics;

        let tree = &mut self.tree;
        let report = self.pool.install(|| tree.step(g, dt, theta));

        self.generation += 1;
        self.stats = BodyStats::collect(self.tree.bodies());
        log::trace!("generation {}: {report:?}", self.generation);
        report
    }

    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Simulated time, derived from the generation so it never drifts.
    pub fn time(&self) -> f64 {
        self.generation as f64 * self.physics.time_step
    }

    pub fn elapsed(&self) -> ElapsedTime {
        ElapsedTime::new(self.time(), self.generation)
    }

    pub fn stats(&self) -> &BodyStats<P> {
        &self.stats
    }

    pub fn tree(&self) -> &BarnesHutTree<P> {
        &self.tree
    }

    pub fn bodies(&self) -> &[Body<P>] {
        self.tree.bodies()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn for_each_body(&self, f: impl FnMut(BodyId, &Body<P>)) {
        self.tree.for_each_body(f);
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

const SEC_PER_DAY: f64 = 24.0 * 60.0 * 60.0;
const SEC_PER_YEAR: f64 = 365.25 * SEC_PER_DAY;

/// Simulated time of a universe, split into calendar units for logs.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ElapsedTime {
    pub years: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: f64,
    pub generation: u64,
}

impl ElapsedTime {
    /// Break `time` seconds down. Years are Julian, so they do not divide
    /// into whole days.
    pub fn new(time: f64, generation: u64) -> Self {
        let time = time.max(0.0);
        let years = (time / SEC_PER_YEAR).floor();
        let rest = time - years * SEC_PER_YEAR;
        let whole = rest as u64;
        Self {
            years: years as u64,
            days: whole / 86_400,
            hours: whole / 3_600 % 24,
            minutes: whole / 60 % 60,
            seconds: rest % 60.0,
            generation,
        }
    }
}

impl Display for ElapsedTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}y {}d {:02}:{:02}:{:05.2} (generation {})",
            self.years, self.days, self.hours, self.minutes, self.seconds, self.generation
        )
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Point2, Vector2};

    use super::*;

    #[test]
    fn thread_count_scales_with_chunks() {
        assert_eq!(compute_target_threads(0), 1);
        assert_eq!(compute_target_threads(1), 1);
        assert_eq!(compute_target_threads(CHUNK_SIZE + 1), 2);
        assert_eq!(compute_target_threads(CHUNK_SIZE * 1000), MAX_THREADS);
    }

    #[test]
    fn add_force_pulls_towards_source() {
        let body = Body::at_rest(Point2::new(0.0, 0.0), 1.0);
        let source = MassPoint::new(Point2::new(2.0, 0.0), 4.0);
        let mut out = ForceSample::zero();
        body.add_force(&source, 1.0, 0.1, &mut out);

        // F = 1 * 4 / 2^2 = 1, dv = F / m * dt
        assert!((out.total_force - 1.0).abs() < 1e-8);
        assert!((out.dv.x - 0.1).abs() < 1e-8);
        assert_eq!(out.dv.y, 0.0);
        assert_eq!(out.interactions, 1);
    }

    #[test]
    fn add_force_caps_velocity_change() {
        let body = Body::at_rest(Point2::new(0.0, 0.0), 1.0);
        let source = MassPoint::new(Point2::new(1e-3, 0.0), 1e12);
        let mut out = ForceSample::zero();
        let dt = 0.5;
        body.add_force(&source, 1.0, dt, &mut out);

        let distance = 1e-3 + SOFTENING;
        assert!(out.dv.magnitude() * dt <= 2.0 * distance * (1.0 + 1e-12));
        assert!(out.total_force > 1e17);
    }

    #[test]
    fn softening_keeps_coincident_force_finite() {
        let body = Body::at_rest(Point2::new(1.0, 1.0), 1.0);
        let mut out = ForceSample::zero();
        body.add_force(&MassPoint::new(Point2::new(1.0, 1.0), 1.0), 1.0, 1.0, &mut out);
        assert!(out.total_force.is_finite());
        assert!(out.dv.x.is_finite() && out.dv.y.is_finite());
    }

    #[test]
    #[should_panic(expected = "positive")]
    fn zero_mass_is_rejected() {
        Body::new(Point2::new(0.0, 0.0), Vector2::new(0.0, 0.0), 0.0);
    }

    #[test]
    fn advance_moves_by_velocity() {
        let mut body = Body::new(Point2::new(1.0, 2.0), Vector2::new(3.0, -1.0), 1.0);
        body.advance(0.5);
        assert_eq!(body.pos, Point2::new(2.5, 1.5));
    }

    #[test]
    fn elapsed_time_breaks_down_seconds() {
        let elapsed = ElapsedTime::new(2.0 * (SEC_PER_DAY + 3_600.0 + 61.5), 2);
        assert_eq!(elapsed.years, 0);
        assert_eq!(elapsed.days, 2);
        assert_eq!(elapsed.hours, 2);
        assert_eq!(elapsed.minutes, 2);
        assert_eq!(elapsed.seconds, 3.0);
        assert_eq!(elapsed.to_string(), "0y 2d 02:02:03.00 (generation 2)");
    }

    #[test]
    fn elapsed_time_counts_julian_years() {
        let elapsed = ElapsedTime::new(SEC_PER_YEAR + SEC_PER_DAY, 10);
        assert_eq!(elapsed.years, 1);
        assert_eq!(elapsed.days, 1);
        assert_eq!((elapsed.hours, elapsed.minutes), (0, 0));
    }

    #[test]
    fn universe_elapsed_follows_generation() {
        let physics = PhysicsConfig {
            time_step: 1_800.0,
            ..PhysicsConfig::default()
        };
        let mut universe = Universe::new(
            physics,
            [
                Body::at_rest(Point2::new(-1.0, 0.0), 1.0),
                Body::at_rest(Point2::new(1.0, 0.0), 1.0),
            ],
        )
        .unwrap();
        for _ in 0..3 {
            universe.step();
        }
        let elapsed = universe.elapsed();
        assert_eq!(elapsed.generation, 3);
        assert_eq!((elapsed.hours, elapsed.minutes), (1, 30));
    }
}
