use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{coords::Coords, sim::Universe, stats::BodyStats};

/// One copy of the simulation state, for whoever observes it.
#[derive(Debug, Clone)]
pub struct Frame<P: Coords> {
    pub generation: u64,
    pub time: f64,
    pub positions: Vec<P>,
    pub total_forces: Vec<f64>,
    pub stats: BodyStats<P>,
}

impl<P: Coords> Default for Frame<P> {
    fn default() -> Self {
        Self {
            generation: 0,
            time: 0.0,
            positions: Vec::new(),
            total_forces: Vec::new(),
            stats: BodyStats::default(),
        }
    }
}

/// Primitive for communicating between the simulation and an observer.
pub struct BatchRequest<P: Coords> {
    frame: Mutex<Frame<P>>,
    should_sample: AtomicBool,
    simulation_tick: AtomicU64,
}

impl<P: Coords> Default for BatchRequest<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Coords> BatchRequest<P> {
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(Frame::default()),
            should_sample: AtomicBool::new(true),
            simulation_tick: AtomicU64::new(0),
        }
    }

    /// Return whether the observer is ready to accept a new frame.
    pub fn should_store(&self) -> bool {
        self.should_sample
            .compare_exchange_weak(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Copy the current state of `universe` into the shared frame.
    pub fn store(&self, universe: &Universe<P>) {
        self.simulation_tick
            .store(universe.generation(), Ordering::Relaxed);
        let mut frame = self.lock();
        frame.generation = universe.generation();
        frame.time = universe.time();
        frame.positions.clear();
        frame.total_forces.clear();
        for body in universe.bodies() {
            frame.positions.push(body.pos);
            frame.total_forces.push(body.total_force);
        }
        frame.stats = *universe.stats();
    }

    /// Retrieve the latest frame, and request a new one from the simulation.
    pub fn sample(&self) -> Frame<P> {
        let frame = self.lock().clone();
        self.should_sample.store(true, Ordering::Relaxed);
        frame
    }

    pub fn current_ticks(&self) -> u64 {
        self.simulation_tick.load(Ordering::Relaxed)
    }

    // a panicking simulation thread leaves the last complete frame behind
    fn lock(&self) -> MutexGuard<'_, Frame<P>> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
