use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use crate::{
    batch_request::BatchRequest, constants::CHECK_INTERVAL, coords::Coords, sim::Universe,
};

/// Totals over one run of [`run_sim_loop`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub ticks: u64,
    pub relinks: u64,
    pub root_reinserts: u64,
}

/// Step `universe` until `max_ticks` have run or `token` is raised, handing
/// frames to `exchange` whenever the observer asks for one. The token is only
/// checked between ticks.
pub fn run_sim_loop<P: Coords>(
    mut universe: Universe<P>,
    exchange: Arc<BatchRequest<P>>,
    token: Arc<AtomicBool>,
    max_ticks: Option<u64>,
) -> (Universe<P>, LoopSummary) {
    let start = Instant::now();
    let mut summary = LoopSummary::default();
    let mut i = 0;

    exchange.store(&universe);
    loop {
        if token.load(Ordering::Relaxed) || max_ticks.is_some_and(|max| summary.ticks >= max) {
            break;
        }
        i += 1;

        let report = universe.step();
        summary.ticks += 1;
        summary.relinks += report.relinks as u64;
        summary.root_reinserts += report.root_reinserts as u64;

        if i % CHECK_INTERVAL == 0 && exchange.should_store() {
            exchange.store(&universe);
            log::trace!("iterations since last sample: {i}");
            i = 0;
        }
    }
    exchange.store(&universe);

    log::debug!(
        "simulation loop terminated after {} ticks in {:?}",
        summary.ticks,
        start.elapsed()
    );
    (universe, summary)
}
