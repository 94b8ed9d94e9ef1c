// PHYSICAL
/// SI gravitational constant, in m^3 kg^-1 s^-2
pub const G_SI: f64 = 6.674e-11;
/// Average distance between earth and the sun, in meters
pub const AU: f64 = 149.6e9;
/// Average distance between earth and the moon, in meters
pub const EARTH_MOON: f64 = 3.844e8;
/// Mass of the sun, in kilograms
pub const M_SUN: f64 = 1.989e30;
/// Mass of earth, in kilograms
pub const M_EARTH: f64 = 5.972e24;
/// Mass of the moon, in kilograms
pub const M_MOON: f64 = 7.348e22;
/// Orbital speed of earth around the sun, in m/s
pub const V_EARTH: f64 = 29_780.0;
/// Orbital speed of the moon around earth, in m/s
pub const V_MOON: f64 = 1_022.0;
/// Padding added to every separation so coincident points never divide by zero.
pub const SOFTENING: f64 = 1e-9;

// TREE
/// Widening of the first shared region so neither seed body sits on its boundary.
pub const REGION_SAFETY_FACTOR: f64 = 1.000_000_000_01;
/// Child slots of an octree branch. Quadtrees use the first four.
pub const MAX_CHILDREN: usize = 8;

// SIMULATION
/// Hard cap on number of threads to use.
pub const MAX_THREADS: usize = 20;
/// Bodies per unit of work in the force pass.
pub const CHUNK_SIZE: usize = 500;
/// Ticks between snapshot checks in the simulation loop.
pub const CHECK_INTERVAL: u64 = 10;
/// Barnes-Hut coefficient (theta). Smaller values = more accurate, but slower.
pub const BARNES_HUT_COEFF: f64 = 0.7;
/// Default time per tick.
pub const DELTA: f64 = 1.0;
