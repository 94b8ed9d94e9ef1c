//! Initial body distributions. Every random draw comes from the caller's
//! generator, so a seed fully determines a scenario.

use std::f64::consts::TAU;

use anyhow::bail;
use cgmath::{InnerSpace, Point2, Point3, Vector2, Vector3, Zero};
use rand::Rng;

use crate::{
    config::{Dimensions, Preset, ScenarioConfig},
    constants::{AU, EARTH_MOON, M_EARTH, M_MOON, M_SUN, V_EARTH, V_MOON},
    coords::Coords,
    sim::Body,
};

/// Uniform in `(0, 1]`, safe for `ln` and as a mass factor.
fn unit_open<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    1.0 - rng.random::<f64>()
}

/// Standard normal pair via Box-Muller.
fn normal_pair<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    let radius = (-2.0 * unit_open(rng).ln()).sqrt();
    let angle = TAU * rng.random::<f64>();
    (radius * angle.cos(), radius * angle.sin())
}

fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    loop {
        let (x, y) = normal_pair(rng);
        let (z, _) = normal_pair(rng);
        let v = Vector3::new(x, y, z);
        let norm = v.magnitude();
        if norm > 1e-9 {
            return v / norm;
        }
    }
}

/// A random unit vector perpendicular to the unit vector `dir`.
fn random_tangent<R: Rng + ?Sized>(rng: &mut R, dir: Vector3<f64>) -> Vector3<f64> {
    loop {
        let v = random_direction(rng);
        let t = v - dir * v.dot(dir);
        let norm = t.magnitude();
        if norm > 1e-6 {
            return t / norm;
        }
    }
}

fn circular_speed(g: f64, center_mass: f64, r: f64) -> f64 {
    (g * center_mass / r).sqrt()
}

pub fn cloud_2d<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    rad: f64,
    max_mass: f64,
    sigma_v: f64,
) -> Vec<Body<Point2<f64>>> {
    (0..count)
        .map(|_| {
            let r = rng.random::<f64>().sqrt() * rad;
            let arc = TAU * rng.random::<f64>();
            let mass = unit_open(rng) * max_mass;
            let (vx, vy) = normal_pair(rng);
            Body::new(
                Point2::new(arc.cos() * r, arc.sin() * r),
                Vector2::new(vx, vy) * sigma_v,
                mass,
            )
        })
        .collect()
}

/// Bodies on circular orbits around a heavy body at the origin, which is
/// appended last.
pub fn rotating_disc_2d<R: Rng + ?Sized>(
    rng: &mut R,
    g: f64,
    count: usize,
    rad: f64,
    max_mass: f64,
    center_mass: f64,
    clockwise: bool,
) -> Vec<Body<Point2<f64>>> {
    let mut bodies: Vec<_> = (0..count)
        .map(|_| {
            let r = unit_open(rng).sqrt() * rad;
            let arc = TAU * rng.random::<f64>();
            let mut v = circular_speed(g, center_mass, r);
            if clockwise {
                v = -v;
            }
            Body::new(
                Point2::new(arc.cos() * r, arc.sin() * r),
                Vector2::new(arc.sin() * v, -arc.cos() * v),
                unit_open(rng) * max_mass,
            )
        })
        .collect();
    bodies.push(Body::at_rest(Point2::new(0.0, 0.0), center_mass));
    bodies
}

pub fn cloud_3d<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    rad: f64,
    max_mass: f64,
    sigma_v: f64,
) -> Vec<Body<Point3<f64>>> {
    (0..count)
        .map(|_| {
            let r = rng.random::<f64>().cbrt() * rad;
            let pos = Point3::from_vec(random_direction(rng) * r);
            let (vx, vy) = normal_pair(rng);
            let (vz, _) = normal_pair(rng);
            Body::new(
                pos,
                Vector3::new(vx, vy, vz) * sigma_v,
                unit_open(rng).powi(3) * max_mass,
            )
        })
        .collect()
}

/// Sphere of bodies, each on a circular orbit in a random plane through the
/// heavy center.
pub fn rotating_cloud_3d<R: Rng + ?Sized>(
    rng: &mut R,
    g: f64,
    count: usize,
    rad: f64,
    max_mass: f64,
    center_mass: f64,
) -> Vec<Body<Point3<f64>>> {
    let mut bodies: Vec<_> = (0..count)
        .map(|_| {
            let r = unit_open(rng).cbrt() * rad;
            orbiting_body(rng, g, r, max_mass, center_mass)
        })
        .collect();
    bodies.push(Body::at_rest(Point3::new(0.0, 0.0, 0.0), center_mass));
    bodies
}

pub fn flat_rotating_disc_3d<R: Rng + ?Sized>(
    rng: &mut R,
    g: f64,
    count: usize,
    rad: f64,
    max_mass: f64,
    center_mass: f64,
    clockwise: bool,
) -> Vec<Body<Point3<f64>>> {
    rotating_disc_2d(rng, g, count, rad, max_mass, center_mass, clockwise)
        .into_iter()
        .map(|b| {
            Body::new(
                Point3::new(b.pos.x, b.pos.y, 0.0),
                Vector3::new(b.vel.x, b.vel.y, 0.0),
                b.mass,
            )
        })
        .collect()
}

/// Shell of radius `rad`, every body orbiting the center.
pub fn rotating_ball_3d<R: Rng + ?Sized>(
    rng: &mut R,
    g: f64,
    count: usize,
    rad: f64,
    max_mass: f64,
    center_mass: f64,
) -> Vec<Body<Point3<f64>>> {
    let mut bodies: Vec<_> = (0..count)
        .map(|_| orbiting_body(rng, g, rad, max_mass, center_mass))
        .collect();
    bodies.push(Body::at_rest(Point3::new(0.0, 0.0, 0.0), center_mass));
    bodies
}

fn orbiting_body<R: Rng + ?Sized>(
    rng: &mut R,
    g: f64,
    r: f64,
    max_mass: f64,
    center_mass: f64,
) -> Body<Point3<f64>> {
    let dir = random_direction(rng);
    let tangent = random_tangent(rng, dir);
    Body::new(
        Point3::from_vec(dir * r),
        tangent * circular_speed(g, center_mass, r),
        unit_open(rng) * max_mass,
    )
}

/// Thick shell between 0.8 and 1.0 of `rad`, at rest. Masses skew light.
pub fn ball_3d<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    rad: f64,
    max_mass: f64,
) -> Vec<Body<Point3<f64>>> {
    (0..count)
        .map(|_| {
            let r = rng.random::<f64>().sqrt() * rad * 0.2 + 0.8 * rad;
            let pos = Point3::from_vec(random_direction(rng) * r);
            Body::at_rest(pos, unit_open(rng).powi(3) * max_mass)
        })
        .collect()
}

/// Shell spinning around the z axis with rim speed `velocity`.
pub fn galaxy_3d<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    rad: f64,
    max_mass: f64,
    velocity: f64,
) -> Vec<Body<Point3<f64>>> {
    (0..count)
        .map(|_| {
            let theta = TAU * rng.random::<f64>();
            let phi = (2.0 * rng.random::<f64>() - 1.0).acos();
            let pos = Point3::new(
                rad * phi.sin() * theta.cos(),
                rad * phi.sin() * theta.sin(),
                rad * phi.cos(),
            );
            let vel = Vector3::new(
                -velocity * theta.sin() * phi.sin(),
                velocity * theta.cos() * phi.sin(),
                0.0,
            );
            Body::new(pos, vel, unit_open(rng) * max_mass)
        })
        .collect()
}

/// Earth first, then the sun and the moon, in SI units. Use with
/// [`crate::constants::G_SI`].
pub fn sun_earth_moon_2d() -> Vec<Body<Point2<f64>>> {
    vec![
        Body::new(Point2::new(AU, 0.0), Vector2::new(0.0, V_EARTH), M_EARTH),
        Body::at_rest(Point2::new(0.0, 0.0), M_SUN),
        Body::new(
            Point2::new(AU + EARTH_MOON, 0.0),
            Vector2::new(0.0, V_EARTH + V_MOON),
            M_MOON,
        ),
    ]
}

pub fn sun_earth_moon_3d() -> Vec<Body<Point3<f64>>> {
    sun_earth_moon_2d()
        .into_iter()
        .map(|b| {
            Body::new(
                Point3::new(b.pos.x, b.pos.y, 0.0),
                Vector3::new(b.vel.x, b.vel.y, 0.0),
                b.mass,
            )
        })
        .collect()
}

/// Add `dv` to every velocity.
pub fn with_motion<P: Coords>(bodies: &mut [Body<P>], dv: P::Vector) {
    for body in bodies {
        body.vel = body.vel + dv;
    }
}

/// Shift every position by `offset`.
pub fn move_by<P: Coords>(bodies: &mut [Body<P>], offset: P::Vector) {
    for body in bodies {
        body.pos = body.pos.moved_by(offset, 1.0);
    }
}

pub fn build_2d<R: Rng + ?Sized>(
    scenario: &ScenarioConfig,
    g: f64,
    rng: &mut R,
) -> anyhow::Result<Vec<Body<Point2<f64>>>> {
    let s = scenario;
    Ok(match s.preset {
        Preset::Cloud => cloud_2d(rng, s.body_count, s.radius, s.max_mass, s.sigma_v),
        Preset::RotatingDisc => rotating_disc_2d(
            rng,
            g,
            s.body_count,
            s.radius,
            s.max_mass,
            s.center_mass,
            s.clockwise,
        ),
        Preset::SunEarthMoon => sun_earth_moon_2d(),
        preset => bail!("preset {preset:?} has no 2D variant"),
    })
}

pub fn build_3d<R: Rng + ?Sized>(
    scenario: &ScenarioConfig,
    g: f64,
    rng: &mut R,
) -> anyhow::Result<Vec<Body<Point3<f64>>>> {
    let s = scenario;
    Ok(match s.preset {
        Preset::Cloud => cloud_3d(rng, s.body_count, s.radius, s.max_mass, s.sigma_v),
        Preset::RotatingDisc => flat_rotating_disc_3d(
            rng,
            g,
            s.body_count,
            s.radius,
            s.max_mass,
            s.center_mass,
            s.clockwise,
        ),
        Preset::RotatingCloud => {
            rotating_cloud_3d(rng, g, s.body_count, s.radius, s.max_mass, s.center_mass)
        }
        Preset::RotatingBall => {
            rotating_ball_3d(rng, g, s.body_count, s.radius, s.max_mass, s.center_mass)
        }
        Preset::Ball => ball_3d(rng, s.body_count, s.radius, s.max_mass),
        Preset::Galaxy => galaxy_3d(rng, s.body_count, s.radius, s.max_mass, s.velocity),
        Preset::SunEarthMoon => sun_earth_moon_3d(),
    })
}

/// Dimension-tagged result of [`build`].
pub enum Scenario {
    Two(Vec<Body<Point2<f64>>>),
    Three(Vec<Body<Point3<f64>>>),
}

pub fn build<R: Rng + ?Sized>(
    scenario: &ScenarioConfig,
    g: f64,
    rng: &mut R,
) -> anyhow::Result<Scenario> {
    Ok(match scenario.dimensions {
        Dimensions::Two => Scenario::Two(build_2d(scenario, g, rng)?),
        Dimensions::Three => Scenario::Three(build_3d(scenario, g, rng)?),
    })
}

/// Total momentum, which the presets with a center body leave near zero only
/// by symmetry.
pub fn total_momentum<P: Coords>(bodies: &[Body<P>]) -> P::Vector {
    bodies
        .iter()
        .fold(P::Vector::zero(), |acc, b| acc + b.momentum())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(1234)
    }

    #[test]
    fn same_seed_same_scenario() {
        let a = cloud_3d(&mut rng(), 50, 10.0, 1.0, 0.5);
        let b = cloud_3d(&mut rng(), 50, 10.0, 1.0, 0.5);
        for (a, b) in a.iter().zip(&b) {
            assert_eq!(a.pos, b.pos);
            assert_eq!(a.vel, b.vel);
            assert_eq!(a.mass, b.mass);
        }
    }

    #[test]
    fn masses_are_positive_and_bounded() {
        let mut rng = rng();
        let bodies = ball_3d(&mut rng, 500, 5.0, 2.0);
        assert!(bodies.iter().all(|b| b.mass > 0.0 && b.mass <= 2.0));
        for b in &bodies {
            let r = b.pos.to_vec().magnitude();
            assert!((0.8 * 5.0 - 1e-9..=5.0 + 1e-9).contains(&r));
        }
    }

    #[test]
    fn disc_bodies_orbit_the_center() {
        let g = 2.0;
        let bodies = rotating_disc_2d(&mut rng(), g, 100, 50.0, 1.0, 1e4, false);
        assert_eq!(bodies.len(), 101);
        let center = bodies.last().unwrap();
        assert_eq!(center.mass, 1e4);
        for b in &bodies[..100] {
            let r = b.pos.to_vec().magnitude();
            assert!(r > 0.0 && r <= 50.0 + 1e-9);
            assert!(b.pos.to_vec().dot(b.vel).abs() < 1e-9 * r * b.vel.magnitude());
            assert!((b.vel.magnitude() - (g * 1e4 / r).sqrt()).abs() < 1e-9 * b.vel.magnitude());
        }
    }

    #[test]
    fn clockwise_flips_rotation() {
        let ccw = rotating_disc_2d(&mut rng(), 1.0, 10, 5.0, 1.0, 10.0, false);
        let cw = rotating_disc_2d(&mut rng(), 1.0, 10, 5.0, 1.0, 10.0, true);
        for (a, b) in ccw.iter().zip(&cw).take(10) {
            assert_eq!(a.vel, -b.vel);
        }
    }

    #[test]
    fn rotating_ball_velocities_are_tangent() {
        let bodies = rotating_ball_3d(&mut rng(), 1.0, 200, 3.0, 1.0, 100.0);
        for b in &bodies[..200] {
            let r = b.pos.to_vec();
            assert!((r.magnitude() - 3.0).abs() < 1e-9);
            assert!(r.dot(b.vel).abs() < 1e-9 * r.magnitude() * b.vel.magnitude());
        }
    }

    #[test]
    fn galaxy_spins_around_z() {
        let bodies = galaxy_3d(&mut rng(), 100, 10.0, 1.0, 2.0);
        for b in &bodies {
            assert_eq!(b.vel.z, 0.0);
            assert!(b.vel.magnitude() <= 2.0 + 1e-12);
        }
    }

    #[test]
    fn adjusters_shift_every_body() {
        let mut bodies = sun_earth_moon_2d();
        move_by(&mut bodies, Vector2::new(1.0, -1.0));
        with_motion(&mut bodies, Vector2::new(0.0, 5.0));
        assert_eq!(bodies[1].pos, Point2::new(1.0, -1.0));
        assert_eq!(bodies[1].vel, Vector2::new(0.0, 5.0));
    }

    #[test]
    fn three_dimensional_only_presets_fail_in_2d() {
        let scenario = ScenarioConfig {
            preset: Preset::Galaxy,
            ..Default::default()
        };
        assert!(build_2d(&scenario, 1.0, &mut rng()).is_err());
        assert_eq!(build_3d(&scenario, 1.0, &mut rng()).unwrap().len(), scenario.body_count);
    }

    #[test]
    fn build_dispatches_on_dimensions() {
        let scenario = ScenarioConfig {
            preset: Preset::SunEarthMoon,
            dimensions: Dimensions::Three,
            ..Default::default()
        };
        let Scenario::Three(bodies) = build(&scenario, 1.0, &mut rng()).unwrap() else {
            panic!("expected a 3D scenario");
        };
        assert_eq!(bodies.len(), 3);
    }
}
