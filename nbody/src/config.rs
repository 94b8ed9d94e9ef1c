use std::path::Path;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

use crate::constants::{BARNES_HUT_COEFF, DELTA};

/// Everything a run needs, as read from a TOML file. Missing tables and keys
/// fall back to their defaults.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub physics: PhysicsConfig,
    pub scenario: ScenarioConfig,
    pub run: RunConfig,
}

/// Fixed parameters of the integrator. Never change during a run.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravitational_constant: f64,
    /// Seconds of simulated time per tick.
    pub time_step: f64,
    /// Opening angle of the Barnes-Hut approximation. 0 is exact.
    pub theta: f64,
    /// Force-pass threads. Derived from the body count when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravitational_constant: 1.0,
            time_step: DELTA,
            theta: BARNES_HUT_COEFF,
            threads: None,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.gravitational_constant.is_finite() && self.gravitational_constant >= 0.0,
            "gravitational constant must be finite and non-negative, got {}",
            self.gravitational_constant
        );
        ensure!(
            self.time_step.is_finite() && self.time_step > 0.0,
            "time step must be finite and positive, got {}",
            self.time_step
        );
        ensure!(
            self.theta.is_finite() && self.theta >= 0.0,
            "theta must be finite and non-negative, got {}",
            self.theta
        );
        ensure!(self.threads != Some(0), "thread count must be at least 1");
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Dimensions {
    #[default]
    Two,
    Three,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Uniform disc or sphere with random velocities.
    Cloud,
    /// Bodies orbiting a heavy center in a plane.
    #[default]
    RotatingDisc,
    /// Sphere of bodies orbiting a heavy center on random great circles.
    RotatingCloud,
    /// Shell of bodies orbiting a heavy center.
    RotatingBall,
    /// Thick shell at rest.
    Ball,
    /// Shell spinning around the z axis.
    Galaxy,
    SunEarthMoon,
}

/// Parameters of the initial body distribution. Not every preset reads every
/// field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScenarioConfig {
    pub preset: Preset,
    pub dimensions: Dimensions,
    pub body_count: usize,
    pub radius: f64,
    pub max_mass: f64,
    pub center_mass: f64,
    /// Velocity dispersion of the cloud preset.
    pub sigma_v: f64,
    /// Rim speed of the galaxy preset.
    pub velocity: f64,
    pub clockwise: bool,
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            dimensions: Dimensions::default(),
            body_count: 2000,
            radius: 1000.0,
            max_mass: 1.0,
            center_mass: 1e6,
            sigma_v: 0.1,
            velocity: 1.0,
            clockwise: false,
            seed: 0,
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.radius.is_finite() && self.radius > 0.0,
            "scenario radius must be positive, got {}",
            self.radius
        );
        ensure!(
            self.max_mass.is_finite() && self.max_mass > 0.0,
            "max mass must be positive, got {}",
            self.max_mass
        );
        ensure!(
            self.center_mass.is_finite() && self.center_mass > 0.0,
            "center mass must be positive, got {}",
            self.center_mass
        );
        ensure!(
            self.sigma_v.is_finite() && self.sigma_v >= 0.0,
            "velocity dispersion must be non-negative, got {}",
            self.sigma_v
        );
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Ticks to simulate before stopping.
    pub ticks: u64,
    /// Milliseconds between stats reports.
    pub report_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: 1000,
            report_interval_ms: 1000,
        }
    }
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults if the file
    /// doesn't exist. A file that exists but does not parse is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.physics.validate().context("invalid [physics] section")?;
        self.scenario.validate().context("invalid [scenario] section")?;
        Ok(())
    }
}
