//! Scalar parameters of a run.

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryConfig;
use crate::error::{SimError, SimResult};

/// Adaptive timestep limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// `dt` may only double while `2 dt <= dt_baseline * grow_margin`.
    pub grow_margin: f64,
    /// Speeds at or above this are treated as a blowup.
    pub divergence_speed: f64,
    /// Upper bound on halvings inside one tick.
    pub max_halvings: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            grow_margin: 1.1,
            divergence_speed: 1e3,
            max_halvings: 40,
        }
    }
}

/// Volume guard tolerances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Depths above `-tolerance` count as non-negative.
    pub tolerance: f64,
    /// Relaxation sweeps before giving up.
    pub max_iterations: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 1000,
        }
    }
}

/// Process-wide constants of one simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Gravitational acceleration.
    pub g: f64,
    /// Grid spacing, identical along both axes.
    pub dx: f64,
    /// Starting timestep and upper bound for the adaptive one.
    pub dt_baseline: f64,
    /// Velocity retained per tick, in `(0, 1]`.
    pub v_damping: f64,
    /// Depths below this are snapped to zero.
    pub dry_threshold: f64,
    /// Face flow retained per flow-exchange sub-step, in `(0, 1]`.
    pub friction_factor: f64,
    /// Source injection per unit intensity and time.
    pub source_rate: f64,
    /// Flow-exchange sub-steps folded into one `dt_baseline`.
    pub flow_substeps: u32,
    pub boundary: BoundaryConfig,
    pub stability: StabilityConfig,
    pub guard: GuardConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::momentum()
    }
}

impl SimConfig {
    /// Parameters of the predictor-corrector demo: a 2 m tank in 0.1 m cells.
    pub fn momentum() -> Self {
        Self {
            g: 10.0,
            dx: 0.1,
            dt_baseline: 0.01,
            v_damping: 0.99,
            // thin enough that a spreading front survives the snap
            dry_threshold: 1e-3,
            friction_factor: 0.99,
            source_rate: 0.2,
            flow_substeps: 1,
            boundary: BoundaryConfig::reflective(),
            stability: StabilityConfig::default(),
            guard: GuardConfig::default(),
        }
    }

    /// Parameters of the voxel flow-exchange demo: unit cells, slow gravity.
    pub fn flow_exchange() -> Self {
        Self {
            g: 0.1,
            dx: 1.0,
            dt_baseline: 0.5,
            v_damping: 1.0,
            dry_threshold: 1e-3,
            friction_factor: 0.99,
            source_rate: 0.2,
            flow_substeps: 1,
            boundary: BoundaryConfig::cliff(),
            stability: StabilityConfig::default(),
            guard: GuardConfig::default(),
        }
    }

    pub fn with_g(mut self, g: f64) -> Self {
        self.g = g;
        self
    }

    pub fn with_dx(mut self, dx: f64) -> Self {
        self.dx = dx;
        self
    }

    pub fn with_dt_baseline(mut self, dt: f64) -> Self {
        self.dt_baseline = dt;
        self
    }

    pub fn with_v_damping(mut self, damping: f64) -> Self {
        self.v_damping = damping.clamp(0.0, 1.0);
        self
    }

    pub fn with_dry_threshold(mut self, threshold: f64) -> Self {
        self.dry_threshold = threshold.max(0.0);
        self
    }

    pub fn with_friction_factor(mut self, factor: f64) -> Self {
        self.friction_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_source_rate(mut self, rate: f64) -> Self {
        self.source_rate = rate;
        self
    }

    pub fn with_flow_substeps(mut self, substeps: u32) -> Self {
        self.flow_substeps = substeps.max(1);
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryConfig) -> Self {
        self.boundary = boundary;
        self
    }

    /// Length of one flow-exchange sub-step.
    pub fn substep_dt(&self) -> f64 {
        self.dt_baseline / f64::from(self.flow_substeps.max(1))
    }

    /// Rejects parameters the integrator cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        positive("g", self.g)?;
        positive("dx", self.dx)?;
        positive("dt_baseline", self.dt_baseline)?;
        unit_interval("v_damping", self.v_damping)?;
        unit_interval("friction_factor", self.friction_factor)?;
        if !(self.dry_threshold >= 0.0 && self.dry_threshold.is_finite()) {
            return Err(SimError::parameter(
                "dry_threshold",
                self.dry_threshold,
                "must be finite and non-negative",
            ));
        }
        if !(self.source_rate >= 0.0 && self.source_rate.is_finite()) {
            return Err(SimError::parameter(
                "source_rate",
                self.source_rate,
                "must be finite and non-negative",
            ));
        }
        if self.flow_substeps == 0 {
            return Err(SimError::parameter("flow_substeps", 0.0, "must be at least 1"));
        }
        if !(self.stability.grow_margin >= 1.0) {
            return Err(SimError::parameter(
                "stability.grow_margin",
                self.stability.grow_margin,
                "must be at least 1",
            ));
        }
        positive("stability.divergence_speed", self.stability.divergence_speed)?;
        positive("guard.tolerance", self.guard.tolerance)?;
        if self.guard.max_iterations == 0 {
            return Err(SimError::parameter(
                "guard.max_iterations",
                0.0,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> SimResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SimError::parameter(name, value, "must be finite and positive"))
    }
}

fn unit_interval(name: &'static str, value: f64) -> SimResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(SimError::parameter(name, value, "must lie in (0, 1]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        SimConfig::momentum().validate().unwrap();
        SimConfig::flow_exchange().validate().unwrap();
    }

    #[test]
    fn rejects_bad_damping() {
        let mut cfg = SimConfig::momentum();
        cfg.v_damping = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(SimError::InvalidParameter { name: "v_damping", .. })
        ));
    }

    #[test]
    fn rejects_non_positive_dx() {
        let cfg = SimConfig::momentum().with_dx(0.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn substep_divides_baseline() {
        let cfg = SimConfig::flow_exchange()
            .with_dt_baseline(0.5)
            .with_flow_substeps(5);
        assert!((cfg.substep_dt() - 0.1).abs() < 1e-12);
    }
}
