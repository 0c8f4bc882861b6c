//! Adaptive timestep control.
//!
//! The controller probes the kernel instead of predicting a stable `dt`:
//!
//! - if `max_speed * dt < dx / 2` and `2 dt <= dt_baseline * grow_margin`,
//!   `dt` doubles once;
//! - while `max_speed * dt > dx` and the speed is still below
//!   `divergence_speed`, `dt` halves;
//! - a speed at or above `divergence_speed` (or a non-finite one) is a blowup.

use tracing::{debug, error};

use crate::config::StabilityConfig;
use crate::error::{SimError, SimResult};
use crate::kernel::{FluxKernel, Proposal};
use crate::state::GridState;

/// Result of one stabilised kernel evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stabilized {
    pub dt: f64,
    pub max_speed: f64,
    pub evaluations: u32,
}

/// CFL-style probe-and-adjust controller.
#[derive(Clone, Debug)]
pub struct StabilityController {
    dx: f64,
    dt_baseline: f64,
    config: StabilityConfig,
}

impl StabilityController {
    pub fn new(dx: f64, dt_baseline: f64, config: StabilityConfig) -> Self {
        Self {
            dx,
            dt_baseline,
            config,
        }
    }

    /// Evaluates `kernel` from `dt`, adjusting it until the proposal in `out`
    /// honours `max_speed * dt <= dx`.
    ///
    /// On success `out` holds the proposal for the returned `dt`.
    pub fn stabilize(
        &self,
        kernel: &dyn FluxKernel,
        state: &GridState,
        dt: f64,
        out: &mut Proposal,
    ) -> SimResult<Stabilized> {
        let mut dt = dt.min(self.dt_baseline);
        kernel.propose(state, dt, out);
        let mut evaluations = 1;

        let grown = dt * 2.0;
        let grow_limit = self.dt_baseline * self.config.grow_margin;
        if out.max_speed * dt < self.dx / 2.0 && grown <= grow_limit {
            debug!(from = dt, to = grown, "doubling timestep");
            dt = grown;
            kernel.propose(state, dt, out);
            evaluations += 1;
        }

        let mut halvings = 0;
        while out.max_speed * dt > self.dx && out.max_speed < self.config.divergence_speed {
            if halvings == self.config.max_halvings {
                error!(dt, halvings, max_speed = out.max_speed, "timestep underflow");
                return Err(SimError::TimestepUnderflow { dt, halvings });
            }
            dt /= 2.0;
            halvings += 1;
            debug!(dt, max_speed = out.max_speed, "halving timestep");
            kernel.propose(state, dt, out);
            evaluations += 1;
        }

        if !out.max_speed.is_finite() || out.max_speed >= self.config.divergence_speed {
            error!(max_speed = out.max_speed, dt, "speed blowup");
            return Err(SimError::Divergence {
                max_speed: out.max_speed,
                dt,
            });
        }

        Ok(Stabilized {
            dt,
            max_speed: out.max_speed,
            evaluations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Scheme;
    use crate::state::InitialCondition;

    /// Kernel whose speed is `c / dt^p`, to drive the controller directly.
    struct Probe {
        c: f64,
        p: f64,
    }

    impl FluxKernel for Probe {
        fn scheme(&self) -> Scheme {
            Scheme::Momentum
        }

        fn propose(&self, _state: &GridState, dt: f64, out: &mut Proposal) {
            out.dt = dt;
            out.max_speed = self.c / dt.powf(self.p);
        }
    }

    fn fixture() -> (GridState, Proposal) {
        let state = GridState::new(&InitialCondition::line(3, 1.0)).unwrap();
        let out = Proposal::new(&state.shape());
        (state, out)
    }

    #[test]
    fn doubles_only_below_the_baseline_margin() {
        let (state, mut out) = fixture();
        let ctl = StabilityController::new(0.1, 0.01, StabilityConfig::default());
        let probe = Probe { c: 1.0, p: 0.0 };

        let r = ctl.stabilize(&probe, &state, 0.005, &mut out).unwrap();
        assert_eq!(r.dt, 0.01);
        let r = ctl.stabilize(&probe, &state, 0.01, &mut out).unwrap();
        assert_eq!(r.dt, 0.01);
    }

    #[test]
    fn halves_until_courant_bound_holds() {
        let (state, mut out) = fixture();
        let ctl = StabilityController::new(0.1, 0.01, StabilityConfig::default());
        let probe = Probe { c: 30.0, p: 0.0 };

        let r = ctl.stabilize(&probe, &state, 0.01, &mut out).unwrap();
        assert_eq!(r.dt, 0.0025);
        assert!(r.max_speed * r.dt <= 0.1);
    }

    #[test]
    fn blowup_is_divergence() {
        let (state, mut out) = fixture();
        let ctl = StabilityController::new(0.1, 0.01, StabilityConfig::default());
        let probe = Probe { c: 5e3, p: 0.0 };

        let err = ctl.stabilize(&probe, &state, 0.01, &mut out).unwrap_err();
        assert!(matches!(err, SimError::Divergence { .. }));
    }

    #[test]
    fn runaway_halving_is_underflow() {
        let (state, mut out) = fixture();
        let cfg = StabilityConfig {
            max_halvings: 4,
            ..StabilityConfig::default()
        };
        let ctl = StabilityController::new(0.1, 0.01, cfg);
        // speed grows as dt shrinks, so halving never catches up
        let probe = Probe { c: 0.2, p: 1.0 };

        let err = ctl.stabilize(&probe, &state, 0.01, &mut out).unwrap_err();
        assert_eq!(err, SimError::TimestepUnderflow { dt: 0.01 / 16.0, halvings: 4 });
    }
}
