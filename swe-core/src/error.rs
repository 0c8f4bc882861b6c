//! Error type shared by every stage of the integrator.

use thiserror::Error;

/// Errors raised while building or stepping a simulation.
///
/// Configuration variants are only produced before the first tick. The
/// remaining variants are fatal to the run: once one is returned the
/// stepper refuses further ticks with [`SimError::Halted`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Zero-size grid or a rank that does not fit the requested extent.
    #[error("invalid grid {rows}x{cols}: {reason}")]
    InvalidGrid {
        rows: usize,
        cols: usize,
        reason: &'static str,
    },

    /// An input array does not cover the grid.
    #[error("{field} has {actual} values, expected {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A source sits outside the physical domain.
    #[error("source at ({row}, {col}) is outside the grid")]
    SourceOutOfBounds { row: usize, col: usize },

    /// A scalar parameter is out of its admissible range.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// The boundary policy does not fit the integration scheme.
    #[error("{scheme} scheme needs {expected} edges")]
    IncompatibleBoundary {
        scheme: &'static str,
        expected: &'static str,
    },

    /// Velocities left the recoverable range; the scheme has blown up.
    #[error("speed blowup: max speed {max_speed} at dt {dt}")]
    Divergence { max_speed: f64, dt: f64 },

    /// The CFL recovery loop halved `dt` as often as allowed without success.
    #[error("timestep underflow: dt {dt} after {halvings} halvings")]
    TimestepUnderflow { dt: f64, halvings: u32 },

    /// The volume guard could not remove every overdraft.
    #[error(
        "volume guard did not converge after {iterations} iterations \
         ({violations} cells still overdrawn)"
    )]
    GuardExhausted { iterations: usize, violations: usize },

    /// Overdraft bookkeeping is inconsistent.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A previous tick failed fatally.
    #[error("simulation halted by an earlier fatal error")]
    Halted,
}

impl SimError {
    pub(crate) fn parameter(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }

    /// True for errors that end the run rather than reject a configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Divergence { .. }
                | Self::TimestepUnderflow { .. }
                | Self::GuardExhausted { .. }
                | Self::Invariant(_)
                | Self::Halted
        )
    }
}

pub type SimResult<T> = Result<T, SimError>;
