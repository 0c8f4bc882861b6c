//! Halo filling and bulk velocity damping.
//!
//! Halo cells never hold state of their own: [`BoundaryApplicator::apply`]
//! rewrites each of them from the nearest interior cell on every tick, so
//! applying it twice gives the same halo as applying it once.
//!
//! For a reflective wall with outward normal `n`:
//! - `h_ghost = h_interior`
//! - `(u·n)_ghost = -(u·n)_interior`
//!
//! which makes the half-step mass flux through the wall vanish.

use serde::{Deserialize, Serialize};

use crate::grid::{Field, GridShape};
use crate::state::GridState;

/// How a halo cell is derived from its interior neighbour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Zero-gradient: halo = interior.
    Copy,
    /// No-flux wall for the normal component: halo = -interior.
    Negate,
    /// Sink: halo = 0.
    Zero,
}

impl Policy {
    #[inline]
    fn ghost(self, interior: f64) -> f64 {
        match self {
            Policy::Copy => interior,
            Policy::Negate => -interior,
            Policy::Zero => 0.0,
        }
    }
}

/// Policies for the low and high edge of one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePair {
    pub low: Policy,
    pub high: Policy,
}

impl EdgePair {
    pub const fn both(policy: Policy) -> Self {
        Self {
            low: policy,
            high: policy,
        }
    }
}

/// Edge policies of one field along both axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBoundary {
    /// Rows `0` and `rows + 1`.
    pub axis0: EdgePair,
    /// Columns `0` and `cols + 1`.
    pub axis1: EdgePair,
}

impl FieldBoundary {
    pub const fn uniform(policy: Policy) -> Self {
        Self {
            axis0: EdgePair::both(policy),
            axis1: EdgePair::both(policy),
        }
    }
}

/// Per-field boundary policies, chosen at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub depth: FieldBoundary,
    pub u: FieldBoundary,
    pub v: FieldBoundary,
}

impl BoundaryConfig {
    /// Solid walls on every edge.
    pub const fn reflective() -> Self {
        Self {
            depth: FieldBoundary::uniform(Policy::Copy),
            u: FieldBoundary {
                axis0: EdgePair::both(Policy::Negate),
                axis1: EdgePair::both(Policy::Copy),
            },
            v: FieldBoundary {
                axis0: EdgePair::both(Policy::Copy),
                axis1: EdgePair::both(Policy::Negate),
            },
        }
    }

    /// Zero-gradient outflow on every edge.
    pub const fn open() -> Self {
        Self {
            depth: FieldBoundary::uniform(Policy::Copy),
            u: FieldBoundary::uniform(Policy::Copy),
            v: FieldBoundary::uniform(Policy::Copy),
        }
    }

    /// Water falling off the domain edge is lost.
    pub const fn cliff() -> Self {
        Self {
            depth: FieldBoundary::uniform(Policy::Zero),
            u: FieldBoundary::uniform(Policy::Copy),
            v: FieldBoundary::uniform(Policy::Copy),
        }
    }

    /// True when every depth halo is a sink.
    pub fn is_cliff(&self) -> bool {
        self.depth == FieldBoundary::uniform(Policy::Zero)
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self::reflective()
    }
}

/// Writes halo cells from interior cells and damps velocities.
#[derive(Clone, Debug)]
pub struct BoundaryApplicator {
    config: BoundaryConfig,
    v_damping: f64,
}

impl BoundaryApplicator {
    pub fn new(config: BoundaryConfig, v_damping: f64) -> Self {
        Self { config, v_damping }
    }

    /// Multiplies every velocity by `v_damping`.
    ///
    /// This models bulk energy loss and is not part of the conservation law.
    pub fn damp(&self, state: &mut GridState) {
        if self.v_damping != 1.0 {
            state.u.scale(self.v_damping);
            state.v.scale(self.v_damping);
        }
    }

    /// Rewrites every halo cell of depth and velocity.
    pub fn apply(&self, state: &mut GridState) {
        let shape = state.shape();
        fill_halo(&shape, &mut state.h, self.config.depth);
        fill_halo(&shape, &mut state.u, self.config.u);
        fill_halo(&shape, &mut state.v, self.config.v);
    }
}

/// Fills the halo of `field` according to `policy`.
///
/// Columns are written first over the interior rows, then rows over the full
/// padded width, so corner cells follow the axis-0 policy of the already
/// written column halo.
pub fn fill_halo(shape: &GridShape, field: &mut Field, policy: FieldBoundary) {
    let (rows, cols) = (shape.rows(), shape.cols());
    let last_col = cols + 1;
    let last_row = rows + 1;

    for i in 1..=rows {
        let left = field.get(i, 1);
        let right = field.get(i, cols);
        field.set(i, 0, policy.axis1.low.ghost(left));
        field.set(i, last_col, policy.axis1.high.ghost(right));
    }

    for j in 0..=last_col {
        let top = field.get(1, j);
        let bottom = field.get(rows, j);
        field.set(0, j, policy.axis0.low.ghost(top));
        field.set(last_row, j, policy.axis0.high.ghost(bottom));
    }
}
