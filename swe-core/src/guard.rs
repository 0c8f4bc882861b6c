//! Non-negative depth enforcement.
//!
//! A proposal may ask a cell to ship more water than it holds. The guard
//! relaxes such overdrafts one cell at a time: the draining faces of an
//! overdrawn cell are scaled by
//!
//! ```text
//! s = 1 - overdraft / sum(|draining flux|)
//! ```
//!
//! which leaves the cell exactly empty. Scaling only ever reduces what a
//! neighbour receives, so the sweep repeats until no cell is below
//! `-tolerance` or the iteration cap is hit.
//!
//! Afterwards cells under `dry_threshold` are snapped to zero with their
//! velocity, and cells on either side of a scaled face have their velocity
//! clamped to what the corrected fluxes can carry.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::grid::{Field, GridShape};
use crate::kernel::Proposal;

/// Outcome of the flux relaxation loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relaxation {
    /// No cell is overdrawn any more.
    Converged { iterations: usize, relaxed_cells: usize },
    /// The sweep cap ran out with cells still overdrawn.
    Exhausted { iterations: usize, violations: usize },
}

/// What the guard changed in one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardReport {
    pub iterations: usize,
    /// Cells whose draining faces were scaled.
    pub relaxed_cells: usize,
    /// Cells snapped to zero depth.
    pub dried_cells: usize,
    /// Depth removed by the dry snap (negative if it filled a hole).
    pub dried_volume: f64,
    pub clamped_velocities: usize,
}

/// Post-processor that keeps every committed depth non-negative.
#[derive(Clone, Debug)]
pub struct VolumeGuard {
    tolerance: f64,
    max_iterations: usize,
    dry_threshold: f64,
    dx: f64,
}

/// `(axis, row, col, flux)` of one face.
type Face = (u8, usize, usize, f64);

impl VolumeGuard {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            tolerance: config.guard.tolerance,
            max_iterations: config.guard.max_iterations,
            dry_threshold: config.dry_threshold,
            dx: config.dx,
        }
    }

    pub fn dry_threshold(&self) -> f64 {
        self.dry_threshold
    }

    #[inline]
    pub fn is_dry(&self, depth: f64) -> bool {
        depth < self.dry_threshold || depth <= 0.0
    }

    /// Scales draining faces until no interior cell is overdrawn.
    ///
    /// Both cells of every scaled face are flagged in `touched`, indexed
    /// row-major over the padded grid.
    pub fn relax(
        &self,
        shape: &GridShape,
        proposal: &mut Proposal,
        touched: &mut [bool],
    ) -> SimResult<Relaxation> {
        let cols = shape.padded_cols();
        let mut warned = vec![false; touched.len()];
        let mut relaxed = vec![false; touched.len()];
        let mut relaxed_cells = 0;

        for sweep in 0..self.max_iterations {
            let mut changed = false;
            for (i, j) in shape.interior() {
                let depth = proposal.depth_at(i, j);
                if depth >= -self.tolerance {
                    continue;
                }

                let drains = draining_faces(proposal, i, j);
                let drain: f64 = drains.iter().flatten().map(|&(_, _, _, q)| q.abs()).sum();
                if drain <= 0.0 {
                    if !warned[i * cols + j] {
                        warn!(row = i, col = j, overdraft = -depth, "overdrawn cell has no draining face");
                        warned[i * cols + j] = true;
                    }
                    continue;
                }

                let factor = 1.0 - (-depth) / drain;
                if factor < 0.0 {
                    error!(row = i, col = j, factor, "negative drain scale");
                    return Err(SimError::Invariant(format!(
                        "negative drain scale {factor} at cell ({i}, {j})"
                    )));
                }
                for (axis, fi, fj, q) in drains.into_iter().flatten() {
                    let (faces, lo) = if axis == 0 {
                        (&mut proposal.flux_x, (fi - 1) * cols + fj)
                    } else {
                        (&mut proposal.flux_y, fi * cols + fj - 1)
                    };
                    faces.set(fi, fj, q * factor);
                    touched[lo] = true;
                    touched[fi * cols + fj] = true;
                }

                if !relaxed[i * cols + j] {
                    relaxed[i * cols + j] = true;
                    relaxed_cells += 1;
                }
                changed = true;
            }

            if !changed {
                return Ok(Relaxation::Converged {
                    iterations: sweep + 1,
                    relaxed_cells,
                });
            }
        }

        let violations = shape
            .interior()
            .filter(|&(i, j)| proposal.depth_at(i, j) < -self.tolerance)
            .filter(|&(i, j)| draining_faces(proposal, i, j).iter().any(Option::is_some))
            .count();
        if violations == 0 {
            return Ok(Relaxation::Converged {
                iterations: self.max_iterations,
                relaxed_cells,
            });
        }
        Ok(Relaxation::Exhausted {
            iterations: self.max_iterations,
            violations,
        })
    }

    /// Relaxes overdrafts, refreshes depth, dries thin cells and clamps
    /// velocities in `proposal`.
    pub fn apply(&self, shape: &GridShape, proposal: &mut Proposal) -> SimResult<GuardReport> {
        let mut touched = vec![false; shape.padded_rows() * shape.padded_cols()];
        let (iterations, relaxed_cells) = match self.relax(shape, proposal, &mut touched)? {
            Relaxation::Converged {
                iterations,
                relaxed_cells,
            } => (iterations, relaxed_cells),
            Relaxation::Exhausted {
                iterations,
                violations,
            } => {
                error!(iterations, violations, "volume guard exhausted");
                return Err(SimError::GuardExhausted {
                    iterations,
                    violations,
                });
            }
        };
        proposal.refresh_depth(shape);

        let mut report = GuardReport {
            iterations,
            relaxed_cells,
            ..GuardReport::default()
        };
        let cols = shape.padded_cols();
        let dx_dt = self.dx / proposal.dt;
        for (i, j) in shape.interior() {
            let depth = proposal.h.get(i, j);
            if self.is_dry(depth) {
                if depth != 0.0 {
                    report.dried_cells += 1;
                    report.dried_volume += depth;
                }
                proposal.h.set(i, j, 0.0);
                proposal.u.set(i, j, 0.0);
                proposal.v.set(i, j, 0.0);
                continue;
            }
            if !touched[i * cols + j] {
                continue;
            }

            let carrier = depth.max(self.dry_threshold);
            let qx = (proposal.flux_x.get(i, j) + proposal.flux_x.get(i + 1, j)) / 2.0;
            report.clamped_velocities += clamp(&mut proposal.u, i, j, qx.abs() * dx_dt / carrier);
            if shape.is_two_dimensional() {
                let qy = (proposal.flux_y.get(i, j) + proposal.flux_y.get(i, j + 1)) / 2.0;
                report.clamped_velocities += clamp(&mut proposal.v, i, j, qy.abs() * dx_dt / carrier);
            }
        }
        Ok(report)
    }

    /// Zeroes committed flows that leave a dry cell.
    pub fn settle_dry_flows(
        &self,
        shape: &GridShape,
        depth: &Field,
        flow_x: &mut Field,
        flow_y: &mut Field,
    ) {
        for (i, j) in shape.interior() {
            if !self.is_dry(depth.get(i, j)) {
                continue;
            }
            if flow_x.get(i, j) < 0.0 {
                flow_x.set(i, j, 0.0);
            }
            if flow_x.get(i + 1, j) > 0.0 {
                flow_x.set(i + 1, j, 0.0);
            }
            if flow_y.get(i, j) < 0.0 {
                flow_y.set(i, j, 0.0);
            }
            if flow_y.get(i, j + 1) > 0.0 {
                flow_y.set(i, j + 1, 0.0);
            }
        }
    }
}

/// Faces draining cell `(i, j)`.
fn draining_faces(p: &Proposal, i: usize, j: usize) -> [Option<Face>; 4] {
    let x_lo = p.flux_x.get(i, j);
    let x_hi = p.flux_x.get(i + 1, j);
    let y_lo = p.flux_y.get(i, j);
    let y_hi = p.flux_y.get(i, j + 1);
    [
        (x_lo < 0.0).then_some((0, i, j, x_lo)),
        (x_hi > 0.0).then_some((0, i + 1, j, x_hi)),
        (y_lo < 0.0).then_some((1, i, j, y_lo)),
        (y_hi > 0.0).then_some((1, i, j + 1, y_hi)),
    ]
}

/// Truncates `|field(i, j)|` to `bound`, keeping the sign. Returns 1 if clamped.
fn clamp(field: &mut Field, i: usize, j: usize, bound: f64) -> usize {
    let value = field.get(i, j);
    if value.abs() > bound {
        field.set(i, j, bound.copysign(value));
        1
    } else {
        0
    }
}
