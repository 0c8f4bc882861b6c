//! Tick state machine.
//!
//! ```text
//! Idle -> BoundaryApplied -> Integrated -> Stabilized -> VolumeCorrected -> Committed
//! ```
//!
//! `Committed` is the next tick's `Idle`. Any error raised inside a tick moves
//! the stepper to `Halted`, after which [`Stepper::advance`] only returns
//! [`SimError::Halted`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::boundary::BoundaryApplicator;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::grid::{Field, GridShape};
use crate::guard::VolumeGuard;
use crate::kernel::{FluxKernel, Proposal, Scheme};
use crate::stability::StabilityController;
use crate::state::{GridState, InitialCondition};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    BoundaryApplied,
    Integrated,
    Stabilized,
    VolumeCorrected,
    Committed,
    Halted,
}

/// Per-tick bookkeeping returned by [`Stepper::advance`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    /// 1-based index of the tick just committed.
    pub tick: u64,
    /// Simulated time after this tick.
    pub elapsed: f64,
    pub dt_used: f64,
    /// Depth-sum after the tick minus depth-sum before.
    pub diff_volume: f64,
    pub total_volume: f64,
    /// Depth added by sources.
    pub source_volume: f64,
    /// Depth that left through the domain edge (negative when it came in).
    pub boundary_outflow: f64,
    pub max_speed: f64,
    /// `sum |H' - H|` over physical cells.
    pub abs_depth_change: f64,
    pub guard_iterations: usize,
    pub dried_cells: usize,
}

/// Read-only view of the committed state.
pub struct Snapshot<'a> {
    state: &'a GridState,
    dry_threshold: f64,
    pub dt_used: f64,
    pub elapsed: f64,
}

impl Snapshot<'_> {
    pub fn shape(&self) -> GridShape {
        self.state.shape()
    }

    /// Interior depth, row-major.
    pub fn depth(&self) -> Vec<f64> {
        self.shape().interior_values(self.state.depth())
    }

    pub fn u(&self) -> Vec<f64> {
        self.shape().interior_values(self.state.u())
    }

    pub fn v(&self) -> Vec<f64> {
        self.shape().interior_values(self.state.v())
    }

    /// Water surface `H + Z` on wet cells, 0 on dry ones.
    pub fn surface(&self) -> Vec<f64> {
        let shape = self.shape();
        let (h, z) = (self.state.depth(), self.state.bed());
        shape
            .interior()
            .map(|(i, j)| {
                let d = h.get(i, j);
                if d > self.dry_threshold { d + z.get(i, j) } else { 0.0 }
            })
            .collect()
    }

    /// Committed axis-0 face flows in volume per unit time.
    pub fn flow_x(&self) -> &Field {
        self.state.flow_x()
    }

    /// Committed axis-1 face flows in volume per unit time.
    pub fn flow_y(&self) -> &Field {
        self.state.flow_y()
    }

    pub fn volume(&self) -> f64 {
        self.state.volume()
    }
}

/// Owns one simulation and advances it a tick at a time.
pub struct Stepper {
    config: SimConfig,
    state: GridState,
    kernel: Box<dyn FluxKernel>,
    boundary: BoundaryApplicator,
    controller: StabilityController,
    guard: VolumeGuard,
    proposal: Proposal,
    phase: Phase,
    dt: f64,
    dt_used: f64,
    elapsed: f64,
    tick: u64,
}

impl Stepper {
    /// Validates `config` and `ic` and prepares the first tick.
    pub fn new(ic: &InitialCondition, config: SimConfig, scheme: Scheme) -> SimResult<Self> {
        config.validate()?;
        if scheme == Scheme::FlowExchange && !config.boundary.is_cliff() {
            return Err(SimError::IncompatibleBoundary {
                scheme: scheme.as_str(),
                expected: "cliff",
            });
        }
        let mut state = GridState::new(ic)?;
        let boundary = BoundaryApplicator::new(config.boundary, config.v_damping);
        boundary.apply(&mut state);

        let proposal = Proposal::new(&state.shape());
        let controller =
            StabilityController::new(config.dx, config.dt_baseline, config.stability.clone());
        let guard = VolumeGuard::new(&config);
        let dt = config.dt_baseline;
        debug!(
            scheme = scheme.as_str(),
            rows = ic.rows,
            cols = ic.cols,
            volume = state.volume(),
            "stepper ready"
        );

        Ok(Self {
            kernel: scheme.kernel(&config),
            config,
            state,
            boundary,
            controller,
            guard,
            proposal,
            phase: Phase::Idle,
            dt,
            dt_used: 0.0,
            elapsed: 0.0,
            tick: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn scheme(&self) -> Scheme {
        self.kernel.scheme()
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Timestep the next tick starts from.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            state: &self.state,
            dry_threshold: self.guard.dry_threshold(),
            dt_used: self.dt_used,
            elapsed: self.elapsed,
        }
    }

    /// Runs one full tick and commits it.
    pub fn advance(&mut self) -> SimResult<TickSummary> {
        if self.phase == Phase::Halted {
            return Err(SimError::Halted);
        }
        self.enter(Phase::Idle);
        match self.run_tick() {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.enter(Phase::Halted);
                Err(err)
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        trace!(tick = self.tick + 1, from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    fn run_tick(&mut self) -> SimResult<TickSummary> {
        let shape = self.state.shape();

        self.boundary.damp(&mut self.state);
        self.boundary.apply(&mut self.state);
        self.enter(Phase::BoundaryApplied);

        let before = self.state.volume();
        self.enter(Phase::Integrated);
        let stable = self.controller.stabilize(
            self.kernel.as_ref(),
            &self.state,
            self.dt,
            &mut self.proposal,
        )?;
        self.enter(Phase::Stabilized);

        let report = self.guard.apply(&shape, &mut self.proposal)?;
        self.enter(Phase::VolumeCorrected);

        let boundary_outflow = edge_outflow(&shape, &self.proposal);
        let abs_depth_change: f64 = shape
            .interior()
            .map(|(i, j)| (self.proposal.h.get(i, j) - self.state.h.get(i, j)).abs())
            .sum();
        let source_volume = self.proposal.injected;
        self.commit(stable.dt);

        let total_volume = self.state.volume();
        let summary = TickSummary {
            tick: self.tick,
            elapsed: self.elapsed,
            dt_used: stable.dt,
            diff_volume: total_volume - before,
            total_volume,
            source_volume,
            boundary_outflow,
            max_speed: stable.max_speed,
            abs_depth_change,
            guard_iterations: report.iterations,
            dried_cells: report.dried_cells,
        };
        debug!(
            tick = summary.tick,
            dt = summary.dt_used,
            volume = summary.total_volume,
            diff = summary.diff_volume,
            max_speed = summary.max_speed,
            evaluations = stable.evaluations,
            relaxed = report.relaxed_cells,
            "tick committed"
        );
        Ok(summary)
    }

    /// Swaps the corrected proposal into the state.
    fn commit(&mut self, dt: f64) {
        let p = &mut self.proposal;
        let s = &mut self.state;
        std::mem::swap(&mut s.h, &mut p.h);
        std::mem::swap(&mut s.u, &mut p.u);
        std::mem::swap(&mut s.v, &mut p.v);

        let to_flow = self.config.dx * self.config.dx / dt;
        s.flow_x.copy_from(&p.flux_x);
        s.flow_x.scale(to_flow);
        s.flow_y.copy_from(&p.flux_y);
        s.flow_y.scale(to_flow);
        let shape = s.shape();
        self.guard
            .settle_dry_flows(&shape, &s.h, &mut s.flow_x, &mut s.flow_y);

        self.dt = dt;
        self.dt_used = dt;
        self.elapsed += dt;
        self.tick += 1;
        self.enter(Phase::Committed);
    }
}

/// Net depth moved out through the domain edge by `p`.
fn edge_outflow(shape: &GridShape, p: &Proposal) -> f64 {
    let (rows, cols) = (shape.rows(), shape.cols());
    let mut out = 0.0;
    for j in 1..=cols {
        out += p.flux_x.get(rows + 1, j) - p.flux_x.get(1, j);
    }
    if shape.is_two_dimensional() {
        for i in 1..=rows {
            out += p.flux_y.get(i, cols + 1) - p.flux_y.get(i, 1);
        }
    }
    out
}
