//! Shallow-water and flow-exchange grid integrator.

pub mod boundary;
pub mod config;
pub mod error;
pub mod grid;
pub mod guard;
pub mod kernel;
pub mod stability;
pub mod state;
pub mod stepper;

pub use boundary::{BoundaryApplicator, BoundaryConfig, EdgePair, FieldBoundary, Policy};
pub use config::{GuardConfig, SimConfig, StabilityConfig};
pub use error::{SimError, SimResult};
pub use grid::{Field, GridShape, Rank};
pub use guard::{GuardReport, Relaxation, VolumeGuard};
pub use kernel::{ExchangeKernel, FluxKernel, MomentumKernel, Proposal, Scheme};
pub use stability::{StabilityController, Stabilized};
pub use state::{GridState, InitialCondition, Source};
pub use stepper::{Phase, Snapshot, Stepper, TickSummary};
