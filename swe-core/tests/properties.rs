//! Property-based checks of the integrator invariants.
//!
//! - committed depth is never negative, for both schemes
//! - committed speed never crosses more than one cell per tick
//! - boundary application is idempotent

use proptest::prelude::*;
use swe_core::{
    BoundaryApplicator, BoundaryConfig, GridState, InitialCondition, Scheme, SimConfig, Stepper,
};

const TICKS: usize = 25;

/// Grid extent plus one value per cell.
fn grid(values: std::ops::Range<f64>) -> impl Strategy<Value = (usize, usize, Vec<f64>)> {
    (2usize..7, 2usize..7).prop_flat_map(move |(rows, cols)| {
        (
            Just(rows),
            Just(cols),
            prop::collection::vec(values.clone(), rows * cols),
        )
    })
}

/// Random depths with some cells left dry.
fn patchy_water() -> impl Strategy<Value = (usize, usize, Vec<f64>)> {
    grid(-0.3..0.8).prop_map(|(rows, cols, raw)| {
        let water = raw.into_iter().map(|d| d.max(0.0)).collect();
        (rows, cols, water)
    })
}

fn initial(rows: usize, cols: usize, water: Vec<f64>) -> InitialCondition {
    let mut ic = InitialCondition::flat(rows, cols, 0.0);
    ic.water = water;
    ic
}

fn boundary_preset() -> impl Strategy<Value = BoundaryConfig> {
    prop_oneof![
        Just(BoundaryConfig::reflective()),
        Just(BoundaryConfig::open()),
        Just(BoundaryConfig::cliff()),
    ]
}

fn all_non_negative(stepper: &Stepper) -> bool {
    stepper.snapshot().depth().iter().all(|&d| d >= 0.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn momentum_depth_stays_non_negative((rows, cols, water) in patchy_water()) {
        let ic = initial(rows, cols, water);
        let mut stepper = Stepper::new(&ic, SimConfig::momentum(), Scheme::Momentum).unwrap();
        for _ in 0..TICKS {
            stepper.advance().unwrap();
            prop_assert!(all_non_negative(&stepper));
        }
    }

    #[test]
    fn exchange_depth_stays_non_negative(
        (rows, cols, water) in patchy_water(),
        terrain in prop::collection::vec(0.0f64..2.0, 36),
        source in (0usize..2, 0usize..2, 0.0f64..3.0),
    ) {
        let mut ic = initial(rows, cols, water);
        ic.terrain = terrain[..rows * cols].to_vec();
        ic.add_source(source.0, source.1, source.2);
        let mut stepper =
            Stepper::new(&ic, SimConfig::flow_exchange(), Scheme::FlowExchange).unwrap();
        for _ in 0..TICKS {
            stepper.advance().unwrap();
            prop_assert!(all_non_negative(&stepper));
        }
    }

    #[test]
    fn momentum_speed_respects_courant_bound((rows, cols, water) in grid(0.2..1.0)) {
        let ic = initial(rows, cols, water);
        let cfg = SimConfig::momentum();
        let dx = cfg.dx;
        let mut stepper = Stepper::new(&ic, cfg, Scheme::Momentum).unwrap();
        for _ in 0..TICKS {
            let summary = stepper.advance().unwrap();
            prop_assert!(stepper.state().max_speed() * summary.dt_used <= dx);
        }
    }

    #[test]
    fn boundary_application_is_idempotent(
        (rows, cols, water) in grid(0.0..1.0),
        velocity in prop::collection::vec(-2.0f64..2.0, 72),
        config in boundary_preset(),
    ) {
        let mut ic = initial(rows, cols, water);
        let n = rows * cols;
        ic.u = velocity[..n].to_vec();
        ic.v = velocity[36..36 + n].to_vec();
        let applicator = BoundaryApplicator::new(config, 0.9);

        let mut once = GridState::new(&ic).unwrap();
        applicator.apply(&mut once);
        let mut twice = once.clone();
        applicator.apply(&mut twice);

        prop_assert_eq!(once.depth(), twice.depth());
        prop_assert_eq!(once.u(), twice.u());
        prop_assert_eq!(once.v(), twice.v());
    }
}
