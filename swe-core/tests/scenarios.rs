//! End-to-end runs of the stepper on small hand-built grids.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use swe_core::{
    BoundaryConfig, GridShape, InitialCondition, Proposal, Scheme, SimConfig, SimError, Stepper,
    VolumeGuard,
};

fn run(stepper: &mut Stepper, ticks: usize) -> Vec<swe_core::TickSummary> {
    (0..ticks)
        .map(|_| stepper.advance().expect("tick failed"))
        .collect()
}

fn min_depth(stepper: &Stepper) -> f64 {
    stepper
        .snapshot()
        .depth()
        .into_iter()
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn pool_in_a_channel_spreads_and_keeps_its_volume() {
    let mut ic = InitialCondition::line(20, 0.0);
    ic.fill_water(5..12, 0..1, 0.5);
    let mut stepper = Stepper::new(&ic, SimConfig::momentum(), Scheme::Momentum).unwrap();
    let initial = stepper.snapshot().volume();
    assert!((initial - 3.5).abs() < 1e-12);

    for _ in 0..1000 {
        stepper.advance().unwrap();
        assert!(min_depth(&stepper) >= 0.0);
    }

    let depth = stepper.snapshot().depth();
    let volume: f64 = depth.iter().sum();
    assert!((volume - 3.5).abs() / 3.5 < 0.01, "volume drifted to {volume}");
    assert!(depth[4] > 1e-3 && depth[12] > 1e-3, "pool did not spread: {depth:?}");
    let peak = depth.iter().cloned().fold(0.0, f64::max);
    assert!(peak <= 0.55, "overshoot to {peak}");
}

#[test]
fn drained_cell_is_emptied_exactly() {
    let cfg = SimConfig::momentum();
    let shape = GridShape::plane(3, 3).unwrap();
    let mut p = Proposal::new(&shape);
    p.dt = cfg.dt_baseline;
    for (i, j) in shape.interior() {
        p.base.set(i, j, 1.0);
    }
    p.base.set(2, 2, 0.1);
    // all four faces ask for 0.05, twice what the centre holds
    p.flux_x.set(2, 2, -0.05);
    p.flux_x.set(3, 2, 0.05);
    p.flux_y.set(2, 2, -0.05);
    p.flux_y.set(2, 3, 0.05);

    VolumeGuard::new(&cfg).apply(&shape, &mut p).unwrap();

    let drained = [
        p.flux_x.get(2, 2).abs(),
        p.flux_x.get(3, 2).abs(),
        p.flux_y.get(2, 2).abs(),
        p.flux_y.get(2, 3).abs(),
    ];
    for q in drained {
        assert!((q - 0.025).abs() < 1e-12);
    }
    assert_eq!(p.h.get(2, 2), 0.0);

    let to_flow = cfg.dx * cfg.dx / p.dt;
    let shipped: f64 = drained.iter().map(|q| q * to_flow).sum();
    assert!((shipped - 0.1 * to_flow).abs() < 1e-12);
}

#[test]
fn runaway_velocity_is_divergence() {
    let mut ic = InitialCondition::flat(5, 5, 1.0);
    ic.set_velocity(2, 2, 2000.0, 0.0);
    let mut stepper = Stepper::new(&ic, SimConfig::momentum(), Scheme::Momentum).unwrap();

    let err = stepper.advance().unwrap_err();
    assert!(matches!(err, SimError::Divergence { .. }), "got {err:?}");
    assert_eq!(stepper.advance().unwrap_err(), SimError::Halted);
}

#[test]
fn closed_basin_conserves_volume() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut ic = InitialCondition::flat(8, 8, 0.0);
    for r in 0..8 {
        for c in 0..8 {
            ic.set_water(r, c, rng.gen_range(0.5..1.0));
        }
    }
    let cfg = SimConfig::momentum()
        .with_dry_threshold(0.0)
        .with_boundary(BoundaryConfig::reflective());
    let mut stepper = Stepper::new(&ic, cfg, Scheme::Momentum).unwrap();
    let initial = stepper.snapshot().volume();

    for summary in run(&mut stepper, 200) {
        assert!(summary.diff_volume.abs() <= 1e-9 * initial);
        assert_eq!(summary.dried_cells, 0);
    }
    let volume = stepper.snapshot().volume();
    assert!((volume - initial).abs() <= 1e-9 * initial);
}

#[test]
fn dry_snap_loss_stays_below_threshold_times_cells() {
    // a film close to the dry threshold around a raised quadrant
    let mut ic = InitialCondition::flat(10, 10, 0.02);
    ic.fill_water(0..5, 0..5, 0.4);
    let cfg = SimConfig::momentum().with_dry_threshold(0.01);
    let bound = cfg.dry_threshold * 100.0;
    let mut stepper = Stepper::new(&ic, cfg, Scheme::Momentum).unwrap();

    for summary in run(&mut stepper, 300) {
        assert!(summary.diff_volume.abs() <= bound + 1e-9);
        assert!(min_depth(&stepper) >= 0.0);
    }
}

#[test]
fn source_volume_is_accounted() {
    let mut ic = InitialCondition::flat(6, 6, 0.3);
    ic.add_source(2, 3, 1.0);
    let cfg = SimConfig::momentum().with_dry_threshold(0.0);
    let rate = cfg.source_rate;
    let mut stepper = Stepper::new(&ic, cfg, Scheme::Momentum).unwrap();
    let initial = stepper.snapshot().volume();

    let summaries = run(&mut stepper, 100);
    let total_dt: f64 = summaries.iter().map(|s| s.dt_used).sum();
    let injected: f64 = summaries.iter().map(|s| s.source_volume).sum();
    let expected = initial + rate * total_dt;

    assert!((injected - rate * total_dt).abs() < 1e-12);
    assert!((stepper.snapshot().volume() - expected).abs() < 1e-9);
}

#[test]
fn walled_basin_keeps_everything_its_source_adds() {
    let n = 7;
    let mut ic = InitialCondition::flat(n, n, 0.0);
    for k in 0..n {
        ic.set_terrain(0, k, 10.0);
        ic.set_terrain(n - 1, k, 10.0);
        ic.set_terrain(k, 0, 10.0);
        ic.set_terrain(k, n - 1, 10.0);
    }
    ic.add_source(3, 3, 1.0);
    let cfg = SimConfig::flow_exchange().with_dry_threshold(0.0);
    let mut stepper = Stepper::new(&ic, cfg, Scheme::FlowExchange).unwrap();

    let summaries = run(&mut stepper, 200);
    let injected: f64 = summaries.iter().map(|s| s.source_volume).sum();
    assert!((stepper.snapshot().volume() - injected).abs() < 1e-9);
    assert!(summaries.iter().all(|s| s.boundary_outflow.abs() < 1e-12));

    // water has spread off the source cell but never onto the wall
    let depth = stepper.snapshot().depth();
    assert!(depth[2 * n + 3] > 0.0);
    assert_eq!(depth[3], 0.0);
}

#[test]
fn flat_pool_drains_over_the_cliff() {
    let ic = InitialCondition::flat(5, 5, 1.0);
    let cfg = SimConfig::flow_exchange().with_dry_threshold(0.0);
    let mut stepper = Stepper::new(&ic, cfg, Scheme::FlowExchange).unwrap();

    let mut last = stepper.snapshot().volume();
    for summary in run(&mut stepper, 100) {
        assert!(summary.total_volume <= last + 1e-12);
        assert!((summary.diff_volume + summary.boundary_outflow).abs() < 1e-9);
        assert!(min_depth(&stepper) >= 0.0);
        last = summary.total_volume;
    }
    assert!(last < 25.0);
}

#[test]
fn committed_speed_respects_the_courant_bound() {
    let mut ic = InitialCondition::flat(10, 10, 0.1);
    ic.fill_water(0..4, 0..4, 1.0);
    let cfg = SimConfig::momentum();
    let dx = cfg.dx;
    let mut stepper = Stepper::new(&ic, cfg, Scheme::Momentum).unwrap();

    for summary in run(&mut stepper, 200) {
        assert!(summary.max_speed * summary.dt_used <= dx);
        assert!(stepper.state().max_speed() * summary.dt_used <= dx);
    }
}
