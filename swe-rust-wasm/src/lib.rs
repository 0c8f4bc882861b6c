use swe_core::{InitialCondition, Scheme, SimConfig, SimError, Stepper};
use wasm_bindgen::prelude::*;

fn js_err(e: SimError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_scheme(name: &str) -> Result<Scheme, JsValue> {
    match name {
        "momentum" => Ok(Scheme::Momentum),
        "exchange" | "flow_exchange" => Ok(Scheme::FlowExchange),
        other => Err(JsValue::from_str(&format!("unknown scheme `{other}`"))),
    }
}

fn to_f32(values: impl IntoIterator<Item = f64>) -> Vec<f32> {
    values.into_iter().map(|v| v as f32).collect()
}

#[wasm_bindgen]
pub struct Simulation {
    ic: InitialCondition,
    config: SimConfig,
    scheme: Scheme,
    // rebuilt by `finalize` whenever the scene or a parameter changes
    stepper: Option<Stepper>,
}

#[wasm_bindgen]
impl Simulation {
    #[wasm_bindgen(constructor)]
    pub fn new(rows: usize, cols: usize, scheme: &str) -> Result<Simulation, JsValue> {
        let scheme = parse_scheme(scheme)?;
        let ic = if cols == 1 {
            InitialCondition::line(rows, 0.0)
        } else {
            InitialCondition::flat(rows, cols, 0.0)
        };
        ic.shape().map_err(js_err)?;
        let config = match scheme {
            Scheme::Momentum => SimConfig::momentum(),
            Scheme::FlowExchange => SimConfig::flow_exchange(),
        };
        Ok(Simulation {
            ic,
            config,
            scheme,
            stepper: None,
        })
    }

    // Parameters
    pub fn set_g(&mut self, g: f64) { self.configure(|c| c.with_g(g)); }
    pub fn set_dx(&mut self, dx: f64) { self.configure(|c| c.with_dx(dx)); }
    pub fn set_dt(&mut self, dt: f64) { self.configure(|c| c.with_dt_baseline(dt)); }
    pub fn set_damping(&mut self, d: f64) { self.configure(|c| c.with_v_damping(d)); }
    pub fn set_dry_threshold(&mut self, t: f64) { self.configure(|c| c.with_dry_threshold(t)); }

    pub fn rows(&self) -> usize { self.ic.rows }
    pub fn cols(&self) -> usize { self.ic.cols }

    // Scene editing (0-based interior cells, out-of-range writes are ignored)
    pub fn set_water(&mut self, row: usize, col: usize, depth: f64) {
        if row >= self.ic.rows || col >= self.ic.cols { return; }
        self.ic.set_water(row, col, depth.max(0.0));
        self.stepper = None;
    }

    pub fn set_terrain(&mut self, row: usize, col: usize, elevation: f64) {
        if row >= self.ic.rows || col >= self.ic.cols { return; }
        self.ic.set_terrain(row, col, elevation);
        self.stepper = None;
    }

    pub fn set_velocity(&mut self, row: usize, col: usize, u: f64, v: f64) {
        if row >= self.ic.rows || col >= self.ic.cols { return; }
        self.ic.set_velocity(row, col, u, v);
        self.stepper = None;
    }

    pub fn add_source(&mut self, row: usize, col: usize, intensity: f64) {
        if row >= self.ic.rows || col >= self.ic.cols { return; }
        self.ic.add_source(row, col, intensity);
        self.stepper = None;
    }

    pub fn finalize(&mut self) -> Result<(), JsValue> {
        let stepper = Stepper::new(&self.ic, self.config.clone(), self.scheme).map_err(js_err)?;
        self.stepper = Some(stepper);
        Ok(())
    }

    // Step + timing (WASM-only)
    pub fn step(&mut self, ticks: u32) -> Result<StepInfo, JsValue> {
        if self.stepper.is_none() {
            self.finalize()?;
        }
        let Some(stepper) = self.stepper.as_mut() else {
            return Err(JsValue::from_str("simulation is not finalized"));
        };

        let t0 = now_ms();
        let mut dt = 0.0;
        for _ in 0..ticks {
            dt = stepper.advance().map_err(js_err)?.dt_used;
        }
        let t1 = now_ms();
        Ok(StepInfo {
            ticks,
            dt,
            volume: stepper.snapshot().volume(),
            compute_ms: t1 - t0,
        })
    }

    pub fn elapsed(&self) -> f64 {
        self.stepper.as_ref().map_or(0.0, |s| s.elapsed())
    }

    // Copy-based JS access (reliable)
    pub fn get_depth(&self) -> Vec<f32> {
        match &self.stepper {
            Some(s) => to_f32(s.snapshot().depth()),
            None => to_f32(self.ic.water.iter().copied()),
        }
    }

    pub fn get_surface(&self) -> Vec<f32> {
        match &self.stepper {
            Some(s) => to_f32(s.snapshot().surface()),
            None => to_f32(self.ic.water.iter().zip(&self.ic.terrain).map(|(h, z)| {
                if *h > self.config.dry_threshold { h + z } else { 0.0 }
            })),
        }
    }

    /// Axis-0 face flows, `(rows + 3) x (cols + 2)` row-major.
    pub fn get_flow_x(&self) -> Vec<f32> {
        self.stepper
            .as_ref()
            .map(|s| to_f32(s.snapshot().flow_x().as_slice().iter().copied()))
            .unwrap_or_default()
    }

    /// Axis-1 face flows, `(rows + 2) x (cols + 3)` row-major.
    pub fn get_flow_y(&self) -> Vec<f32> {
        self.stepper
            .as_ref()
            .map(|s| to_f32(s.snapshot().flow_y().as_slice().iter().copied()))
            .unwrap_or_default()
    }
}

impl Simulation {
    fn configure(&mut self, f: impl FnOnce(SimConfig) -> SimConfig) {
        self.config = f(self.config.clone());
        self.stepper = None;
    }
}

#[wasm_bindgen]
pub struct StepInfo {
    ticks: u32,
    dt: f64,
    volume: f64,
    compute_ms: f64,
}

#[wasm_bindgen]
impl StepInfo {
    pub fn ticks(&self) -> u32 { self.ticks }
    pub fn dt(&self) -> f64 { self.dt }
    pub fn volume(&self) -> f64 { self.volume }
    pub fn compute_ms(&self) -> f64 { self.compute_ms }
}

fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

