//! Simulation arrays and the initial condition they are built from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::boundary::{FieldBoundary, Policy, fill_halo};
use crate::error::{SimError, SimResult};
use crate::grid::{Field, GridShape, Rank};

/// A cell that gains water at a fixed rate every tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Padded row.
    pub row: usize,
    /// Padded column.
    pub col: usize,
    pub intensity: f64,
}

/// Interior-only description of a starting grid.
///
/// All arrays are row-major over `rows * cols` physical cells and indexed
/// with 0-based interior coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialCondition {
    pub rows: usize,
    pub cols: usize,
    pub rank: Rank,
    pub terrain: Vec<f64>,
    pub water: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub sources: BTreeMap<(usize, usize), f64>,
}

impl InitialCondition {
    /// Flat bed covered by `depth` of still water.
    pub fn flat(rows: usize, cols: usize, depth: f64) -> Self {
        Self::with_rank(rows, cols, Rank::Two, depth)
    }

    /// Rank-1 channel of `n` cells.
    pub fn line(n: usize, depth: f64) -> Self {
        Self::with_rank(n, 1, Rank::One, depth)
    }

    fn with_rank(rows: usize, cols: usize, rank: Rank, depth: f64) -> Self {
        let n = rows * cols;
        Self {
            rows,
            cols,
            rank,
            terrain: vec![0.0; n],
            water: vec![depth; n],
            u: vec![0.0; n],
            v: vec![0.0; n],
            sources: BTreeMap::new(),
        }
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn set_water(&mut self, row: usize, col: usize, depth: f64) {
        let idx = self.index(row, col);
        self.water[idx] = depth;
    }

    pub fn set_terrain(&mut self, row: usize, col: usize, elevation: f64) {
        let idx = self.index(row, col);
        self.terrain[idx] = elevation;
    }

    pub fn set_velocity(&mut self, row: usize, col: usize, u: f64, v: f64) {
        let idx = self.index(row, col);
        self.u[idx] = u;
        self.v[idx] = v;
    }

    /// Sets `depth` on the half-open interior rectangle `rows x cols`.
    pub fn fill_water(
        &mut self,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
        depth: f64,
    ) {
        for r in rows {
            for c in cols.clone() {
                self.set_water(r, c, depth);
            }
        }
    }

    /// Intensities at the same cell accumulate.
    pub fn add_source(&mut self, row: usize, col: usize, intensity: f64) {
        *self.sources.entry((row, col)).or_insert(0.0) += intensity;
    }

    pub fn shape(&self) -> SimResult<GridShape> {
        GridShape::new(self.rows, self.cols, self.rank)
    }

    /// Depth summed over every cell.
    pub fn volume(&self) -> f64 {
        self.water.iter().sum()
    }
}

/// The arrays the integrator advances.
///
/// Cell fields are padded (see [`crate::grid`]). `z` is fixed after
/// construction. `flow_x`/`flow_y` carry the last committed face fluxes in
/// volume per unit time; the flow-exchange scheme reads them back as state.
#[derive(Clone, Debug)]
pub struct GridState {
    shape: GridShape,
    pub(crate) h: Field,
    pub(crate) z: Field,
    pub(crate) u: Field,
    pub(crate) v: Field,
    pub(crate) flow_x: Field,
    pub(crate) flow_y: Field,
    sources: Vec<Source>,
}

impl GridState {
    pub fn new(ic: &InitialCondition) -> SimResult<Self> {
        let shape = ic.shape()?;
        let n = shape.cell_count();
        check_len("terrain", n, &ic.terrain)?;
        check_len("water", n, &ic.water)?;
        check_len("u", n, &ic.u)?;
        check_len("v", n, &ic.v)?;

        if let Some(bad) = ic.water.iter().find(|d| !(**d >= 0.0 && d.is_finite())) {
            return Err(SimError::parameter(
                "water",
                *bad,
                "initial depth must be finite and non-negative",
            ));
        }
        if let Some(bad) = ic
            .terrain
            .iter()
            .chain(&ic.u)
            .chain(&ic.v)
            .find(|x| !x.is_finite())
        {
            return Err(SimError::parameter(
                "initial condition",
                *bad,
                "terrain and velocity must be finite",
            ));
        }

        let mut sources = Vec::with_capacity(ic.sources.len());
        for (&(row, col), &intensity) in &ic.sources {
            if row >= shape.rows() || col >= shape.cols() {
                return Err(SimError::SourceOutOfBounds { row, col });
            }
            if !(intensity >= 0.0 && intensity.is_finite()) {
                return Err(SimError::parameter(
                    "source intensity",
                    intensity,
                    "must be finite and non-negative",
                ));
            }
            sources.push(Source {
                row: row + 1,
                col: col + 1,
                intensity,
            });
        }

        let mut h = shape.cells();
        let mut z = shape.cells();
        let mut u = shape.cells();
        let mut v = shape.cells();
        for (k, (i, j)) in shape.interior().enumerate() {
            h.set(i, j, ic.water[k]);
            z.set(i, j, ic.terrain[k]);
            u.set(i, j, ic.u[k]);
            if shape.is_two_dimensional() {
                v.set(i, j, ic.v[k]);
            }
        }
        // Bed elevation is static, so its halo is mirrored once here.
        fill_halo(&shape, &mut z, FieldBoundary::uniform(Policy::Copy));

        Ok(Self {
            shape,
            h,
            z,
            u,
            v,
            flow_x: shape.faces_x(),
            flow_y: shape.faces_y(),
            sources,
        })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn depth(&self) -> &Field {
        &self.h
    }

    pub fn bed(&self) -> &Field {
        &self.z
    }

    pub fn u(&self) -> &Field {
        &self.u
    }

    pub fn v(&self) -> &Field {
        &self.v
    }

    pub fn flow_x(&self) -> &Field {
        &self.flow_x
    }

    pub fn flow_y(&self) -> &Field {
        &self.flow_y
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Depth summed over physical cells.
    pub fn volume(&self) -> f64 {
        self.shape.interior_sum(&self.h)
    }

    /// Largest velocity component over physical cells.
    pub fn max_speed(&self) -> f64 {
        self.shape
            .interior_max_abs(&self.u)
            .max(self.shape.interior_max_abs(&self.v))
    }
}

fn check_len(field: &'static str, expected: usize, values: &[f64]) -> SimResult<()> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(SimError::ShapeMismatch {
            field,
            expected,
            actual: values.len(),
        })
    }
}
