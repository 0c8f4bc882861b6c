use clap::ValueEnum;
use rand::Rng;
use serde::Serialize;
use swe_core::{InitialCondition, Rank};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IcType {
    Flat,
    DamBreak,
    Bump,
    Random,
    Basin,
    Vxl,
}

impl IcType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcType::Flat => "flat",
            IcType::DamBreak => "dam-break",
            IcType::Bump => "bump",
            IcType::Random => "random",
            IcType::Basin => "basin",
            IcType::Vxl => "vxl",
        }
    }
}

fn blank(rows: usize, cols: usize, rank: Rank, depth: f64) -> InitialCondition {
    match rank {
        Rank::One => InitialCondition::line(rows, depth),
        Rank::Two => InitialCondition::flat(rows, cols, depth),
    }
}

/// Builds a procedural initial condition. Rank-1 grids ignore `cols`.
///
/// `IcType::Vxl` has no procedural form and yields a still pool.
pub fn generate_ic<R: Rng>(
    rng: &mut R,
    rows: usize,
    cols: usize,
    rank: Rank,
    ic: IcType,
) -> InitialCondition {
    let cols = if rank == Rank::One { 1 } else { cols };

    match ic {
        IcType::Flat | IcType::Vxl => blank(rows, cols, rank, 0.5),

        IcType::DamBreak => {
            // raised quadrant (or left half of a channel) over a thin film
            let mut out = blank(rows, cols, rank, 0.05);
            let col_end = if rank == Rank::One { 1 } else { cols.div_ceil(2) };
            out.fill_water(0..rows.div_ceil(2), 0..col_end, 1.0);
            out
        }

        IcType::Bump => {
            // gaussian hill under a level water surface
            let mut out = blank(rows, cols, rank, 0.0);
            let cx = rng.gen_range(0.3..0.7) * (rows as f64 - 1.0);
            let cy = rng.gen_range(0.3..0.7) * (cols as f64 - 1.0);
            let sigma = rng.gen_range(0.1..0.25) * rows.max(cols) as f64;
            let amp = rng.gen_range(0.3..0.8);
            let level = 0.6;

            for r in 0..rows {
                for c in 0..cols {
                    let dx = r as f64 - cx;
                    let dy = c as f64 - cy;
                    let z = amp * (-0.5 * (dx * dx + dy * dy) / (sigma * sigma)).exp();
                    out.set_terrain(r, c, z);
                    out.set_water(r, c, (level - z).max(0.0));
                }
            }
            out
        }

        IcType::Random => {
            let mut out = blank(rows, cols, rank, 0.0);
            let noise: Vec<f64> = (0..rows * cols).map(|_| rng.gen_range(0.0..1.0)).collect();
            let smooth = box_blur(&noise, rows, cols, 2);
            let peak = smooth.iter().cloned().fold(0.0, f64::max);
            for (k, d) in smooth.into_iter().enumerate() {
                let depth = if peak > 0.0 { 0.8 * d / peak } else { 0.0 };
                out.water[k] = depth;
            }
            out
        }

        IcType::Basin => {
            // raised rim around a shallow pond fed from its centre
            let mut out = blank(rows, cols, rank, 0.2);
            for r in 0..rows {
                for c in 0..cols {
                    let rim = r == 0 || r == rows - 1 || (rank == Rank::Two && (c == 0 || c == cols - 1));
                    if rim {
                        out.set_terrain(r, c, 2.0);
                        out.set_water(r, c, 0.0);
                    }
                }
            }
            let centre_col = if rank == Rank::One { 0 } else { cols / 2 };
            out.add_source(rows / 2, centre_col, 1.0);
            out
        }
    }
}

fn box_blur(src: &[f64], rows: usize, cols: usize, passes: usize) -> Vec<f64> {
    let mut cur = src.to_vec();
    let mut tmp = vec![0.0f64; rows * cols];

    for _ in 0..passes {
        for r in 0..rows {
            for c in 0..cols {
                let mut sum = 0.0;
                let mut cnt = 0.0;
                for rr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
                    for cc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                        sum += cur[rr * cols + cc];
                        cnt += 1.0;
                    }
                }
                tmp[r * cols + c] = sum / cnt;
            }
        }
        std::mem::swap(&mut cur, &mut tmp);
    }
    cur
}
