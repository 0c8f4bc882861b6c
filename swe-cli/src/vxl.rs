//! Plain-text voxel scene import.
//!
//! One voxel per line as `x y z rrggbb`; `#` starts a comment line. Colours:
//!
//! - `000000` base plate, whose extent sets the grid and whose top sets level 0
//! - `8f563b` terrain
//! - `639bff` water
//! - `fbf236` water that also feeds a source (one unit of intensity per voxel)
//!
//! Voxel `x` maps to the grid row and `y` to the column.

use std::error::Error;
use std::fs;
use std::path::Path;

use swe_core::InitialCondition;

const BASE: &str = "000000";
const TERRAIN: &str = "8f563b";
const WATER: &str = "639bff";
const SOURCE: &str = "fbf236";

struct Voxel<'a> {
    x: i64,
    y: i64,
    z: i64,
    color: &'a str,
}

pub fn load(path: &Path) -> Result<InitialCondition, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    parse(&text).map_err(|e| format!("{}: {e}", path.display()).into())
}

pub fn parse(text: &str) -> Result<InitialCondition, Box<dyn Error>> {
    let mut voxels = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let &[x, y, z, color] = parts.as_slice() else {
            return Err(format!("line {}: expected `x y z color`", lineno + 1).into());
        };
        let coord = |s: &str| -> Result<i64, String> {
            s.parse()
                .map_err(|e| format!("line {}: bad coordinate {s:?}: {e}", lineno + 1))
        };
        voxels.push(Voxel {
            x: coord(x)?,
            y: coord(y)?,
            z: coord(z)?,
            color: color.trim_start_matches('#'),
        });
    }

    let base = voxels.iter().filter(|v| v.color.eq_ignore_ascii_case(BASE));
    let (mut xmin, mut ymin, mut xmax, mut ymax, mut top) =
        (i64::MAX, i64::MAX, i64::MIN, i64::MIN, i64::MIN);
    for v in base {
        xmin = xmin.min(v.x);
        ymin = ymin.min(v.y);
        xmax = xmax.max(v.x);
        ymax = ymax.max(v.y);
        top = top.max(v.z);
    }
    if top == i64::MIN {
        return Err("scene has no base plate voxels".into());
    }

    let rows = (xmax - xmin + 1) as usize;
    let cols = (ymax - ymin + 1) as usize;
    let cell = |v: &Voxel| -> Option<(usize, usize)> {
        let inside = (xmin..=xmax).contains(&v.x) && (ymin..=ymax).contains(&v.y);
        inside.then(|| ((v.x - xmin) as usize, (v.y - ymin) as usize))
    };

    let mut ic = InitialCondition::flat(rows, cols, 0.0);
    for v in voxels.iter().filter(|v| v.color.eq_ignore_ascii_case(TERRAIN)) {
        if let Some((r, c)) = cell(v) {
            let k = r * cols + c;
            ic.terrain[k] = ic.terrain[k].max((v.z - top) as f64);
        }
    }

    for v in &voxels {
        let is_source = v.color.eq_ignore_ascii_case(SOURCE);
        if !(is_source || v.color.eq_ignore_ascii_case(WATER)) {
            continue;
        }
        let Some((r, c)) = cell(v) else { continue };
        let k = r * cols + c;
        let depth = (v.z - top) as f64 - ic.terrain[k];
        ic.water[k] = ic.water[k].max(depth);
        if is_source {
            ic.add_source(r, c, 1.0);
        }
    }

    Ok(ic)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = "\
# goxel export
0 0 0 000000
0 1 0 000000
1 0 0 000000
1 1 0 000000
2 0 0 000000
2 1 0 000000
0 0 1 8f563b
0 0 2 8f563b
1 1 1 639bff
1 1 2 639bff
2 0 3 fbf236
2 0 1 fbf236
";

    #[test]
    fn reads_extent_terrain_water_and_sources() {
        let ic = parse(SCENE).unwrap();
        assert_eq!((ic.rows, ic.cols), (3, 2));
        assert_eq!(ic.terrain[0], 2.0);
        assert_eq!(ic.water[3], 2.0);
        assert_eq!(ic.water[4], 3.0);
        assert_eq!(ic.sources.get(&(2, 0)), Some(&2.0));
    }

    #[test]
    fn rejects_malformed_lines_and_missing_base() {
        assert!(parse("1 2 3").is_err());
        assert!(parse("0 0 0 639bff\n").is_err());
    }

    #[test]
    fn bad_coordinate_names_its_line() {
        let err = parse("0 0 0 000000\n0 x 1 639bff\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2:"), "got {err}");
    }
}
