//! Grid cell geometry.
//!
//! Every cell is a rectangle centred on an axis point, half a mean grid step
//! wide on each side. Rings are emitted in native projection metres; the
//! WGS84 copy is produced by PostGIS when the cell is inserted.

use icenet_common::Progress;
use std::fmt::Write;
use storage::CellRow;
use tracing::{debug, info};

use crate::error::{IngestionError, Result};

/// Cells built between progress log lines.
const PROGRESS_INTERVAL: usize = 50_000;

/// Half the mean absolute spacing of an axis.
pub fn half_step(axis: &[i32]) -> Result<f64> {
    if axis.len() < 2 {
        return Err(IngestionError::InvalidGrid(format!(
            "an axis needs at least 2 points to define a cell size, got {}",
            axis.len()
        )));
    }
    let total: f64 = axis
        .windows(2)
        .map(|w| (f64::from(w[1]) - f64::from(w[0])).abs())
        .sum();
    Ok(0.5 * total / (axis.len() - 1) as f64)
}

/// Closed ring starting at the upper-left corner, clockwise.
pub fn ring(x: f64, y: f64, dx: f64, dy: f64) -> [(f64, f64); 5] {
    [
        (x - dx, y + dy),
        (x + dx, y + dy),
        (x + dx, y - dy),
        (x - dx, y - dy),
        (x - dx, y + dy),
    ]
}

pub fn polygon_wkt(points: &[(f64, f64)]) -> String {
    let mut wkt = String::with_capacity(16 + points.len() * 40);
    wkt.push_str("POLYGON((");
    for (i, (x, y)) in points.iter().enumerate() {
        if i > 0 {
            wkt.push(',');
        }
        // Writing to a String cannot fail
        let _ = write!(wkt, "{x} {y}");
    }
    wkt.push_str("))");
    wkt
}

/// One row per `(x, y)`, x outer and y inner.
pub fn build_cells(x: &[i32], y: &[i32]) -> Result<Vec<CellRow>> {
    let dx = half_step(x)?;
    let dy = half_step(y)?;
    debug!(dx, dy, "Cell half-steps");

    let mut progress = Progress::new(x.len() * y.len());
    let mut cells = Vec::with_capacity(x.len() * y.len());

    for cx in x {
        for cy in y {
            let native = ring(f64::from(*cx), f64::from(*cy), dx, dy);

            cells.push(CellRow {
                centroid_x: *cx,
                centroid_y: *cy,
                wkt_native: polygon_wkt(&native),
            });

            progress.add(1);
            if cells.len() % PROGRESS_INTERVAL == 0 {
                debug!(progress = %progress.snapshot(), "Building cell geometries");
            }
        }
    }

    info!(cells = cells.len(), "Built cell geometries");
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_step_is_mean_of_gaps() {
        assert_eq!(half_step(&[0, 25_000, 50_000]).unwrap(), 12_500.0);
        // Unsorted axes use absolute gaps
        assert_eq!(half_step(&[100_000, -100_000]).unwrap(), 100_000.0);
        assert_eq!(half_step(&[0, 10, 40]).unwrap(), 10.0);
    }

    #[test]
    fn test_half_step_needs_two_points() {
        assert!(matches!(half_step(&[5]), Err(IngestionError::InvalidGrid(_))));
        assert!(half_step(&[]).is_err());
    }

    #[test]
    fn test_ring_is_closed() {
        let r = ring(0.0, 0.0, 1.0, 2.0);
        assert_eq!(r[0], r[4]);
        assert_eq!(r[0], (-1.0, 2.0));
        assert_eq!(r[2], (1.0, -2.0));
    }

    #[test]
    fn test_polygon_wkt() {
        let wkt = polygon_wkt(&ring(0.0, -100_000.0, 100_000.0, 100_000.0));
        assert_eq!(
            wkt,
            "POLYGON((-100000 0,100000 0,100000 -200000,-100000 -200000,-100000 0))"
        );
    }

    #[test]
    fn test_one_cell_per_grid_point() {
        let x = [-200_000, 0, 200_000];
        let y = [-100_000, 100_000];
        let cells = build_cells(&x, &y).unwrap();

        assert_eq!(cells.len(), 6);
        let centroids: Vec<(i32, i32)> = cells.iter().map(|c| (c.centroid_x, c.centroid_y)).collect();
        assert_eq!(
            centroids,
            vec![
                (-200_000, -100_000),
                (-200_000, 100_000),
                (0, -100_000),
                (0, 100_000),
                (200_000, -100_000),
                (200_000, 100_000),
            ]
        );
        for cell in &cells {
            assert!(cell.wkt_native.starts_with("POLYGON(("));
            assert_eq!(cell.wkt_native.split(',').count(), 5);
        }
    }

    #[test]
    fn test_cell_ring_spans_half_steps() {
        let cells = build_cells(&[0, 25_000], &[0, 50_000]).unwrap();
        assert_eq!(
            cells[0].wkt_native,
            "POLYGON((-12500 25000,12500 25000,12500 -25000,-12500 -25000,-12500 25000))"
        );
    }

    #[test]
    fn test_build_cells_rejects_single_point_axis() {
        assert!(matches!(build_cells(&[0], &[0, 1]), Err(IngestionError::InvalidGrid(_))));
    }
}
