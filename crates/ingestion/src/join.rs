//! Forecast-to-cell join.

use metrics::counter;
use std::collections::HashMap;
use storage::{CellKey, ForecastRow};
use tracing::warn;

use crate::loader::ForecastSample;

/// Forecast rows ready for insert, plus the samples that matched no cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinOutcome {
    pub rows: Vec<ForecastRow>,
    pub mismatches: Vec<ForecastSample>,
}

/// Attach a `cell_id` to every sample by exact centroid match. Samples with
/// no stored cell are left out of `rows`.
pub fn join_cells(samples: &[ForecastSample], cells: &[CellKey]) -> JoinOutcome {
    let lookup: HashMap<(i32, i32), i32> = cells
        .iter()
        .map(|c| ((c.centroid_x, c.centroid_y), c.cell_id))
        .collect();

    let mut outcome = JoinOutcome {
        rows: Vec::with_capacity(samples.len()),
        mismatches: Vec::new(),
    };

    for sample in samples {
        match lookup.get(&(sample.x_m, sample.y_m)) {
            Some(cell_id) => outcome.rows.push(ForecastRow {
                date_forecast_generated: sample.generated,
                date_forecast_for: sample.forecast_for,
                cell_id: *cell_id,
                mean: sample.mean as f32,
                stddev: sample.stddev as f32,
            }),
            None => outcome.mismatches.push(*sample),
        }
    }

    if !outcome.mismatches.is_empty() {
        counter!("icenet_join_mismatches_total").increment(outcome.mismatches.len() as u64);
        warn!(
            mismatches = outcome.mismatches.len(),
            matched = outcome.rows.len(),
            first_x = outcome.mismatches[0].x_m,
            first_y = outcome.mismatches[0].y_m,
            "Forecast samples without a matching cell were skipped"
        );
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::date;

    fn sample(x_m: i32, y_m: i32) -> ForecastSample {
        ForecastSample {
            generated: date(2024, 1, 1),
            forecast_for: date(2024, 1, 2),
            x_m,
            y_m,
            mean: 0.75,
            stddev: 0.125,
        }
    }

    fn cell(cell_id: i32, centroid_x: i32, centroid_y: i32) -> CellKey {
        CellKey {
            cell_id,
            centroid_x,
            centroid_y,
        }
    }

    #[test]
    fn test_matches_on_exact_centroid() {
        let cells = [cell(7, 0, 0), cell(8, 25_000, 0)];
        let outcome = join_cells(&[sample(25_000, 0), sample(0, 0)], &cells);

        assert!(outcome.mismatches.is_empty());
        assert_eq!(outcome.rows.iter().map(|r| r.cell_id).collect::<Vec<_>>(), vec![8, 7]);
        assert_eq!(outcome.rows[0].mean, 0.75f32);
        assert_eq!(outcome.rows[0].stddev, 0.125f32);
        assert_eq!(outcome.rows[0].date_forecast_for, date(2024, 1, 2));
    }

    #[test]
    fn test_unmatched_samples_are_excluded() {
        let cells = [cell(1, 0, 0)];
        let outcome = join_cells(&[sample(0, 0), sample(0, 1), sample(-25_000, 0)], &cells);

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.mismatches, vec![sample(0, 1), sample(-25_000, 0)]);
    }

    #[test]
    fn test_no_cells_means_everything_mismatches() {
        let outcome = join_cells(&[sample(0, 0)], &[]);
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.mismatches.len(), 1);
    }
}
