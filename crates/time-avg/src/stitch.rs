//! Placement of reduced partial grids into the global grid.

use tracing::{debug, warn};

use crate::grid::{GlobalGrid, GridCell};
use crate::reduce::SumCountGrid;

/// Write each result's averages and counts into `grid`.
///
/// A result's block starts at the global cell holding its minimum
/// latitude/longitude. The whole block is written, so where blocks overlap
/// the later one wins. Cells that fall outside the global grid are clipped
/// and fully masked results are skipped. Returns the number of cells written.
pub fn stitch(results: &[SumCountGrid], grid: &mut GlobalGrid) -> usize {
    let spec = *grid.spec();
    let mut written = 0;

    for result in results {
        if result.is_fully_masked() {
            warn!(bounds = %result.bounds.bbox, "Skipping fully masked result");
            continue;
        }

        let row0 = spec.lat_offset(result.bounds.bbox.min_lat);
        let col0 = spec.lon_offset(result.bounds.bbox.min_lon);
        let averages = result.averages();
        let (rows, cols) = result.shape();

        for r in 0..rows {
            let Ok(row) = usize::try_from(row0 + r as i64) else {
                continue;
            };
            for c in 0..cols {
                let Ok(col) = usize::try_from(col0 + c as i64) else {
                    continue;
                };
                let i = r * cols + c;
                let cell = GridCell {
                    avg: averages[i],
                    cnt: result.count()[i],
                };
                if grid.set(row, col, cell) {
                    written += 1;
                }
            }
        }
    }

    debug!(results = results.len(), cells = written, "Stitched results into global grid");
    written
}
