//! Generators for synthetic coordinate axes, values and masks.
//!
//! These create predictable, verifiable patterns that can be used across
//! the test suite.

/// A regular coordinate axis of `n` sample centers starting at `first`.
pub fn regular_axis(first: f64, resolution: f64, n: usize) -> Vec<Option<f64>> {
    (0..n).map(|i| Some(first + i as f64 * resolution)).collect()
}

/// Creates a `[t, y, x]` cube with predictable values.
///
/// Each sample is `t * 1_000_000 + x * 1000 + y`, so a value read back
/// identifies exactly where it came from.
///
/// # Example
///
/// ```
/// use test_utils::create_test_cube;
///
/// let cube = create_test_cube(2, 3, 4);
/// assert_eq!(cube.len(), 24);
/// assert_eq!(cube[1], Some(1000.0));  // t=0, y=0, x=1
/// assert_eq!(cube[4], Some(1.0));     // t=0, y=1, x=0
/// assert_eq!(cube[12], Some(1_000_000.0));
/// ```
pub fn create_test_cube(nt: usize, ny: usize, nx: usize) -> Vec<Option<f32>> {
    let mut data = Vec::with_capacity(nt * ny * nx);
    for t in 0..nt {
        for y in 0..ny {
            for x in 0..nx {
                data.push(Some((t * 1_000_000 + x * 1000 + y) as f32));
            }
        }
    }
    data
}

/// A cube of `len` samples all equal to `value`.
pub fn constant_cube(len: usize, value: f32) -> Vec<Option<f32>> {
    vec![Some(value); len]
}

/// Mask every `period`-th sample (starting with the first).
pub fn mask_every(samples: &mut [Option<f32>], period: usize) {
    if period == 0 {
        return;
    }
    for sample in samples.iter_mut().step_by(period) {
        *sample = None;
    }
}
