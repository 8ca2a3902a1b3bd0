//! Utility functions
use crate::AdvFloat;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use ndarray_stats::QuantileExt;

pub fn l2_norm(x: ArrayView1<AdvFloat>) -> AdvFloat {
    x.dot(&x).sqrt()
}

pub fn row_norms(x: &ArrayView2<AdvFloat>) -> Array1<AdvFloat> {
    x.map_axis(Axis(1), l2_norm)
}

/// First index of the largest entry of every row. Rows with NaNs map to 0.
pub fn argmax_rows(x: &ArrayView2<AdvFloat>) -> Array1<usize> {
    x.map_axis(Axis(1), |row| row.argmax().unwrap_or(0))
}

/// Index of the largest entry of `row` other than `exclude`, first index on ties.
pub fn best_other_class(row: ArrayView1<AdvFloat>, exclude: usize) -> usize {
    row.iter()
        .enumerate()
        .filter(|&(idx, _)| idx != exclude)
        .fold(None, |best: Option<(usize, AdvFloat)>, (idx, &val)| match best {
            Some((_, best_val)) if val <= best_val || val.is_nan() => best,
            _ => Some((idx, val)),
        })
        .map_or(0, |(idx, _)| idx)
}

/// Largest `|d_i . d_j|` over distinct rows of `directions`; 0 for fewer than two rows.
pub fn max_pairwise_overlap(directions: &ArrayView2<AdvFloat>) -> AdvFloat {
    let gram = directions.dot(&directions.t());
    let mut worst: AdvFloat = 0.;
    for ((i, j), &v) in gram.indexed_iter() {
        if i != j {
            worst = worst.max(v.abs());
        }
    }
    worst
}
