//! Replicate handling: curve distances, outlier rejection, and the small
//! statistics used throughout the pipeline.

/// Floor applied before taking logs so zero readings stay finite.
const LOG_FLOOR: f64 = 1e-12;

/// Sum of squared differences between two curves in log space. Used both
/// for replicate outlier rejection and for the no-dye / no-protein control
/// checks.
pub fn sqr_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let lx = x.max(LOG_FLOOR).ln();
            let ly = y.max(LOG_FLOOR).ln();
            (lx - ly).powi(2)
        })
        .sum()
}

/// Mean and population standard deviation. The deviation is `None` for
/// fewer than two values; both are `None` for an empty slice.
pub fn mean_sd(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), None);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (Some(mean), Some(var.sqrt()))
}

/// Point-wise mean of a set of equal-length curves.
pub fn mean_curve(curves: &[&[f64]]) -> Vec<f64> {
    let n = curves.len() as f64;
    let len = curves[0].len();
    let mut mean = vec![0.0; len];
    for curve in curves {
        for (slot, value) in mean.iter_mut().zip(curve.iter()) {
            *slot += value;
        }
    }
    for slot in &mut mean {
        *slot /= n;
    }
    mean
}

/// Decide which members of a replicate group to keep, given the pairwise
/// distance matrix. While any pair of kept curves is further apart than the
/// threshold, the curve with the largest mean distance to the rest of the
/// kept set is dropped. At least one curve always survives.
pub fn discard_bad(group_len: usize, dist: &[Vec<f64>], threshold: f64) -> Vec<usize> {
    let mut kept: Vec<usize> = (0..group_len).collect();
    while kept.len() > 1 {
        let worst_pair = kept
            .iter()
            .flat_map(|&i| kept.iter().map(move |&j| (i, j)))
            .filter(|&(i, j)| i < j)
            .map(|(i, j)| dist[i][j])
            .fold(0.0_f64, f64::max);
        if worst_pair <= threshold {
            break;
        }
        // Drop the member furthest from everything else on average.
        let (worst_idx, _) = kept
            .iter()
            .enumerate()
            .map(|(pos, &i)| {
                let total: f64 = kept.iter().filter(|&&j| j != i).map(|&j| dist[i][j]).sum();
                (pos, total / (kept.len() - 1) as f64)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        kept.remove(worst_idx);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_sd_handles_empty_and_singleton() {
        assert_eq!(mean_sd(&[]), (None, None));
        assert_eq!(mean_sd(&[3.5]), (Some(3.5), None));
    }

    #[test]
    fn mean_sd_matches_population_deviation() {
        let (mean, sd) = mean_sd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, Some(5.0));
        assert!((sd.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn mean_curve_averages_pointwise() {
        let a = [1.0, 2.0, 3.0];
        let b = [3.0, 4.0, 5.0];
        assert_eq!(mean_curve(&[&a, &b]), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn sqr_diff_is_zero_for_identical_curves() {
        let a = [0.5, 0.6, 0.7];
        assert_eq!(sqr_diff(&a, &a), 0.0);
        assert!(sqr_diff(&a, &[0.5, 0.6, 1.4]) > 0.0);
    }

    #[test]
    fn discard_bad_keeps_consistent_groups() {
        // three close curves: every pairwise distance below threshold
        let dist = vec![
            vec![0.0, 0.2, 0.3],
            vec![0.2, 0.0, 0.1],
            vec![0.3, 0.1, 0.0],
        ];
        assert_eq!(discard_bad(3, &dist, 1.0), vec![0, 1, 2]);
    }

    #[test]
    fn discard_bad_drops_the_outlier() {
        // member 2 is far from both others
        let dist = vec![
            vec![0.0, 0.2, 5.0],
            vec![0.2, 0.0, 6.0],
            vec![5.0, 6.0, 0.0],
        ];
        assert_eq!(discard_bad(3, &dist, 1.0), vec![0, 1]);
    }

    #[test]
    fn discard_bad_never_empties_the_group() {
        let dist = vec![vec![0.0, 9.0], vec![9.0, 0.0]];
        assert_eq!(discard_bad(2, &dist, 1.0).len(), 1);
    }
}
