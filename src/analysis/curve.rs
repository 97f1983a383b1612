//! Per-curve analysis: monotonicity, saturation, and Tm estimation.

/// Tolerance when deciding whether the derivative changed sign between the
/// curve minimum and maximum (complex-shape detection).
pub const SIGN_CHANGE_THRESH: f64 = 0.000_001;

/// Fraction of the ramp ignored at the hot end when searching for the melt
/// transition; the tail is noisy and gives false positives.
const TAIL_IGNORE_FRACTION: f64 = 0.125;

/// How far (°C) the midpoint cross-check may disagree with the fitted Tm
/// before the curve is called complex.
const MIDPOINT_TOLERANCE: f64 = 5.0;

// ---------------------------------------------------------------------------
// Monotonicity
// ---------------------------------------------------------------------------

/// Whether a curve is monotonically non-increasing, forgiving `forgive` of
/// upward wobble per step. A run of five net contradictions decides the
/// curve does rise somewhere; each well-behaved pair in between pays one
/// contradiction back. Monotone curves have no transition and are excluded
/// from Tm estimation.
pub fn is_monotonic(fluorescence: &[f64], forgive: f64) -> bool {
    let mut contradictions = 0u32;
    let mut prev = fluorescence[0];
    for &point in &fluorescence[1..] {
        if point > prev + forgive {
            contradictions += 1;
        } else if point < prev + forgive && contradictions > 0 {
            contradictions -= 1;
        }
        if contradictions == 5 {
            return false;
        }
        prev = point;
    }
    true
}

// ---------------------------------------------------------------------------
// Saturation
// ---------------------------------------------------------------------------

/// Whether the curve overloaded the sensor: a stretch of ten or more ramp
/// steps sitting flat at the curve maximum (within 0.5 % of the full range).
pub fn is_saturated(fluorescence: &[f64]) -> bool {
    let mut min = fluorescence[0];
    let mut max = fluorescence[0];
    let mut max_idx = 0;
    for (i, &v) in fluorescence.iter().enumerate() {
        if v > max {
            max = v;
            max_idx = i;
        }
        if v < min {
            min = v;
        }
    }
    let low_flat_boundary = max - 0.005 * (max - min);

    let mut count = 0;
    let mut i = max_idx;
    while i > 0 {
        i -= 1;
        if fluorescence[i] > low_flat_boundary {
            count += 1;
        } else {
            break;
        }
    }
    let mut i = max_idx + 1;
    while i < fluorescence.len() {
        if fluorescence[i] > low_flat_boundary {
            count += 1;
            i += 1;
        } else {
            break;
        }
    }
    count >= 10
}

// ---------------------------------------------------------------------------
// Tm estimation
// ---------------------------------------------------------------------------

/// Result of [`estimate_tm`]: the melt temperature, if one was found, and
/// whether the curve shape makes the estimate unreliable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TmEstimate {
    pub tm: Option<f64>,
    pub complex: bool,
}

/// Estimate the melt temperature of a curve.
///
/// The transition is the lowest point of the negative first derivative
/// (ignoring the last 12.5 % of the ramp). A parabola through that point
/// and its two neighbours is minimised on a 0.01 °C grid to refine the
/// estimate. The curve is flagged complex when the derivative changes sign
/// between the curve minimum and maximum, or when a midpoint-crossing
/// estimate disagrees with the fitted Tm by more than 5 °C.
pub fn estimate_tm(temperatures: &[f64], fluorescence: &[f64]) -> TmEstimate {
    let n = fluorescence.len();
    if n < 4 {
        return TmEstimate { tm: None, complex: true };
    }

    // Negative first derivative, indexed by the left temperature of each step.
    let deriv: Vec<f64> = (0..n - 1)
        .map(|i| -(fluorescence[i + 1] - fluorescence[i]) / (temperatures[i + 1] - temperatures[i]))
        .collect();

    let (low_idx, high_idx, lowest, highest) = extremes(fluorescence);
    let sign_change = derivative_sign_change(&deriv, low_idx, high_idx);

    // Lowest derivative point, ignoring the noisy hot tail.
    let ignore = (deriv.len() as f64 * TAIL_IGNORE_FRACTION) as usize;
    let search_len = deriv.len().saturating_sub(ignore).max(1);
    let mut low_val = 0.0;
    let mut low_point: Option<usize> = None;
    for (i, &v) in deriv[..search_len].iter().enumerate() {
        if v < low_val {
            low_val = v;
            low_point = Some(i);
        }
    }

    let Some(idx) = low_point else {
        // No downward slope of the derivative at all: no transition found.
        // Usually the curve gets picked up as monotonic / saturated / noise
        // instead; if not, it stays flagged as complex.
        return TmEstimate { tm: None, complex: true };
    };

    // At the very start, or missing a right-hand neighbour: no fit possible,
    // take the grid point as-is.
    if idx == 0 || idx + 1 >= deriv.len() {
        return TmEstimate {
            tm: Some(temperatures[idx]),
            complex: sign_change,
        };
    }

    // Parabola through the lowest derivative point and its neighbours,
    // minimised on a 0.01 °C grid.
    let xs = [temperatures[idx - 1], temperatures[idx], temperatures[idx + 1]];
    let ys = [deriv[idx - 1], deriv[idx], deriv[idx + 1]];
    let (a, b, c) = fit_parabola(xs, ys);

    let mut tm = temperatures[idx];
    let mut tm_value = 0.0;
    let mut x = xs[0];
    while x < xs[2] {
        let point = a * x * x + b * x + c;
        if point < tm_value {
            tm_value = point;
            tm = x;
        }
        x += 0.01;
    }

    let mut complex = sign_change;

    // Cross-check: walk up from the curve minimum to the half-height point;
    // a large disagreement with the fitted Tm means the shape is complex.
    if let Some(lo) = low_idx {
        let midpoint = (lowest + highest) / 2.0;
        let mut i = lo;
        while i < n && fluorescence[i] < midpoint {
            i += 1;
        }
        if i < n && (temperatures[i] - tm).powi(2) > MIDPOINT_TOLERANCE * MIDPOINT_TOLERANCE {
            complex = true;
        }
    }

    TmEstimate { tm: Some(tm), complex }
}

/// Locate the curve maximum and the minimum on the rising side of it.
/// When the maximum sits at the very start (a falling curve), look for the
/// minimum first and the maximum after it instead.
fn extremes(fluorescence: &[f64]) -> (Option<usize>, Option<usize>, f64, f64) {
    let body = &fluorescence[..fluorescence.len() - 1];

    let mut highest = 0.0;
    let mut high_idx: Option<usize> = None;
    for (i, &v) in body.iter().enumerate() {
        if v > highest {
            highest = v;
            high_idx = Some(i);
        }
    }

    let mut lowest = f64::INFINITY;
    let mut low_idx: Option<usize> = None;
    match high_idx {
        Some(0) | None => {
            highest = 0.0;
            high_idx = None;
            for (i, &v) in body.iter().enumerate() {
                if v < lowest {
                    lowest = v;
                    low_idx = Some(i);
                }
            }
            if let Some(lo) = low_idx {
                for (i, &v) in body.iter().enumerate().skip(lo) {
                    if v > highest {
                        highest = v;
                        high_idx = Some(i);
                    }
                }
            }
        }
        Some(hi) => {
            for (i, &v) in body.iter().enumerate().take(hi + 1) {
                if v < lowest {
                    lowest = v;
                    low_idx = Some(i);
                }
            }
        }
    }
    (low_idx, high_idx, lowest, highest)
}

/// Count derivative sign changes strictly between the curve minimum and
/// maximum, with a small tolerance band around zero.
fn derivative_sign_change(deriv: &[f64], low_idx: Option<usize>, high_idx: Option<usize>) -> bool {
    let (Some(lo), Some(hi)) = (low_idx, high_idx) else {
        return false;
    };
    let mut previous: Option<f64> = None;
    for &d in deriv.iter().take(hi.min(deriv.len())).skip(lo + 1) {
        if let Some(p) = previous {
            if d + SIGN_CHANGE_THRESH < 0.0 && p - SIGN_CHANGE_THRESH > 0.0 {
                return true;
            }
            if d - SIGN_CHANGE_THRESH > 0.0 && p + SIGN_CHANGE_THRESH < 0.0 {
                return true;
            }
        }
        previous = Some(d);
    }
    false
}

/// Fit `y = ax² + bx + c` through three points (Cramer's rule).
fn fit_parabola(x: [f64; 3], y: [f64; 3]) -> (f64, f64, f64) {
    let det = |m: [[f64; 3]; 3]| -> f64 {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let base = [
        [x[0] * x[0], x[0], 1.0],
        [x[1] * x[1], x[1], 1.0],
        [x[2] * x[2], x[2], 1.0],
    ];
    let d = det(base);

    let mut col = base;
    for (row, &yi) in col.iter_mut().zip(y.iter()) {
        row[0] = yi;
    }
    let a = det(col) / d;

    let mut col = base;
    for (row, &yi) in col.iter_mut().zip(y.iter()) {
        row[1] = yi;
    }
    let b = det(col) / d;

    let mut col = base;
    for (row, &yi) in col.iter_mut().zip(y.iter()) {
        row[2] = yi;
    }
    let c = det(col) / d;

    (a, b, c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 25.0 + i as f64).collect()
    }

    /// Normalised logistic melt curve with its transition at `tm`.
    fn sigmoid(temperatures: &[f64], tm: f64) -> Vec<f64> {
        let raw: Vec<f64> = temperatures
            .iter()
            .map(|&t| 0.05 + 1.0 / (1.0 + (-(t - tm) / 2.0).exp()))
            .collect();
        let area: f64 = raw.iter().sum();
        raw.iter().map(|v| v / area).collect()
    }

    #[test]
    fn decreasing_curve_is_monotonic() {
        let curve: Vec<f64> = (0..50).map(|i| 1.0 - 0.01 * i as f64).collect();
        assert!(is_monotonic(&curve, 1e-6));
    }

    #[test]
    fn melt_curve_is_not_monotonic() {
        let temperatures = ramp(70);
        let curve = sigmoid(&temperatures, 60.0);
        assert!(!is_monotonic(&curve, 1e-6));
    }

    #[test]
    fn forgiveness_absorbs_small_wobble() {
        // decreasing overall, with a small genuine rise on every other step
        let curve: Vec<f64> = (0..40)
            .map(|i| 1.0 - 0.01 * i as f64 + if i % 2 == 0 { 0.012 } else { 0.0 })
            .collect();
        assert!(is_monotonic(&curve, 0.003));
    }

    #[test]
    fn flat_top_counts_as_saturated() {
        let mut curve: Vec<f64> = (0..30).map(|i| 0.1 + 0.03 * i as f64).collect();
        curve.extend(std::iter::repeat(1.0).take(15));
        curve.extend((0..10).map(|i| 1.0 - 0.05 * i as f64));
        assert!(is_saturated(&curve));
    }

    #[test]
    fn peaked_melt_curve_is_not_saturated() {
        // logistic rise followed by post-transition decay: the peak is
        // narrow, unlike an overloaded sensor
        let temperatures = ramp(70);
        let curve: Vec<f64> = temperatures
            .iter()
            .map(|&t| {
                let rise = 1.0 / (1.0 + (-(t - 55.0) / 2.0).exp());
                let fall = 1.0 / (1.0 + ((t - 65.0) / 3.0).exp());
                0.05 + rise * fall
            })
            .collect();
        assert!(!is_saturated(&curve));
    }

    #[test]
    fn tm_lands_on_the_inflection() {
        let temperatures = ramp(70);
        let curve = sigmoid(&temperatures, 60.0);
        let estimate = estimate_tm(&temperatures, &curve);
        let tm = estimate.tm.expect("sigmoid must yield a Tm");
        assert!((tm - 60.0).abs() < 1.0, "tm = {tm}");
        assert!(!estimate.complex);
    }

    #[test]
    fn transition_in_the_ignored_tail_is_not_found() {
        let temperatures = ramp(70);
        // perfectly flat until the ignored hot tail, then a steep rise
        let raw: Vec<f64> = temperatures
            .iter()
            .map(|&t| if t < 88.0 { 0.05 } else { 0.05 + (t - 88.0) * 0.1 })
            .collect();
        let area: f64 = raw.iter().sum();
        let curve: Vec<f64> = raw.iter().map(|v| v / area).collect();

        let estimate = estimate_tm(&temperatures, &curve);
        assert_eq!(estimate.tm, None);
    }

    #[test]
    fn double_transition_is_complex() {
        let temperatures = ramp(70);
        // two melts with a dip in between: derivative changes sign
        let raw: Vec<f64> = temperatures
            .iter()
            .map(|&t| {
                0.05 + 1.0 / (1.0 + (-(t - 45.0) / 1.5).exp())
                    - 0.4 / (1.0 + (-(t - 60.0) / 1.5).exp())
                    + 0.8 / (1.0 + (-(t - 75.0) / 1.5).exp())
            })
            .collect();
        let area: f64 = raw.iter().sum();
        let curve: Vec<f64> = raw.iter().map(|v| v / area).collect();

        let estimate = estimate_tm(&temperatures, &curve);
        assert!(estimate.complex);
    }

    #[test]
    fn parabola_fit_recovers_coefficients() {
        let (a, b, c) = fit_parabola([1.0, 2.0, 3.0], [6.0, 11.0, 18.0]);
        // y = x² + 2x + 3
        assert!((a - 1.0).abs() < 1e-9);
        assert!((b - 2.0).abs() < 1e-9);
        assert!((c - 3.0).abs() < 1e-9);
    }
}
