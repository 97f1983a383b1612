//! Control-well checks for the report front page.
//!
//! Three controls are recognised: a lysozyme standard (checked against its
//! reference Tm), and the no-dye / no-protein wells (checked against the
//! bundled reference curves).

use std::fmt;

use crate::data::model::ControlKind;

use super::{replicates, MeltAnalysis, LYSOZYME_TM_MEAN, LYSOZYME_TM_SD, SIMILARITY_THRESHOLD};

/// Reference curves shipped with the tool, recorded as normalised
/// fluorescence over the standard ramp.
const NO_DYE_REFERENCE: &str = include_str!("../../data/no_dye_control.csv");
const NO_PROTEIN_REFERENCE: &str = include_str!("../../data/no_protein_control.csv");

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Failed,
    NotFound,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Passed => write!(f, "Passed"),
            CheckOutcome::Failed => write!(f, "Failed"),
            CheckOutcome::NotFound => write!(f, "Not found"),
        }
    }
}

/// One outcome per recognised control.
#[derive(Debug, Clone, Copy)]
pub struct ControlChecks {
    pub lysozyme: CheckOutcome,
    pub no_dye: CheckOutcome,
    pub no_protein: CheckOutcome,
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Run every control check against the analysed plate.
pub fn run_checks(analysis: &MeltAnalysis) -> ControlChecks {
    ControlChecks {
        lysozyme: lysozyme_check(analysis),
        no_dye: curve_check(analysis, ControlKind::NoDye, NO_DYE_REFERENCE),
        no_protein: curve_check(analysis, ControlKind::NoProtein, NO_PROTEIN_REFERENCE),
    }
}

/// The lysozyme Tm must sit within two standard deviations of the
/// reference value.
fn lysozyme_check(analysis: &MeltAnalysis) -> CheckOutcome {
    let wells = analysis.plate.control_wells(ControlKind::Lysozyme);
    let Some(first) = wells.first() else {
        return CheckOutcome::NotFound;
    };
    let tm = analysis.group_of(first).and_then(|g| g.tm);
    match tm {
        Some(tm)
            if tm > LYSOZYME_TM_MEAN - 2.0 * LYSOZYME_TM_SD
                && tm < LYSOZYME_TM_MEAN + 2.0 * LYSOZYME_TM_SD =>
        {
            CheckOutcome::Passed
        }
        _ => CheckOutcome::Failed,
    }
}

/// The control's mean curve must be within the similarity threshold of the
/// bundled reference curve.
fn curve_check(analysis: &MeltAnalysis, kind: ControlKind, reference: &str) -> CheckOutcome {
    let wells = analysis.plate.control_wells(kind);
    let Some(first) = wells.first() else {
        return CheckOutcome::NotFound;
    };
    let Some(mean_curve) = analysis.group_of(first).and_then(|g| g.mean_curve.as_ref()) else {
        return CheckOutcome::Failed;
    };

    let (ref_temps, ref_values) = parse_reference(reference);
    let expected = resample(&ref_temps, &ref_values, &analysis.plate.temperatures);
    if replicates::sqr_diff(mean_curve, &expected) < SIMILARITY_THRESHOLD {
        CheckOutcome::Passed
    } else {
        CheckOutcome::Failed
    }
}

// ---------------------------------------------------------------------------
// Reference-curve helpers
// ---------------------------------------------------------------------------

/// Parse a bundled `temperature,value` reference file. The files ship with
/// the binary, so a malformed line is a programming error.
fn parse_reference(text: &str) -> (Vec<f64>, Vec<f64>) {
    let mut temps = Vec::new();
    let mut values = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (t, v) = line
            .split_once(',')
            .expect("reference curve line must be 'temperature,value'");
        temps.push(t.trim().parse().expect("reference temperature"));
        values.push(v.trim().parse().expect("reference value"));
    }
    (temps, values)
}

/// Linearly interpolate the reference curve onto the plate's temperature
/// axis, clamping outside the recorded range.
fn resample(ref_temps: &[f64], ref_values: &[f64], targets: &[f64]) -> Vec<f64> {
    targets
        .iter()
        .map(|&t| {
            if t <= ref_temps[0] {
                return ref_values[0];
            }
            if t >= *ref_temps.last().unwrap() {
                return *ref_values.last().unwrap();
            }
            let i = ref_temps.partition_point(|&rt| rt <= t) - 1;
            let span = ref_temps[i + 1] - ref_temps[i];
            let frac = (t - ref_temps[i]) / span;
            ref_values[i] + frac * (ref_values[i + 1] - ref_values[i])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::analysis::analyse;
    use crate::data::model::{Plate, Well, WellContents};

    fn contents(condition: &str) -> WellContents {
        let control = ControlKind::from_condition(condition);
        WellContents {
            condition: condition.to_string(),
            salt: String::new(),
            ph: None,
            dph_dt: None,
            is_control: control.is_some(),
            control,
        }
    }

    fn build_plate(wells: Vec<(&str, Vec<f64>, WellContents)>, temperatures: Vec<f64>) -> Plate {
        let names: Vec<String> = wells.iter().map(|(n, _, _)| n.to_string()).collect();
        let wells: BTreeMap<String, Well> = wells
            .into_iter()
            .map(|(n, raw, c)| {
                (n.to_string(), Well::new(n.to_string(), &temperatures, raw, c))
            })
            .collect();
        let mut plate = Plate {
            temperatures,
            names,
            wells,
            replicates: BTreeMap::new(),
        };
        plate.index_replicates();
        plate
    }

    fn melt_raw(temperatures: &[f64], tm: f64) -> Vec<f64> {
        temperatures
            .iter()
            .map(|&t| {
                let rise = 1.0 / (1.0 + (-(t - tm) / 2.0).exp());
                let fall = 1.0 / (1.0 + ((t - (tm + 10.0)) / 3.0).exp());
                1000.0 * (0.05 + rise * fall)
            })
            .collect()
    }

    #[test]
    fn reference_curves_parse() {
        let (temps, values) = parse_reference(NO_DYE_REFERENCE);
        assert_eq!(temps.len(), values.len());
        assert!(temps.len() > 50);
        assert!(temps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn resample_interpolates_between_points() {
        let temps = [20.0, 30.0, 40.0];
        let values = [1.0, 2.0, 4.0];
        let out = resample(&temps, &values, &[10.0, 25.0, 35.0, 50.0]);
        assert_eq!(out, vec![1.0, 1.5, 3.0, 4.0]);
    }

    #[test]
    fn missing_controls_are_reported_as_not_found() {
        let temperatures: Vec<f64> = (0..70).map(|i| 25.0 + i as f64).collect();
        let plate = build_plate(
            vec![("A1", melt_raw(&temperatures, 60.0), contents("hepes"))],
            temperatures,
        );
        let checks = run_checks(&analyse(plate));
        assert_eq!(checks.lysozyme, CheckOutcome::NotFound);
        assert_eq!(checks.no_dye, CheckOutcome::NotFound);
        assert_eq!(checks.no_protein, CheckOutcome::NotFound);
    }

    #[test]
    fn lysozyme_near_reference_tm_passes() {
        let temperatures: Vec<f64> = (0..70).map(|i| 25.0 + i as f64).collect();
        let plate = build_plate(
            vec![("A1", melt_raw(&temperatures, 70.9), contents("lysozyme"))],
            temperatures,
        );
        let checks = run_checks(&analyse(plate));
        assert_eq!(checks.lysozyme, CheckOutcome::Passed);
    }

    #[test]
    fn lysozyme_far_from_reference_tm_fails() {
        let temperatures: Vec<f64> = (0..70).map(|i| 25.0 + i as f64).collect();
        let plate = build_plate(
            vec![("A1", melt_raw(&temperatures, 55.0), contents("lysozyme"))],
            temperatures,
        );
        let checks = run_checks(&analyse(plate));
        assert_eq!(checks.lysozyme, CheckOutcome::Failed);
    }

    #[test]
    fn no_dye_matching_the_reference_passes() {
        let temperatures: Vec<f64> = (0..70).map(|i| 25.0 + i as f64).collect();
        let (ref_temps, ref_values) = parse_reference(NO_DYE_REFERENCE);
        let raw = resample(&ref_temps, &ref_values, &temperatures);
        let plate = build_plate(vec![("A1", raw, contents("no dye"))], temperatures);
        let checks = run_checks(&analyse(plate));
        assert_eq!(checks.no_dye, CheckOutcome::Passed);
    }

    #[test]
    fn no_dye_with_a_melt_curve_fails() {
        let temperatures: Vec<f64> = (0..70).map(|i| 25.0 + i as f64).collect();
        let plate = build_plate(
            vec![("A1", melt_raw(&temperatures, 60.0), contents("no dye"))],
            temperatures,
        );
        let checks = run_checks(&analyse(plate));
        assert_eq!(checks.no_dye, CheckOutcome::Failed);
    }
}
