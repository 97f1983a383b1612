use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// ControlKind – the control wells we know how to check
// ---------------------------------------------------------------------------

/// The reference wells recognised by condition name, used for the control
/// checks on the report front page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Lysozyme,
    NoDye,
    ProteinAsSupplied,
    NoProtein,
}

impl ControlKind {
    /// Match a condition name against the known control names
    /// (case-insensitive). Any match forces the well to be a control,
    /// whatever the `Control` column says.
    pub fn from_condition(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lysozyme" => Some(ControlKind::Lysozyme),
            "no dye" => Some(ControlKind::NoDye),
            "protein as supplied" => Some(ControlKind::ProteinAsSupplied),
            "no protein" => Some(ControlKind::NoProtein),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// WellContents – one row of the contents map
// ---------------------------------------------------------------------------

/// The experimental condition of a single well, as described by the
/// contents map.
#[derive(Debug, Clone, PartialEq)]
pub struct WellContents {
    /// `Condition Variable 1` – usually the buffer name.
    pub condition: String,
    /// `Condition Variable 2` – usually the salt concentration.
    pub salt: String,
    /// Optional `pH` column.
    pub ph: Option<f64>,
    /// Optional `d(pH)/dT` column – pH drift per degree.
    pub dph_dt: Option<f64>,
    /// Whether the well is a control (from the `Control` column, or forced
    /// by a recognised control condition name).
    pub is_control: bool,
    /// Which known control this well is, if any.
    pub control: Option<ControlKind>,
}

impl WellContents {
    /// Two wells are replicates when their condition, salt and pH agree.
    pub fn is_replicate_of(&self, other: &WellContents) -> bool {
        self.condition == other.condition
            && self.salt == other.salt
            && self.ph.map(f64::to_bits) == other.ph.map(f64::to_bits)
    }
}

// ---------------------------------------------------------------------------
// Well – one melt curve
// ---------------------------------------------------------------------------

/// A single well: its fluorescence curve (normalised on construction so the
/// area under it is 1) plus the quantities derived from the raw curve.
#[derive(Debug, Clone)]
pub struct Well {
    pub name: String,
    /// Normalised fluorescence, one reading per temperature step.
    pub fluorescence: Vec<f64>,
    /// Largest raw reading before normalisation. The plate-wide maximum
    /// decides the monotonicity threshold for the experiment.
    pub raw_max: f64,
    /// The area the raw curve was divided by.
    pub normalisation_factor: f64,
    /// Min / max of the normalised curve, used for plot scaling and
    /// complex-shape detection.
    pub min_normalised: f64,
    pub max_normalised: f64,
    pub contents: WellContents,
}

impl Well {
    pub fn new(
        name: String,
        temperatures: &[f64],
        raw: Vec<f64>,
        contents: WellContents,
    ) -> Self {
        let step = temperatures[1] - temperatures[0];
        let raw_max = raw.iter().copied().fold(0.0_f64, f64::max);

        // Normalise to unit area under the curve (rectangle rule). An
        // all-zero curve keeps a factor of 1 and stays as it is.
        let area: f64 = raw.iter().map(|v| v * step).sum();
        let factor = if area > 0.0 { area } else { 1.0 };
        let fluorescence: Vec<f64> = raw.iter().map(|v| v / factor).collect();

        let min_normalised = fluorescence.iter().copied().fold(f64::INFINITY, f64::min);
        let max_normalised = raw_max / factor;

        Well {
            name,
            fluorescence,
            raw_max,
            normalisation_factor: factor,
            min_normalised,
            max_normalised,
            contents,
        }
    }
}

// ---------------------------------------------------------------------------
// Plate – the complete joined dataset
// ---------------------------------------------------------------------------

/// The full plate: a shared temperature axis, the wells keyed by name, and
/// the replicate grouping derived from the contents map.
#[derive(Debug, Clone)]
pub struct Plate {
    /// Temperature ramp, shared by every well.
    pub temperatures: Vec<f64>,
    /// Well names in contents-map order; iteration order for the report.
    pub names: Vec<String>,
    pub wells: BTreeMap<String, Well>,
    /// For every well, its full replicate group (itself included), in
    /// contents-map order. e.g. `"A2" → ["A1", "A2", "A3"]`.
    pub replicates: BTreeMap<String, Vec<String>>,
}

impl Plate {
    /// Build the replicate grouping from the well contents.
    pub fn index_replicates(&mut self) {
        let mut replicates: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in &self.names {
            let contents = &self.wells[name].contents;
            let group: Vec<String> = self
                .names
                .iter()
                .filter(|other| self.wells[*other].contents.is_replicate_of(contents))
                .cloned()
                .collect();
            replicates.insert(name.clone(), group);
        }
        self.replicates = replicates;
    }

    /// Distinct non-control (condition, pH) pairs in order of appearance.
    /// These drive the per-condition pages of the report.
    pub fn condition_pairs(&self) -> Vec<(String, Option<f64>)> {
        let mut pairs: Vec<(String, Option<f64>)> = Vec::new();
        for name in &self.names {
            let c = &self.wells[name].contents;
            if c.is_control || c.condition.is_empty() {
                continue;
            }
            let seen = pairs
                .iter()
                .any(|(n, p)| *n == c.condition && p.map(f64::to_bits) == c.ph.map(f64::to_bits));
            if !seen {
                pairs.push((c.condition.clone(), c.ph));
            }
        }
        pairs
    }

    /// Distinct salt values in order of appearance. The empty string only
    /// counts when a non-control well uses it.
    pub fn salts(&self) -> Vec<String> {
        let mut salts: Vec<String> = Vec::new();
        for name in &self.names {
            let c = &self.wells[name].contents;
            if c.salt.is_empty() && c.is_control {
                continue;
            }
            if !salts.contains(&c.salt) {
                salts.push(c.salt.clone());
            }
        }
        salts
    }

    /// The wells of a given control, in plate order.
    pub fn control_wells(&self, kind: ControlKind) -> Vec<String> {
        self.names
            .iter()
            .filter(|n| self.wells[*n].contents.control == Some(kind))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(condition: &str, salt: &str, ph: Option<f64>) -> WellContents {
        let control = ControlKind::from_condition(condition);
        WellContents {
            condition: condition.to_string(),
            salt: salt.to_string(),
            ph,
            dph_dt: None,
            is_control: control.is_some(),
            control,
        }
    }

    fn plate_of(wells: Vec<(&str, Vec<f64>, WellContents)>) -> Plate {
        let temperatures: Vec<f64> = (0..wells[0].1.len()).map(|i| 25.0 + i as f64).collect();
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

    #[test]
    fn normalisation_gives_unit_area() {
        let temperatures: Vec<f64> = (0..10).map(|i| 25.0 + i as f64).collect();
        let raw: Vec<f64> = (0..10).map(|i| 100.0 + i as f64 * 10.0).collect();
        let well = Well::new(
            "A1".to_string(),
            &temperatures,
            raw,
            contents("buffer", "", None),
        );
        let step = temperatures[1] - temperatures[0];
        let area: f64 = well.fluorescence.iter().map(|v| v * step).sum();
        assert!((area - 1.0).abs() < 1e-9);
        assert!(well.normalisation_factor > 0.0);
    }

    #[test]
    fn replicates_share_condition_salt_and_ph() {
        let plate = plate_of(vec![
            ("A1", vec![1.0; 5], contents("citrate", "0.1M", Some(5.5))),
            ("A2", vec![1.0; 5], contents("citrate", "0.1M", Some(5.5))),
            ("A3", vec![1.0; 5], contents("citrate", "0.2M", Some(5.5))),
        ]);
        assert_eq!(plate.replicates["A1"], vec!["A1", "A2"]);
        assert_eq!(plate.replicates["A3"], vec!["A3"]);
    }

    #[test]
    fn control_names_force_control_flag() {
        let c = contents("Lysozyme", "", None);
        assert!(c.is_control);
        assert_eq!(c.control, Some(ControlKind::Lysozyme));
        let plate = plate_of(vec![
            ("A1", vec![1.0; 5], contents("lysozyme", "", None)),
            ("B1", vec![1.0; 5], contents("hepes", "0.1M", Some(7.0))),
        ]);
        assert_eq!(plate.control_wells(ControlKind::Lysozyme), vec!["A1"]);
        assert_eq!(plate.condition_pairs(), vec![("hepes".to_string(), Some(7.0))]);
    }

    #[test]
    fn salts_keep_appearance_order() {
        let plate = plate_of(vec![
            ("A1", vec![1.0; 5], contents("hepes", "0.2M", Some(7.0))),
            ("A2", vec![1.0; 5], contents("hepes", "0.1M", Some(7.0))),
            ("A3", vec![1.0; 5], contents("citrate", "0.2M", Some(5.0))),
        ]);
        assert_eq!(plate.salts(), vec!["0.2M", "0.1M"]);
    }
}
