/// Analysis layer: replicate remediation, Tm estimation, control checks.
///
/// Architecture:
/// ```text
///   ┌────────────┐
///   │   Plate     │  normalised curves + replicate groups
///   └────────────┘
///         │
///         ▼
///   ┌────────────┐
///   │ replicates  │  outlier rejection within each group
///   └────────────┘
///         │
///         ▼
///   ┌────────────┐
///   │   curve     │  monotonic / saturated / Tm + complex flag
///   └────────────┘
///         │
///         ▼
///   ┌────────────┐
///   │ MeltAnalysis│  per-well outcomes, group summaries, controls
///   └────────────┘
/// ```
pub mod controls;
pub mod curve;
pub mod replicates;

use std::collections::{BTreeMap, BTreeSet};

use crate::data::model::{ControlKind, Plate, WellContents};

// ---------------------------------------------------------------------------
// Experiment-wide thresholds
// ---------------------------------------------------------------------------

/// Mean log-space distance between two normalised lysozyme curves, derived
/// from 168 reference runs. Curves further apart than this are not
/// replicates of one another.
pub const SIMILARITY_THRESHOLD: f64 = 1.725_700_849_74;

/// Reference lysozyme Tm (mean, standard deviation) across the training set.
pub const LYSOZYME_TM_MEAN: f64 = 70.872_023_809_523_81;
pub const LYSOZYME_TM_SD: f64 = 0.733_949_329_641_325_1;

/// The plate-wide monotonicity threshold is this fraction of the largest
/// raw fluorescence reading on the plate.
pub const MONOTONIC_FACTOR: f64 = 0.0005;

/// Wells whose normalisation factor sits within this factor of the
/// no-protein controls are considered to be in the noise.
const NOISE_MARGIN: f64 = 1.15;

// ---------------------------------------------------------------------------
// Per-well outcome
// ---------------------------------------------------------------------------

/// Everything the pipeline decided about one source well.
#[derive(Debug, Clone, Default)]
pub struct WellOutcome {
    /// Rejected as a replicate outlier.
    pub outlier: bool,
    /// Signal indistinguishable from the no-protein controls.
    pub in_noise: bool,
    /// Sensor overload: flat stretch at the curve maximum.
    pub saturated: bool,
    /// Monotonically non-increasing: no melt transition.
    pub monotonic: bool,
    /// Curve shape makes the Tm estimate unreliable.
    pub complex: bool,
    pub tm: Option<f64>,
    /// Per-well monotonicity forgiveness, scaled by the normalisation.
    pub mono_thresh: f64,
}

impl WellOutcome {
    /// Discarded curves are drawn dashed and excluded from Tm estimation.
    pub fn discarded(&self) -> bool {
        self.outlier || self.in_noise || self.saturated || self.monotonic
    }
}

// ---------------------------------------------------------------------------
// Replicate-group summary
// ---------------------------------------------------------------------------

/// One replicate group, averaged: the mean curve and the Tm estimate with
/// its replicate spread.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    /// First well of the group; the group's identity in the report.
    pub lead: String,
    /// All source wells of the group, in plate order.
    pub members: Vec<String>,
    pub contents: WellContents,
    /// Point-wise mean of the surviving curves; `None` when every member
    /// was rejected.
    pub mean_curve: Option<Vec<f64>>,
    /// Mean of the surviving member Tms.
    pub tm: Option<f64>,
    /// Standard deviation of the member Tms; absent for a single survivor.
    pub tm_error: Option<f64>,
    /// Whether any surviving member was flagged complex.
    pub complex: bool,
}

// ---------------------------------------------------------------------------
// MeltAnalysis – the pipeline result
// ---------------------------------------------------------------------------

/// The analysed plate: per-well outcomes, replicate-group summaries, and
/// the plate-wide quantities the report needs.
#[derive(Debug, Clone)]
pub struct MeltAnalysis {
    pub plate: Plate,
    pub outcomes: BTreeMap<String, WellOutcome>,
    pub groups: Vec<GroupSummary>,
    pub monotonic_threshold: f64,
    /// Extremes of the normalised curves, for shared plot scales.
    pub min_normalised: f64,
    pub max_normalised: f64,
}

/// Run the full pipeline over a loaded plate.
pub fn analyse(plate: Plate) -> MeltAnalysis {
    let mut outcomes: BTreeMap<String, WellOutcome> = plate
        .names
        .iter()
        .map(|n| (n.clone(), WellOutcome::default()))
        .collect();

    reject_outliers(&plate, &mut outcomes);

    // Plate-wide thresholds from the raw maxima.
    let overall_raw_max = plate
        .wells
        .values()
        .map(|w| w.raw_max)
        .fold(0.0_f64, f64::max);
    let monotonic_threshold = MONOTONIC_FACTOR * overall_raw_max;
    for name in &plate.names {
        let well = &plate.wells[name];
        outcomes.get_mut(name).unwrap().mono_thresh =
            monotonic_threshold / well.normalisation_factor;
    }

    reject_noise(&plate, &mut outcomes);
    reject_saturated(&plate, &mut outcomes);

    // Monotonicity and Tm per source well.
    for name in &plate.names {
        let well = &plate.wells[name];
        let outcome = outcomes.get_mut(name).unwrap();
        outcome.monotonic = curve::is_monotonic(&well.fluorescence, outcome.mono_thresh);
        if outcome.monotonic || outcome.discarded() {
            log::debug!("well {name}: excluded from Tm estimation");
            continue;
        }
        let estimate = curve::estimate_tm(&plate.temperatures, &well.fluorescence);
        outcome.tm = estimate.tm;
        outcome.complex = estimate.complex;
    }

    let groups = summarise_groups(&plate, &outcomes);

    let min_normalised = plate
        .wells
        .values()
        .map(|w| w.min_normalised)
        .fold(f64::INFINITY, f64::min);
    let max_normalised = plate
        .wells
        .values()
        .map(|w| w.max_normalised)
        .fold(0.0_f64, f64::max);

    MeltAnalysis {
        plate,
        outcomes,
        groups,
        monotonic_threshold,
        min_normalised,
        max_normalised,
    }
}

/// Replicate outlier rejection: within each group, drop curves too far
/// (in log space) from the rest.
fn reject_outliers(plate: &Plate, outcomes: &mut BTreeMap<String, WellOutcome>) {
    let mut visited: BTreeSet<&str> = BTreeSet::new();
    for name in &plate.names {
        if visited.contains(name.as_str()) {
            continue;
        }
        let group = &plate.replicates[name];
        for member in group {
            visited.insert(member);
        }
        if group.len() < 2 {
            continue;
        }

        let curves: Vec<&[f64]> = group
            .iter()
            .map(|m| plate.wells[m].fluorescence.as_slice())
            .collect();
        let dist: Vec<Vec<f64>> = (0..group.len())
            .map(|i| {
                (0..group.len())
                    .map(|j| replicates::sqr_diff(curves[i], curves[j]))
                    .collect()
            })
            .collect();

        let kept = replicates::discard_bad(group.len(), &dist, SIMILARITY_THRESHOLD);
        for (idx, member) in group.iter().enumerate() {
            if !kept.contains(&idx) {
                log::info!("well {member}: replicate outlier, discarded");
                outcomes.get_mut(member).unwrap().outlier = true;
            }
        }
    }
}

/// Curves normalised by a factor comparable to the no-protein controls
/// carry no signal and are discarded.
fn reject_noise(plate: &Plate, outcomes: &mut BTreeMap<String, WellOutcome>) {
    let no_protein = plate.control_wells(ControlKind::NoProtein);
    if no_protein.is_empty() {
        return;
    }
    let thresholds: Vec<f64> = no_protein
        .iter()
        .map(|n| outcomes[n].mono_thresh)
        .collect();
    let (Some(noise_level), _) = replicates::mean_sd(&thresholds) else {
        return;
    };
    for name in &plate.names {
        let well = &plate.wells[name];
        let outcome = outcomes.get_mut(name).unwrap();
        if well.contents.is_control || outcome.discarded() {
            continue;
        }
        if outcome.mono_thresh > noise_level / NOISE_MARGIN {
            log::info!("well {name}: signal within experiment noise, discarded");
            outcome.in_noise = true;
        }
    }
}

fn reject_saturated(plate: &Plate, outcomes: &mut BTreeMap<String, WellOutcome>) {
    for name in &plate.names {
        let outcome = outcomes.get_mut(name).unwrap();
        if outcome.discarded() {
            continue;
        }
        if curve::is_saturated(&plate.wells[name].fluorescence) {
            log::info!("well {name}: saturated curve, discarded");
            outcome.saturated = true;
        }
    }
}

/// Collapse each replicate group into a [`GroupSummary`].
fn summarise_groups(
    plate: &Plate,
    outcomes: &BTreeMap<String, WellOutcome>,
) -> Vec<GroupSummary> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut groups = Vec::new();

    for name in &plate.names {
        if visited.contains(name.as_str()) {
            continue;
        }
        let members = plate.replicates[name].clone();
        for member in &members {
            visited.insert(member.clone());
        }
        let lead = members[0].clone();

        // Mean curve over the replicate survivors (outliers excluded).
        let surviving: Vec<&[f64]> = members
            .iter()
            .filter(|m| !outcomes[*m].outlier)
            .map(|m| plate.wells[m].fluorescence.as_slice())
            .collect();
        let mean_curve = if surviving.is_empty() {
            None
        } else {
            Some(replicates::mean_curve(&surviving))
        };

        // Group Tm: mean ± sd of the member Tms that survived everything.
        let tms: Vec<f64> = members
            .iter()
            .filter(|m| !outcomes[*m].discarded())
            .filter_map(|m| outcomes[m].tm)
            .collect();
        let (tm, tm_error) = replicates::mean_sd(&tms);
        let complex = members
            .iter()
            .any(|m| !outcomes[m].discarded() && outcomes[m].complex);

        groups.push(GroupSummary {
            contents: plate.wells[&lead].contents.clone(),
            lead,
            members,
            mean_curve,
            tm,
            tm_error,
            complex,
        });
    }
    groups
}

impl MeltAnalysis {
    /// The group a source well belongs to.
    pub fn group_of(&self, well: &str) -> Option<&GroupSummary> {
        self.groups
            .iter()
            .find(|g| g.members.iter().any(|m| m == well))
    }

    /// The non-control group with the highest reliable Tm.
    pub fn highest_tm(&self) -> Option<&GroupSummary> {
        self.groups
            .iter()
            .filter(|g| !g.contents.is_control)
            .filter(|g| g.tm.is_some())
            .max_by(|a, b| a.tm.unwrap().total_cmp(&b.tm.unwrap()))
    }

    /// Percentage of non-control source curves that contributed a Tm.
    pub fn tm_usage_percent(&self) -> Option<u32> {
        let mut used = 0u32;
        let mut total = 0u32;
        for name in &self.plate.names {
            if self.plate.wells[name].contents.control.is_some() {
                continue;
            }
            let outcome = &self.outcomes[name];
            if outcome.tm.is_some() && !outcome.discarded() {
                used += 1;
            }
            total += 1;
        }
        if total == 0 {
            return None;
        }
        Some(((used as f64 / total as f64) * 100.0).round() as u32)
    }

    /// Mean of the group Tm errors, where one exists.
    pub fn average_tm_error(&self) -> Option<f64> {
        let errors: Vec<f64> = self.groups.iter().filter_map(|g| g.tm_error).collect();
        replicates::mean_sd(&errors).0
    }

    /// Summary of the protein-as-supplied control wells.
    pub fn supplied_summary(&self) -> SuppliedSummary {
        let members = self.plate.control_wells(ControlKind::ProteinAsSupplied);
        if members.is_empty() {
            return SuppliedSummary {
                found: false,
                tm: None,
                sd: None,
                well_behaved: false,
            };
        }
        let tms: Vec<f64> = members
            .iter()
            .filter(|m| !self.outcomes[*m].discarded())
            .filter_map(|m| self.outcomes[m].tm)
            .collect();
        let (tm, sd) = replicates::mean_sd(&tms);

        let mut well_behaved = members.iter().all(|m| {
            let o = &self.outcomes[m];
            o.tm.is_some() && !o.monotonic && !o.discarded()
        });
        if sd.is_some_and(|s| s > 1.5) {
            well_behaved = false;
        }
        SuppliedSummary {
            found: true,
            tm,
            sd,
            well_behaved,
        }
    }
}

/// How the protein behaved in its original formulation.
#[derive(Debug, Clone, Copy)]
pub struct SuppliedSummary {
    pub found: bool,
    pub tm: Option<f64>,
    pub sd: Option<f64>,
    pub well_behaved: bool,
}
