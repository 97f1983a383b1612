//! Off-screen chart rendering for the PDF report.
//!
//! Charts are drawn with [`plotters`] into in-memory RGB buffers which the
//! PDF layer embeds as images: the summary Tm chart, the per-condition
//! curve panels, and the protein-as-supplied thumbnail.

use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use thiserror::Error;

use crate::analysis::{GroupSummary, MeltAnalysis, WellOutcome};
use crate::color::SaltPalette;

/// Errors that can occur during chart generation
#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to create drawing area: {0}")]
    DrawingArea(String),

    #[error("Failed to configure chart: {0}")]
    ChartConfig(String),

    #[error("Failed to draw chart elements: {0}")]
    Drawing(String),
}

type Result<T> = core::result::Result<T, PlotError>;

/// Summary chart resolution; embedded at 160 × 110 mm on the front page.
pub const SUMMARY_WIDTH: u32 = 1200;
pub const SUMMARY_HEIGHT: u32 = 825;

/// Curve panel resolution; embedded at 80 × 60 mm.
pub const PANEL_WIDTH: u32 = 800;
pub const PANEL_HEIGHT: u32 = 600;

/// A rendered chart: tightly packed RGB8 pixels.
pub struct ChartImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Summary chart
// ---------------------------------------------------------------------------

/// The front-page summary: mean Tm per condition, one colour per salt,
/// unreliable estimates drawn as diamonds, and the protein-as-supplied Tm
/// as a dashed horizontal line.
pub fn summary_chart(analysis: &MeltAnalysis, palette: &SaltPalette) -> Result<ChartImage> {
    let mut pairs = analysis.plate.condition_pairs();
    pairs.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    let labels: Vec<String> = pairs.iter().map(|(n, p)| condition_label(n, *p)).collect();
    let salts = analysis.plate.salts();

    // Tm per (condition, salt) cell, split into reliable and unreliable.
    let mut reliable: Vec<Vec<(f64, f64)>> = vec![Vec::new(); salts.len()];
    let mut unreliable: Vec<Vec<(f64, f64)>> = vec![Vec::new(); salts.len()];
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for (salt_idx, salt) in salts.iter().enumerate() {
        for (cond_idx, (condition, ph)) in pairs.iter().enumerate() {
            let Some(group) = find_group(analysis, condition, *ph, salt) else {
                continue;
            };
            let Some(tm) = group.tm else { continue };
            y_min = y_min.min(tm);
            y_max = y_max.max(tm);
            if tm_is_unreliable(group) {
                unreliable[salt_idx].push((cond_idx as f64, tm));
            } else {
                reliable[salt_idx].push((cond_idx as f64, tm));
            }
        }
    }
    if !y_min.is_finite() {
        // nothing melted: keep a sane default scale
        y_min = 40.0;
        y_max = 80.0;
    }

    let supplied = analysis.supplied_summary();
    let (y_lo, y_hi) = summary_y_range(y_min, y_max, supplied.tm);

    let mut pixels = vec![0u8; (SUMMARY_WIDTH * SUMMARY_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (SUMMARY_WIDTH, SUMMARY_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .x_label_area_size(170)
            .y_label_area_size(60)
            .build_cartesian_2d(-1.0..pairs.len() as f64, y_lo..y_hi)
            .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

        let label_for = move |v: &f64| -> String {
            let idx = v.round();
            if (v - idx).abs() > 0.01 || idx < 0.0 || idx >= labels.len() as f64 {
                return String::new();
            }
            labels[idx as usize].clone()
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_desc("Tm")
            .x_labels(pairs.len() + 2)
            .x_label_formatter(&label_for)
            .x_label_style(
                ("sans-serif", 14)
                    .into_font()
                    .transform(FontTransform::Rotate90),
            )
            .draw()
            .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

        let diamond_dy = (y_hi - y_lo) * 0.012;
        for (salt_idx, salt) in salts.iter().enumerate() {
            let color = palette.plot_color(salt);
            chart
                .draw_series(
                    reliable[salt_idx]
                        .iter()
                        .map(|&(x, y)| Circle::new((x, y), 5, color.filled())),
                )
                .map_err(|e| PlotError::Drawing(e.to_string()))?
                .label(if salt.is_empty() { "(none)" } else { salt })
                .legend(move |(x, y)| Circle::new((x + 8, y), 5, color.filled()));

            chart
                .draw_series(unreliable[salt_idx].iter().map(|&(x, y)| {
                    Polygon::new(
                        vec![
                            (x - 0.18, y),
                            (x, y + diamond_dy),
                            (x + 0.18, y),
                            (x, y - diamond_dy),
                        ],
                        color.filled(),
                    )
                }))
                .map_err(|e| PlotError::Drawing(e.to_string()))?;
        }

        // Protein-as-supplied reference Tm across the whole width.
        if let Some(tm) = supplied.tm {
            chart
                .draw_series(DashedLineSeries::new(
                    vec![(-1.0, tm), (pairs.len() as f64, tm)],
                    8,
                    6,
                    RED.stroke_width(2),
                ))
                .map_err(|e| PlotError::Drawing(e.to_string()))?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperMiddle)
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .draw()
            .map_err(|e| PlotError::Drawing(e.to_string()))?;

        root.present()
            .map_err(|e| PlotError::Drawing(e.to_string()))?;
    }

    Ok(ChartImage {
        width: SUMMARY_WIDTH,
        height: SUMMARY_HEIGHT,
        pixels,
    })
}

/// Scale the y axis so the protein-as-supplied line sits centred when it
/// exists, with room below and above.
fn summary_y_range(y_min: f64, y_max: f64, supplied_tm: Option<f64>) -> (f64, f64) {
    match supplied_tm {
        Some(m) => {
            if m - y_min > y_max - m {
                (y_min - 5.0, 2.0 * m - y_min + 10.0)
            } else {
                (2.0 * m - y_max - 5.0, y_max + 10.0)
            }
        }
        None => (y_min - 5.0, y_max + 5.0),
    }
}

pub fn condition_label(condition: &str, ph: Option<f64>) -> String {
    match ph {
        Some(ph) => format!("{condition} ({ph})"),
        None => condition.to_string(),
    }
}

/// A Tm is drawn as unreliable when the curve shape was complex, or when a
/// multi-replicate group kept only a single survivor.
pub fn tm_is_unreliable(group: &GroupSummary) -> bool {
    group.complex
        || (group.tm.is_some() && group.members.len() > 1 && group.tm_error.is_none())
}

fn find_group<'a>(
    analysis: &'a MeltAnalysis,
    condition: &str,
    ph: Option<f64>,
    salt: &str,
) -> Option<&'a GroupSummary> {
    analysis.groups.iter().find(|g| {
        g.contents.condition == condition
            && g.contents.salt == salt
            && g.contents.ph.map(f64::to_bits) == ph.map(f64::to_bits)
    })
}

// ---------------------------------------------------------------------------
// Per-condition curve panels
// ---------------------------------------------------------------------------

/// All source curves of one (condition, pH) pair, coloured by salt.
/// Discarded curves are dashed, complex curves dotted, the rest solid.
pub fn condition_panel(
    analysis: &MeltAnalysis,
    condition: &str,
    ph: Option<f64>,
    palette: &SaltPalette,
) -> Result<ChartImage> {
    let wells: Vec<&str> = analysis
        .plate
        .names
        .iter()
        .filter(|n| {
            let c = &analysis.plate.wells[*n].contents;
            c.condition == condition && c.ph.map(f64::to_bits) == ph.map(f64::to_bits)
        })
        .map(|n| n.as_str())
        .collect();

    render_curve_panel(analysis, &wells, |name| {
        let contents = &analysis.plate.wells[name].contents;
        let outcome = &analysis.outcomes[name];
        let color = palette.plot_color(&contents.salt);
        if outcome.discarded() {
            CurveStyle::Dashed(color)
        } else if outcome.complex {
            CurveStyle::Dotted(color)
        } else {
            CurveStyle::Solid(color)
        }
    })
}

/// The protein-as-supplied thumbnail: green curves, grey for everything
/// that was discarded (monotonic curves included).
pub fn supplied_panel(analysis: &MeltAnalysis, wells: &[String]) -> Result<ChartImage> {
    let wells: Vec<&str> = wells.iter().map(|w| w.as_str()).collect();
    render_curve_panel(analysis, &wells, |name| {
        supplied_style(&analysis.outcomes[name])
    })
}

fn supplied_style(outcome: &WellOutcome) -> CurveStyle {
    if outcome.discarded() {
        CurveStyle::Solid(RGBColor(128, 128, 128))
    } else {
        CurveStyle::Solid(RGBColor(0, 128, 0))
    }
}

#[derive(Debug, PartialEq)]
enum CurveStyle {
    Solid(RGBColor),
    Dashed(RGBColor),
    Dotted(RGBColor),
}

fn render_curve_panel(
    analysis: &MeltAnalysis,
    wells: &[&str],
    style_of: impl Fn(&str) -> CurveStyle,
) -> Result<ChartImage> {
    let temps = &analysis.plate.temperatures;
    let x_lo = temps[0];
    let x_hi = *temps.last().unwrap();

    // Shared scale across every panel so curves are comparable.
    let padding = (analysis.max_normalised - analysis.min_normalised) * 0.05;
    let y_lo = analysis.min_normalised - padding;
    let y_hi = analysis.max_normalised + padding;

    let mut pixels = vec![0u8; (PANEL_WIDTH * PANEL_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut pixels, (PANEL_WIDTH, PANEL_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

        let mut chart = ChartBuilder::on(&root)
            .margin(8)
            .x_label_area_size(36)
            .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
            .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(8)
            .draw()
            .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

        for &name in wells {
            let curve = &analysis.plate.wells[name].fluorescence;
            let points: Vec<(f64, f64)> = temps.iter().copied().zip(curve.iter().copied()).collect();
            match style_of(name) {
                CurveStyle::Solid(color) => {
                    chart
                        .draw_series(LineSeries::new(points, color.stroke_width(2)))
                        .map_err(|e| PlotError::Drawing(e.to_string()))?;
                }
                CurveStyle::Dashed(color) => {
                    chart
                        .draw_series(DashedLineSeries::new(points, 10, 6, color.stroke_width(2)))
                        .map_err(|e| PlotError::Drawing(e.to_string()))?;
                }
                CurveStyle::Dotted(color) => {
                    chart
                        .draw_series(DashedLineSeries::new(points, 2, 5, color.stroke_width(2)))
                        .map_err(|e| PlotError::Drawing(e.to_string()))?;
                }
            }
        }

        root.present()
            .map_err(|e| PlotError::Drawing(e.to_string()))?;
    }

    Ok(ChartImage {
        width: PANEL_WIDTH,
        height: PANEL_HEIGHT,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyse;
    use crate::data::model::{ControlKind, Plate, Well, WellContents};
    use std::collections::BTreeMap;

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

    fn analysed_plate() -> MeltAnalysis {
        let temperatures: Vec<f64> = (0..70).map(|i| 25.0 + i as f64).collect();
        let names = ["A1", "A2", "B1"];
        let tms = [58.0, 58.4, 63.0];
        let conds = [
            contents("hepes", "0.1M", Some(7.0)),
            contents("hepes", "0.1M", Some(7.0)),
            contents("mes", "0.2M", Some(6.0)),
        ];
        let wells: BTreeMap<String, Well> = names
            .iter()
            .zip(tms.iter())
            .zip(conds.iter())
            .map(|((n, &tm), c)| {
                (
                    n.to_string(),
                    Well::new(
                        n.to_string(),
                        &temperatures,
                        melt_raw(&temperatures, tm),
                        c.clone(),
                    ),
                )
            })
            .collect();
        let mut plate = Plate {
            temperatures,
            names: names.iter().map(|n| n.to_string()).collect(),
            wells,
            replicates: BTreeMap::new(),
        };
        plate.index_replicates();
        analyse(plate)
    }

    #[test]
    fn summary_chart_renders() {
        let analysis = analysed_plate();
        let palette = SaltPalette::new(&analysis.plate.salts());
        let image = summary_chart(&analysis, &palette).unwrap();
        assert_eq!(image.width, SUMMARY_WIDTH);
        assert_eq!(
            image.pixels.len(),
            (SUMMARY_WIDTH * SUMMARY_HEIGHT * 3) as usize
        );
        // something was drawn over the white background
        assert!(image.pixels.iter().any(|&p| p != 255));
    }

    #[test]
    fn condition_panel_renders() {
        let analysis = analysed_plate();
        let palette = SaltPalette::new(&analysis.plate.salts());
        let image = condition_panel(&analysis, "hepes", Some(7.0), &palette).unwrap();
        assert_eq!(image.width, PANEL_WIDTH);
        assert!(image.pixels.iter().any(|&p| p != 255));
    }

    #[test]
    fn y_range_is_centred_on_the_supplied_tm() {
        let (lo, hi) = summary_y_range(50.0, 70.0, Some(65.0));
        assert!((65.0 - lo) - (hi - 65.0) <= 15.0);
        assert!(lo < 50.0 && hi > 70.0);

        let (lo, hi) = summary_y_range(50.0, 70.0, None);
        assert_eq!((lo, hi), (45.0, 75.0));
    }

    #[test]
    fn discarded_supplied_curves_are_grey_including_monotonic_ones() {
        let grey = RGBColor(128, 128, 128);
        let green = RGBColor(0, 128, 0);

        let monotonic = WellOutcome {
            monotonic: true,
            ..WellOutcome::default()
        };
        assert_eq!(supplied_style(&monotonic), CurveStyle::Solid(grey));

        let saturated = WellOutcome {
            saturated: true,
            ..WellOutcome::default()
        };
        assert_eq!(supplied_style(&saturated), CurveStyle::Solid(grey));

        let healthy = WellOutcome {
            tm: Some(60.0),
            ..WellOutcome::default()
        };
        assert_eq!(supplied_style(&healthy), CurveStyle::Solid(green));
    }

    #[test]
    fn labels_include_the_ph() {
        assert_eq!(condition_label("hepes", Some(7.0)), "hepes (7)");
        assert_eq!(condition_label("hepes", None), "hepes");
    }
}
