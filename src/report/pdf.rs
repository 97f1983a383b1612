//! PDF report assembly.
//!
//! One front page (run summary, control checks, summary chart) followed by
//! per-condition pages laid out on a two-column grid. All lengths are in mm
//! on A4 paper, measured from the bottom-left corner.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use printpdf::image_crate::{DynamicImage, RgbImage};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Polygon, Rgb,
};

use crate::analysis::controls::ControlChecks;
use crate::analysis::{GroupSummary, MeltAnalysis, SuppliedSummary};
use crate::color::SaltPalette;
use crate::data::model::ControlKind;

use super::charts::{self, ChartImage};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;

/// Embedded chart panel size on the page.
const PANEL_W: f32 = 80.0;
const PANEL_H: f32 = 60.0;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Write the full report for an analysed plate to `out_path`.
pub fn write_report(
    analysis: &MeltAnalysis,
    checks: &ControlChecks,
    source_name: &str,
    out_path: &Path,
) -> anyhow::Result<()> {
    let palette = SaltPalette::new(&analysis.plate.salts());

    let (doc, page, layer) =
        PdfDocument::new("Meltdown report", Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .context("failed to register the report font")?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .context("failed to register the report font")?;
    let fonts = Fonts { font, bold };

    let front = doc.get_page(page).get_layer(layer);
    front_page(&front, analysis, checks, source_name, &palette, &fonts)?;

    condition_pages(&doc, analysis, &palette, &fonts)?;

    let file = File::create(out_path)
        .with_context(|| format!("failed to create report file {}", out_path.display()))?;
    doc.save(&mut BufWriter::new(file))
        .context("failed to write the PDF report")?;
    log::info!("report written to {}", out_path.display());
    Ok(())
}

struct Fonts {
    font: IndirectFontRef,
    bold: IndirectFontRef,
}

// ---------------------------------------------------------------------------
// Front page
// ---------------------------------------------------------------------------

fn front_page(
    layer: &PdfLayerReference,
    analysis: &MeltAnalysis,
    checks: &ControlChecks,
    source_name: &str,
    palette: &SaltPalette,
    fonts: &Fonts,
) -> anyhow::Result<()> {
    set_black(layer);
    layer.use_text("Meltdown report", 20.0, Mm(15.0), Mm(277.0), &fonts.bold);
    layer.use_text(
        format!(
            "Generated by Meltdown v{} on {}",
            env!("CARGO_PKG_VERSION"),
            chrono::Local::now().format("%d %B %Y")
        ),
        10.0,
        Mm(15.0),
        Mm(269.0),
        &fonts.font,
    );
    layer.use_text(
        format!("Source data: {source_name}"),
        10.0,
        Mm(15.0),
        Mm(263.0),
        &fonts.font,
    );

    // Protein-as-supplied thumbnail, top right.
    let supplied_wells = analysis.plate.control_wells(ControlKind::ProteinAsSupplied);
    if !supplied_wells.is_empty() {
        let chart = charts::supplied_panel(analysis, &supplied_wells)?;
        embed_chart(layer, &chart, 118.0, 196.0, PANEL_W, PANEL_H)?;
        layer.use_text(
            "Protein as supplied",
            10.0,
            Mm(118.0),
            Mm(258.0),
            &fonts.bold,
        );
    }

    summary_box(layer, analysis, checks, fonts);

    let chart = charts::summary_chart(analysis, palette)?;
    embed_chart(layer, &chart, 25.0, 58.0, 160.0, 110.0)?;
    layer.use_text(
        "Mean Tm per condition",
        11.0,
        Mm(25.0),
        Mm(171.0),
        &fonts.bold,
    );

    match analysis.highest_tm() {
        Some(group) => {
            layer.use_text(
                format!(
                    "Highest Tm: {} in {}{}",
                    fmt_group_tm(group),
                    charts::condition_label(&group.contents.condition, group.contents.ph),
                    salt_suffix(&group.contents.salt),
                ),
                11.0,
                Mm(15.0),
                Mm(45.0),
                &fonts.bold,
            );
        }
        None => {
            layer.use_text(
                "No reliable Tm was found for any condition.",
                11.0,
                Mm(15.0),
                Mm(45.0),
                &fonts.bold,
            );
        }
    }
    Ok(())
}

fn summary_box(
    layer: &PdfLayerReference,
    analysis: &MeltAnalysis,
    checks: &ControlChecks,
    fonts: &Fonts,
) {
    stroke_rect(layer, 13.0, 196.0, 100.0, 58.0);

    let x = 17.0;
    let mut y = 247.0;
    let mut line = |text: String, bold: bool| {
        let font = if bold { &fonts.bold } else { &fonts.font };
        layer.use_text(text, 10.0, Mm(x), Mm(y), font);
        y -= 6.0;
    };

    line("Controls".to_string(), true);
    line(format!("Lysozyme: {}", checks.lysozyme), false);
    line(format!("No dye: {}", checks.no_dye), false);
    line(format!("No protein: {}", checks.no_protein), false);

    let supplied = analysis.supplied_summary();
    let supplied_text = if !supplied.found {
        "Protein as supplied: not included".to_string()
    } else if !supplied.well_behaved {
        "Protein as supplied: behaved unusually".to_string()
    } else {
        match (supplied.tm, supplied.sd) {
            (Some(tm), Some(sd)) => format!("Protein as supplied: Tm {tm:.1} +/- {sd:.1}"),
            (Some(tm), None) => format!("Protein as supplied: Tm {tm:.1}"),
            _ => "Protein as supplied: no Tm found".to_string(),
        }
    };
    line(supplied_text, false);

    match analysis.tm_usage_percent() {
        Some(pct) => line(format!("Curves used for Tm estimation: {pct}%"), false),
        None => line("No experiment curves on the plate".to_string(), false),
    }
    if let Some(err) = analysis.average_tm_error() {
        line(format!("Mean Tm spread between replicates: {err:.2}"), false);
    }
    if summary_is_unreliable(
        &supplied,
        analysis.average_tm_error(),
        analysis.tm_usage_percent(),
    ) {
        line("Warning: the summary chart appears to be unreliable".to_string(), true);
    }
}

/// The run as a whole is suspect when the supplied protein misbehaved, the
/// replicate Tm spreads are large, or most curves had to be discarded.
fn summary_is_unreliable(
    supplied: &SuppliedSummary,
    average_error: Option<f64>,
    usage_percent: Option<u32>,
) -> bool {
    (supplied.found && !supplied.well_behaved)
        || average_error.is_some_and(|e| e >= 1.5)
        || usage_percent.is_some_and(|u| u <= 50)
}

// ---------------------------------------------------------------------------
// Condition pages
// ---------------------------------------------------------------------------

/// Grid shape per page. Fewer salts leave the per-condition legends short,
/// so more panels fit on one page.
fn grid_shape(salt_count: usize) -> (usize, f32) {
    if salt_count < 6 {
        (3, 92.0)
    } else if salt_count < 13 {
        (2, 138.0)
    } else {
        (1, 184.0)
    }
}

fn condition_pages(
    doc: &PdfDocumentReference,
    analysis: &MeltAnalysis,
    palette: &SaltPalette,
    fonts: &Fonts,
) -> anyhow::Result<()> {
    let mut pairs = analysis.plate.condition_pairs();
    pairs.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let salts = analysis.plate.salts();
    let (rows, cell_h) = grid_shape(salts.len());
    let per_page = rows * 2;

    for page_pairs in pairs.chunks(per_page) {
        let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        set_black(&layer);

        for (slot, (condition, ph)) in page_pairs.iter().enumerate() {
            let col = slot % 2;
            let row = slot / 2;
            let x = 10.0 + col as f32 * 95.0;
            let y = 228.0 - row as f32 * cell_h;
            condition_cell(&layer, analysis, condition, *ph, palette, fonts, x, y)?;
        }

        layer.use_text(
            "Dashed curves were rejected (outlier, noise, saturation or no transition) \
             and did not contribute to the Tm.",
            8.0,
            Mm(10.0),
            Mm(14.0),
            &fonts.font,
        );
        layer.use_text(
            "Dotted curves have complex shapes; their Tm estimates (marked ^) may be unreliable.",
            8.0,
            Mm(10.0),
            Mm(10.0),
            &fonts.font,
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn condition_cell(
    layer: &PdfLayerReference,
    analysis: &MeltAnalysis,
    condition: &str,
    ph: Option<f64>,
    palette: &SaltPalette,
    fonts: &Fonts,
    x: f32,
    y: f32,
) -> anyhow::Result<()> {
    layer.use_text(
        charts::condition_label(condition, ph),
        11.0,
        Mm(x),
        Mm(y + PANEL_H + 2.0),
        &fonts.bold,
    );

    let chart = charts::condition_panel(analysis, condition, ph, palette)?;
    embed_chart(layer, &chart, x, y, PANEL_W, PANEL_H)?;

    // Legend below the image: one row per salt that appears in this
    // condition, swatch plus Tm and the pH at that temperature.
    let mut legend_y = y - 5.0;
    for salt in palette.salts() {
        let Some(group) = analysis.groups.iter().find(|g| {
            g.contents.condition == condition
                && g.contents.salt == salt
                && g.contents.ph.map(f64::to_bits) == ph.map(f64::to_bits)
        }) else {
            continue;
        };

        let (r, g, b) = palette.rgb(salt);
        fill_rect(
            layer,
            x + 1.0,
            legend_y,
            2.5,
            2.5,
            (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0),
        );
        set_black(layer);

        let salt_label = if salt.is_empty() { "(none)" } else { salt };
        let mut text = format!("{salt_label}  {}", fmt_group_tm(group));
        if let Some(adjusted) = adjusted_ph(group) {
            text.push_str(&format!("  pH at Tm {adjusted:.1}"));
        }
        layer.use_text(text, 8.0, Mm(x + 6.0), Mm(legend_y), &fonts.font);
        legend_y -= 4.0;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Group Tm with its replicate spread, marked `^` when the curve shape made
/// the estimate unreliable.
fn fmt_group_tm(group: &GroupSummary) -> String {
    let mark = if group.complex { " ^" } else { "" };
    match (group.tm, group.tm_error) {
        (Some(tm), Some(sd)) => format!("{tm:.1} +/- {sd:.1}{mark}"),
        (Some(tm), None) => format!("{tm:.1}{mark}"),
        _ => "no Tm".to_string(),
    }
}

fn salt_suffix(salt: &str) -> String {
    if salt.is_empty() {
        String::new()
    } else {
        format!(", {salt}")
    }
}

/// Buffer pH at the melting point, where a temperature coefficient was
/// supplied. Buffer pH values are conventionally quoted at 20 degrees.
fn adjusted_ph(group: &GroupSummary) -> Option<f64> {
    let ph = group.contents.ph?;
    let dph_dt = group.contents.dph_dt?;
    let tm = group.tm?;
    Some(ph + dph_dt * (tm - 20.0))
}

// ---------------------------------------------------------------------------
// Drawing helpers
// ---------------------------------------------------------------------------

fn set_black(layer: &PdfLayerReference) {
    layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
}

fn stroke_rect(layer: &PdfLayerReference, x: f32, y: f32, w: f32, h: f32) {
    layer.set_outline_thickness(0.75);
    let outline = Line {
        points: vec![
            (Point::new(Mm(x), Mm(y)), false),
            (Point::new(Mm(x + w), Mm(y)), false),
            (Point::new(Mm(x + w), Mm(y + h)), false),
            (Point::new(Mm(x), Mm(y + h)), false),
        ],
        is_closed: true,
    };
    layer.add_line(outline);
}

fn fill_rect(layer: &PdfLayerReference, x: f32, y: f32, w: f32, h: f32, rgb: (f32, f32, f32)) {
    layer.set_fill_color(Color::Rgb(Rgb::new(rgb.0, rgb.1, rgb.2, None)));
    let square = Polygon {
        rings: vec![vec![
            (Point::new(Mm(x), Mm(y)), false),
            (Point::new(Mm(x + w), Mm(y)), false),
            (Point::new(Mm(x + w), Mm(y + h)), false),
            (Point::new(Mm(x), Mm(y + h)), false),
        ]],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    };
    layer.add_polygon(square);
}

/// Place a rendered chart on the page with its bottom-left corner at
/// `(x, y)` mm, scaled to `w` by `h` mm via the image DPI.
fn embed_chart(
    layer: &PdfLayerReference,
    chart: &ChartImage,
    x: f32,
    y: f32,
    w: f32,
    _h: f32,
) -> anyhow::Result<()> {
    let rgb = RgbImage::from_raw(chart.width, chart.height, chart.pixels.clone())
        .context("chart buffer does not match its dimensions")?;
    let image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(rgb));
    let dpi = chart.width as f32 * 25.4 / w;
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(x)),
            translate_y: Some(Mm(y)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::WellContents;

    fn group(tm: Option<f64>, sd: Option<f64>, complex: bool) -> GroupSummary {
        GroupSummary {
            lead: "A1".to_string(),
            members: vec!["A1".to_string()],
            contents: WellContents {
                condition: "hepes".to_string(),
                salt: "0.1M".to_string(),
                ph: Some(7.0),
                dph_dt: Some(-0.014),
                is_control: false,
                control: None,
            },
            mean_curve: None,
            tm,
            tm_error: sd,
            complex,
        }
    }

    #[test]
    fn tm_formatting_covers_every_case() {
        assert_eq!(fmt_group_tm(&group(Some(61.24), Some(0.31), false)), "61.2 +/- 0.3");
        assert_eq!(fmt_group_tm(&group(Some(61.24), None, true)), "61.2 ^");
        assert_eq!(fmt_group_tm(&group(None, None, false)), "no Tm");
    }

    #[test]
    fn ph_is_adjusted_to_the_melting_point() {
        let adjusted = adjusted_ph(&group(Some(60.0), None, false)).unwrap();
        assert!((adjusted - (7.0 - 0.014 * 40.0)).abs() < 1e-9);
    }

    #[test]
    fn adjustment_needs_a_coefficient_and_a_tm() {
        let mut g = group(Some(60.0), None, false);
        g.contents.dph_dt = None;
        assert_eq!(adjusted_ph(&g), None);

        let g = group(None, None, false);
        assert_eq!(adjusted_ph(&g), None);
    }

    fn supplied(found: bool, well_behaved: bool) -> SuppliedSummary {
        SuppliedSummary {
            found,
            tm: found.then_some(60.0),
            sd: None,
            well_behaved,
        }
    }

    #[test]
    fn reliability_warning_fires_on_each_degradation() {
        // healthy run: no warning
        assert!(!summary_is_unreliable(&supplied(true, true), Some(0.4), Some(90)));

        // supplied protein misbehaved
        assert!(summary_is_unreliable(&supplied(true, false), Some(0.4), Some(90)));

        // replicate Tm spread at or above 1.5
        assert!(summary_is_unreliable(&supplied(true, true), Some(1.5), Some(90)));

        // half or fewer of the curves contributed a Tm
        assert!(summary_is_unreliable(&supplied(true, true), Some(0.4), Some(50)));
    }

    #[test]
    fn absent_supplied_control_alone_is_not_a_warning() {
        assert!(!summary_is_unreliable(&supplied(false, false), None, Some(90)));
    }

    #[test]
    fn grid_is_denser_with_fewer_salts() {
        assert_eq!(grid_shape(3), (3, 92.0));
        assert_eq!(grid_shape(8), (2, 138.0));
        assert_eq!(grid_shape(20), (1, 184.0));
    }
}
