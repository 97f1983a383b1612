use palette::{Hsl, IntoColor, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<(u8, u8, u8)> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.45);
            let rgb: Srgb = hsl.into_color();
            (
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color mapping: salt value → colour
// ---------------------------------------------------------------------------

/// Assigns every distinct Condition Variable 2 value (salt) a colour, in
/// plate appearance order, shared by the charts and the PDF legends.
#[derive(Debug, Clone)]
pub struct SaltPalette {
    entries: Vec<(String, (u8, u8, u8))>,
    default_color: (u8, u8, u8),
}

impl SaltPalette {
    pub fn new(salts: &[String]) -> Self {
        let palette = generate_palette(salts.len());
        let entries = salts.iter().cloned().zip(palette).collect();
        SaltPalette {
            entries,
            default_color: (128, 128, 128),
        }
    }

    /// Look up the colour for a salt value.
    pub fn rgb(&self, salt: &str) -> (u8, u8, u8) {
        self.entries
            .iter()
            .find(|(s, _)| s == salt)
            .map(|(_, c)| *c)
            .unwrap_or(self.default_color)
    }

    pub fn plot_color(&self, salt: &str) -> RGBColor {
        let (r, g, b) = self.rgb(salt);
        RGBColor(r, g, b)
    }

    /// Salt values in assignment order, for legends.
    pub fn salts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(s, _)| s.as_str())
    }
}
