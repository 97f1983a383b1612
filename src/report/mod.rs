/// Report layer: chart rendering and PDF assembly.
///
/// Architecture:
/// ```text
///   ┌────────────┐
///   │ MeltAnalysis│  analysed plate + control checks
///   └────────────┘
///         │
///         ▼
///   ┌────────────┐
///   │   charts    │  plotters → in-memory RGB bitmaps
///   └────────────┘
///         │
///         ▼
///   ┌────────────┐
///   │    pdf      │  printpdf layout, charts embedded as images
///   └────────────┘
/// ```
pub mod charts;
pub mod pdf;

pub use pdf::write_report;
