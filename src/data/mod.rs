/// Data layer: core types, loading, and the normalised-curve export.
///
/// Architecture:
/// ```text
///  results.txt        contents map.txt
///        │                  │
///        └───────┬──────────┘
///                ▼
///           ┌──────────┐
///           │  loader   │  parse + join the two files → Plate
///           └──────────┘
///                │
///                ▼
///           ┌──────────┐
///           │  Plate    │  temperature axis, wells, replicate groups
///           └──────────┘
///                │
///                ▼
///           ┌──────────┐
///           │  export   │  normalised curves back to tab-delimited text
///           └──────────┘
/// ```

pub mod export;
pub mod loader;
pub mod model;
