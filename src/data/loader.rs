use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use thiserror::Error;

use super::model::{ControlKind, Plate, Well, WellContents};

// ---------------------------------------------------------------------------
// Contract violations
// ---------------------------------------------------------------------------

/// Violations of the two-file input contract. Everything else (I/O, ragged
/// rows, unparseable numbers) surfaces as a plain [`anyhow`] error.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("DSF results file must contain exactly one 'Temperature' column (found {0})")]
    TemperatureColumns(usize),
    #[error("duplicate well column '{0}' in DSF results file")]
    DuplicateWellColumn(String),
    #[error("DSF results file needs at least two temperature rows")]
    TooFewRows,
    #[error("contents map is missing required column '{0}'")]
    MissingMapColumn(&'static str),
    #[error("contents map row {row}: well '{well}' does not match any column of the DSF results file")]
    UnknownWell { row: usize, well: String },
    #[error("contents map row {row}: well '{well}' is listed more than once")]
    DuplicateMapRow { row: usize, well: String },
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load and join the two input files into a [`Plate`].
///
/// * `results_path` – tab-delimited melt-curve table: one `Temperature`
///   column, one column per well.
/// * `map_path` – tab-delimited contents map: `Well`,
///   `Condition Variable 1`, `Condition Variable 2` required; `pH`,
///   `d(pH)/dT`, `Control` optional.
pub fn load_plate(results_path: &Path, map_path: &Path) -> Result<Plate> {
    let (temperatures, curves) =
        load_dsf_results(results_path).context("reading DSF results file")?;
    let rows = load_contents_map(map_path, &curves).context("reading contents map")?;

    let mut names = Vec::with_capacity(rows.len());
    let mut wells = BTreeMap::new();
    for (name, contents) in rows {
        let raw = parse_curve(&curves[&name], &name).context("reading DSF results file")?;
        wells.insert(
            name.clone(),
            Well::new(name.clone(), &temperatures, raw, contents),
        );
        names.push(name);
    }

    let mut plate = Plate {
        temperatures,
        names,
        wells,
        replicates: BTreeMap::new(),
    };
    plate.index_replicates();
    log::info!(
        "loaded plate: {} wells, {} temperature steps",
        plate.names.len(),
        plate.temperatures.len()
    );
    Ok(plate)
}

// ---------------------------------------------------------------------------
// DSF results file
// ---------------------------------------------------------------------------

/// Parse the melt-curve table into the temperature axis and one column of
/// raw readings per well column. `Unnamed` columns (empty export artifacts)
/// are dropped, as are rows that are entirely blank. Readings stay as text
/// here: only the columns the contents map references get parsed as
/// numbers, so stray annotation columns cannot abort the run.
fn load_dsf_results(path: &Path) -> Result<(Vec<f64>, BTreeMap<String, Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .context("opening DSF results file")?;

    let headers: Vec<String> = reader
        .headers()
        .context("reading DSF results headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let temp_count = headers.iter().filter(|h| *h == "Temperature").count();
    if temp_count != 1 {
        return Err(ContractError::TemperatureColumns(temp_count).into());
    }
    let temp_idx = headers.iter().position(|h| h == "Temperature").unwrap();

    // Well columns: everything except Temperature, blank headers, and the
    // `Unnamed` columns some exporters emit.
    let mut well_columns: Vec<(usize, String)> = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if i == temp_idx || header.is_empty() || header.starts_with("Unnamed") {
            continue;
        }
        if well_columns.iter().any(|(_, name)| name == header) {
            return Err(ContractError::DuplicateWellColumn(header.clone()).into());
        }
        well_columns.push((i, header.clone()));
    }

    let mut temperatures = Vec::new();
    let mut curves: BTreeMap<String, Vec<String>> =
        well_columns.iter().map(|(_, n)| (n.clone(), Vec::new())).collect();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("DSF results row {row_no}"))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let temp_field = record.get(temp_idx).unwrap_or("").trim();
        let temperature: f64 = temp_field
            .parse()
            .with_context(|| format!("row {row_no}: '{temp_field}' is not a temperature"))?;
        temperatures.push(temperature);

        for (idx, name) in &well_columns {
            let field = record.get(*idx).unwrap_or("").trim();
            curves.get_mut(name).unwrap().push(field.to_string());
        }
    }

    if temperatures.len() < 2 {
        return Err(ContractError::TooFewRows.into());
    }
    Ok((temperatures, curves))
}

/// Parse the readings of one mapped well column.
fn parse_curve(fields: &[String], well: &str) -> Result<Vec<f64>> {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            field
                .parse()
                .with_context(|| format!("row {i}, well {well}: '{field}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Contents map
// ---------------------------------------------------------------------------

/// Parse the contents map and check referential integrity against the well
/// columns of the results file. Returns (well, contents) in file order.
fn load_contents_map(
    path: &Path,
    curves: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<(String, WellContents)>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .context("opening contents map")?;

    let headers: Vec<String> = reader
        .headers()
        .context("reading contents map headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let required = |name: &'static str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ContractError::MissingMapColumn(name).into())
    };
    let well_idx = required("Well")?;
    let condition_idx = required("Condition Variable 1")?;
    let salt_idx = required("Condition Variable 2")?;

    let ph_idx = headers.iter().position(|h| h == "pH");
    let dph_idx = headers.iter().position(|h| h == "d(pH)/dT");
    let control_idx = headers.iter().position(|h| h == "Control");

    let mut rows: Vec<(String, WellContents)> = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("contents map row {row_no}"))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let well = record.get(well_idx).unwrap_or("").trim().to_string();
        if well.is_empty() {
            bail!("contents map row {row_no}: empty 'Well' cell");
        }
        if !curves.contains_key(&well) {
            return Err(ContractError::UnknownWell { row: row_no, well }.into());
        }
        if rows.iter().any(|(name, _)| *name == well) {
            return Err(ContractError::DuplicateMapRow { row: row_no, well }.into());
        }

        let condition = record.get(condition_idx).unwrap_or("").trim().to_string();
        let salt = record.get(salt_idx).unwrap_or("").trim().to_string();
        let ph = optional_float(&record, ph_idx, row_no, "pH")?;
        let dph_dt = optional_float(&record, dph_idx, row_no, "d(pH)/dT")?;

        let control_flag = control_idx
            .and_then(|i| record.get(i))
            .map(|f| matches!(f.trim(), "1" | "1.0"))
            .unwrap_or(false);

        // A recognised control name always wins over the Control column.
        let control = ControlKind::from_condition(&condition);
        let contents = WellContents {
            condition,
            salt,
            ph,
            dph_dt,
            is_control: control_flag || control.is_some(),
            control,
        };
        rows.push((well, contents));
    }

    if rows.is_empty() {
        bail!("contents map describes no wells");
    }
    Ok(rows)
}

fn optional_float(
    record: &csv::StringRecord,
    idx: Option<usize>,
    row_no: usize,
    column: &str,
) -> Result<Option<f64>> {
    let Some(idx) = idx else { return Ok(None) };
    let field = record.get(idx).unwrap_or("").trim();
    if field.is_empty() {
        return Ok(None);
    }
    let value = field
        .parse()
        .with_context(|| format!("contents map row {row_no}, {column}: '{field}' is not a number"))?;
    Ok(Some(value))
}
