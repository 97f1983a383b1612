mod analysis;
mod color;
mod data;
mod report;
mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use settings::Settings;

/// Melt-curve analysis for differential scanning fluorimetry plates.
///
/// Reads a tab-delimited DSF results file and its plate contents map,
/// estimates a melting temperature per condition, and writes a PDF report
/// next to the input data. Both files are prompted for with a file dialog
/// when not given on the command line.
#[derive(Parser, Debug)]
#[command(name = "meltdown", version)]
struct Cli {
    /// Tab-delimited DSF results file
    dsf_results: Option<PathBuf>,

    /// Tab-delimited plate contents map
    contents_map: Option<PathBuf>,

    /// Where to write the report; defaults to the results file with a
    /// .pdf extension
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write the normalised curves as a tab-delimited file
    #[arg(long)]
    normalised: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    // Dialog-driven runs get their feedback through message boxes too.
    let interactive = cli.dsf_results.is_none() || cli.contents_map.is_none();

    match run(&cli) {
        Ok(report_path) => {
            if interactive {
                rfd::MessageDialog::new()
                    .set_level(rfd::MessageLevel::Info)
                    .set_title("Meltdown")
                    .set_description(format!("Report written to {}", report_path.display()))
                    .show();
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e:?}");
            write_error_log(&e);
            rfd::MessageDialog::new()
                .set_level(rfd::MessageLevel::Error)
                .set_title("Meltdown")
                .set_description(format!("{e:#}\n\nDetails were written to error_log.txt"))
                .show();
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<PathBuf> {
    let options = Settings::load();

    let results = pick_file(cli.dsf_results.clone(), "Select the DSF results file")?;
    let map = pick_file(cli.contents_map.clone(), "Select the plate contents map")?;
    log::info!("results: {}", results.display());
    log::info!("contents map: {}", map.display());

    let plate = data::loader::load_plate(&results, &map)?;
    log::info!(
        "loaded {} wells over {} temperature steps",
        plate.names.len(),
        plate.temperatures.len()
    );

    let analysis = analysis::analyse(plate);
    let checks = analysis::controls::run_checks(&analysis);

    let report_path = cli
        .output
        .clone()
        .unwrap_or_else(|| results.with_extension("pdf"));
    let source_name = results
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| results.display().to_string());
    report::write_report(&analysis, &checks, &source_name, &report_path)?;

    if cli.normalised || options.normalised_output {
        let path = normalised_path(&results);
        data::export::write_normalised(&analysis.plate, &path)?;
        log::info!("normalised curves written to {}", path.display());
    }

    if options.delete_input_files {
        for input in [&results, &map] {
            if let Err(e) = std::fs::remove_file(input) {
                log::warn!("could not delete {}: {e}", input.display());
            }
        }
    }

    Ok(report_path)
}

/// Use the path from the command line, or fall back to a file dialog.
fn pick_file(path: Option<PathBuf>, title: &str) -> Result<PathBuf> {
    if let Some(path) = path {
        return Ok(path);
    }
    rfd::FileDialog::new()
        .set_title(title)
        .add_filter("Tab-delimited data", &["txt", "tsv", "csv"])
        .pick_file()
        .context("no input file was selected")
}

fn normalised_path(results: &Path) -> PathBuf {
    let stem = results
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "meltdown".to_string());
    results.with_file_name(format!("{stem}-normalised.txt"))
}

/// Record the failure next to the executable so dialog-launched runs leave
/// a trace after the message box is dismissed.
fn write_error_log(e: &anyhow::Error) {
    let path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("error_log.txt")))
        .unwrap_or_else(|| PathBuf::from("error_log.txt"));
    let text = format!("Meltdown v{}\n{e:?}\n", env!("CARGO_PKG_VERSION"));
    if let Err(write_err) = std::fs::write(&path, text) {
        log::warn!("could not write {}: {write_err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalised_path_sits_next_to_the_input() {
        let path = normalised_path(Path::new("/data/run-07.txt"));
        assert_eq!(path, Path::new("/data/run-07-normalised.txt"));
    }
}
