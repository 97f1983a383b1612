use std::path::Path;

use anyhow::{Context, Result};

use super::model::Plate;

/// Write the normalised curves back out as a tab-delimited table with the
/// same shape as the input: a `Temperature` column plus one column per well,
/// in plate order.
pub fn write_normalised(plate: &Plate, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .context("creating normalised output file")?;

    let mut header = vec!["Temperature".to_string()];
    header.extend(plate.names.iter().cloned());
    writer.write_record(&header).context("writing header")?;

    for (i, temperature) in plate.temperatures.iter().enumerate() {
        let mut row = vec![temperature.to_string()];
        for name in &plate.names {
            row.push(plate.wells[name].fluorescence[i].to_string());
        }
        writer
            .write_record(&row)
            .with_context(|| format!("writing row {i}"))?;
    }
    writer.flush().context("flushing normalised output")?;
    log::info!("wrote normalised curves to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_plate;
    use std::io::Write;

    #[test]
    fn export_mirrors_the_input_shape() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.txt");
        let map = dir.path().join("map.txt");
        std::fs::File::create(&results)
            .unwrap()
            .write_all(b"Temperature\tA1\tA2\n25\t100\t50\n26\t110\t60\n27\t120\t70\n")
            .unwrap();
        std::fs::File::create(&map)
            .unwrap()
            .write_all(
                b"Well\tCondition Variable 1\tCondition Variable 2\nA1\tx\t\nA2\tx\t\n",
            )
            .unwrap();

        let plate = load_plate(&results, &map).unwrap();
        let out = dir.path().join("normalised.txt");
        write_normalised(&plate, &out).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "Temperature\tA1\tA2");
        assert_eq!(lines.count(), 3);
    }
}
