use std::path::PathBuf;

use serde::Deserialize;

/// Optional running options, read from a `meltdown.toml` next to the
/// executable (or in the working directory). Everything defaults to off;
/// a missing file is not an error.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Delete the two input files after a successful run.
    pub delete_input_files: bool,
    /// Also write the normalised curves as a tab-delimited file.
    pub normalised_output: bool,
}

impl Settings {
    pub const FILE_NAME: &'static str = "meltdown.toml";

    /// Load settings from the first `meltdown.toml` found. A file that
    /// exists but does not parse is reported and ignored.
    pub fn load() -> Self {
        for dir in Self::search_dirs() {
            let path = dir.join(Self::FILE_NAME);
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            match toml::from_str(&text) {
                Ok(settings) => {
                    log::info!("using settings from {}", path.display());
                    return settings;
                }
                Err(e) => {
                    log::warn!("ignoring malformed {}: {e}", path.display());
                }
            }
        }
        Settings::default()
    }

    fn search_dirs() -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Ok(exe) = std::env::current_exe() {
            if let Some(parent) = exe.parent() {
                dirs.push(parent.to_path_buf());
            }
        }
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_off() {
        let settings = Settings::default();
        assert!(!settings.delete_input_files);
        assert!(!settings.normalised_output);
    }

    #[test]
    fn parses_the_documented_keys() {
        let settings: Settings =
            toml::from_str("delete_input_files = true\nnormalised_output = true\n").unwrap();
        assert!(settings.delete_input_files);
        assert!(settings.normalised_output);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let settings: Settings = toml::from_str("normalised_output = true\n").unwrap();
        assert_eq!(
            settings,
            Settings {
                delete_input_files: false,
                normalised_output: true,
            }
        );
    }
}
