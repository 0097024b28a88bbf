//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot determine the software root directory: {0}")]
    SwRootNotFound(std::io::Error),

    #[error("Cannot load the parmeter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// Relative paths are relative to the `params` directory under the software root. Absolute paths
/// are read as is.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let path = resolve(param_file_path)?;

    // Load the file into a string
    let params_str = read_to_string(&path).map_err(|e| LoadError::FileLoadError(path, e))?;

    // Parse the string into the parameter struct
    toml::from_str(params_str.as_str()).map_err(LoadError::DeserialiseError)
}

/// Load a parameter file, falling back on the default parameters if the file cannot be loaded.
pub fn load_or_default<P>(param_file_path: &str) -> P
where
    P: DeserializeOwned + Default,
{
    match load(param_file_path) {
        Ok(p) => p,
        Err(e) => {
            warn!("{}, using default parameters", e);
            P::default()
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn resolve(param_file_path: &str) -> Result<PathBuf, LoadError> {
    if Path::new(param_file_path).is_absolute() {
        return Ok(PathBuf::from(param_file_path));
    }

    let mut path = crate::host::get_sw_root().map_err(LoadError::SwRootNotFound)?;
    path.push("params");
    path.push(param_file_path);

    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct TestParams {
        rate_hz: f64,
        name: String,
    }

    #[test]
    fn test_load_absolute() {
        let mut path = std::env::temp_dir();
        path.push(format!("util_params_test_{}.toml", std::process::id()));

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "rate_hz = 10.0").unwrap();
        drop(file);

        let params: TestParams = load(path.to_str().unwrap()).unwrap();
        assert_eq!(params.rate_hz, 10.0);
        assert_eq!(params.name, "");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_or_default_missing() {
        let params: TestParams = load_or_default("/definitely/not/a/params/file.toml");
        assert_eq!(params, TestParams::default());
    }
}
