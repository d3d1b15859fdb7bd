//! The RON configuration file: how to talk to the tracker, and what to
//! digitise.
//!
//! ```text
//! (
//!     session: (stylus_receiver: 0, head_reference: 1, baud_rate: 115200),
//!     tasks: [
//!         (category: "fiducials", mode: "single", labels: ["lpa", "rpa", "nasion"]),
//!         (category: "head", mode: "continuous", n_points: Some(60)),
//!     ],
//! )
//! ```
//!
//! Missing session fields take their defaults. An empty task list is valid
//! and digitises nothing.

use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};
use thiserror::Error;

use crate::{
    receiver_session::SessionConfig,
    scheme::{DigitisationScheme, SchemeError, TaskDescriptor},
};

/// Errors from loading or saving a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid RON.
    #[error("config is not valid RON: {0}")]
    Ron(#[from] ron::de::SpannedError),

    /// Serialising the config failed.
    #[error("cannot write config: {0}")]
    Write(#[from] ron::Error),

    /// A task descriptor is invalid.
    #[error(transparent)]
    Scheme(#[from] SchemeError),
}

/// Everything a capture run needs besides the port name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitiseConfig {
    /// Serial link and receiver settings.
    pub session: SessionConfig,
    /// Tasks in the order they run.
    pub tasks: Vec<TaskDescriptor>,
}

impl DigitiseConfig {
    /// Read a config file. Task descriptors are not validated until
    /// [`scheme`](Self::scheme) is called.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_ron_str(&fs::read_to_string(path)?)
    }

    /// Parse a config from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Write the config out, e.g. to give the operator a starting point.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Validate the task descriptors and build the scheme.
    pub fn scheme(&self) -> Result<DigitisationScheme, ConfigError> {
        Ok(DigitisationScheme::from_descriptors(&self.tasks)?)
    }

    /// The layout used when no config file is given: the three head
    /// fiducials followed by a sweep of the head surface.
    pub fn standard() -> Self {
        let descriptor = |category: &str, mode: &str, labels: &[&str], n_points: Option<usize>| TaskDescriptor {
            category: category.to_owned(),
            mode: mode.to_owned(),
            labels: labels.iter().map(|&l| l.to_owned()).collect(),
            n_points,
            limit: None,
        };
        Self {
            session: SessionConfig::default(),
            tasks: vec![
                descriptor("fiducials", "single", &["lpa", "rpa", "nasion"], None),
                descriptor("head", "continuous", &[], Some(60)),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{Category, TaskMode};

    #[test]
    fn session_fields_default() {
        let text = r#"(
            session: (head_reference: 0, stylus_receiver: 1),
            tasks: [
                (category: "OPM", mode: "single", labels: ["FL1", "FL2"], limit: Some(25.0)),
            ],
        )"#;

        let config = DigitiseConfig::from_ron_str(text).unwrap();

        assert_eq!(config.session.stylus_receiver, 1);
        assert_eq!(config.session.baud_rate, 115200);
        assert_eq!(config.session.command_delay_ms, 100);
        let scheme = config.scheme().unwrap();
        assert_eq!(scheme.tasks()[0].kind(), Category::Opm);
        assert_eq!(scheme.tasks()[0].limit(), 25.0);
    }

    #[test]
    fn missing_sections_default() {
        let config = DigitiseConfig::from_ron_str("(tasks: [])").unwrap();

        assert_eq!(config, DigitiseConfig::default());
        assert!(config.scheme().unwrap().is_empty());
    }

    #[test]
    fn bad_task_fails_before_any_capture() {
        let text = r#"(tasks: [(category: "head", mode: "continuous")])"#;

        let config = DigitiseConfig::from_ron_str(text).unwrap();

        assert!(matches!(
            config.scheme(),
            Err(ConfigError::Scheme(SchemeError::MissingPointCount { .. }))
        ));
    }

    #[test]
    fn malformed_ron_is_reported() {
        assert!(matches!(
            DigitiseConfig::from_ron_str("(session: ("),
            Err(ConfigError::Ron(_))
        ));
    }

    #[test]
    fn standard_config_round_trips_through_file() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let config = DigitiseConfig::standard();

        config.to_path(tempfile.path()).unwrap();
        let read = DigitiseConfig::from_path(tempfile.path()).unwrap();

        assert_eq!(read, config);
        let scheme = read.scheme().unwrap();
        assert_eq!(scheme.total_points(), 63);
        assert_eq!(scheme.tasks()[1].mode(), TaskMode::Continuous);
    }
}
