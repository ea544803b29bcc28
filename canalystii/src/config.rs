use std::{collections::BTreeMap, fs::read_to_string, path::{Path, PathBuf}};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use can_core::{ChannelConfig, error::CanError};
use crate::channel::index;
use crate::constant::{CANALYST_ENV, CANALYST_VAR, CONFIG_FILENAME};

/// The deserialize object mapped to a configuration file.
///
/// ```yaml
/// device_index: 0
/// channels:
///   0:
///     bitrate: 500000
///   1:
///     bitrate: 0
///     timing0: 0x00
///     timing1: 0x1C
///     mode: 1
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize, Getters)]
pub struct DeviceConfig {
    #[getter(copy)]
    #[serde(default)]
    device_index: usize,
    #[serde(default)]
    channels: BTreeMap<u8, ChannelConfig>,
}

impl DeviceConfig {
    pub fn new(device_index: usize) -> Self {
        Self { device_index, ..Default::default() }
    }

    pub fn set_channel(&mut self, channel: u8, cfg: ChannelConfig) -> &mut Self {
        self.channels.insert(channel, cfg);
        self
    }

    /// Load from the directory named by `CANALYST_CONFIG` in `canalyst.env`,
    /// or from the working directory when there is none.
    pub fn load() -> Result<Self, CanError> {
        let dir = match dotenvy::from_filename(CANALYST_ENV) {
            Ok(_) => std::env::var(CANALYST_VAR).ok(),
            Err(_) => None,
        };
        let path = config_path(dir);
        log::debug!("CANALYST-II - loading configuration: {}", path.display());

        Self::from_file(path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CanError> {
        let path = path.as_ref();
        let data = read_to_string(path)
            .map_err(|e| CanError::configuration_error(format!("unable to read `{}`: {}", path.display(), e)))?;

        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self, CanError> {
        let result: Self = serde_yaml::from_str(data)
            .map_err(|e| CanError::configuration_error(format!("error parsing YAML: {}", e)))?;

        for (&channel, cfg) in &result.channels {
            index(channel).map_err(|_| CanError::configuration_error(format!("unknown channel: {}", channel)))?;
            cfg.raw_timing()?;
        }

        Ok(result)
    }
}

fn config_path(dir: Option<String>) -> PathBuf {
    match dir {
        Some(v) => Path::new(&v).join(CONFIG_FILENAME),
        None => PathBuf::from(CONFIG_FILENAME),
    }
}
