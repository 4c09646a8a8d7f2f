//! Configuration of the bridge. The config is loaded from YAML before the
//! environment is initialized and is immutable afterwards.
//!
//! Partial configs are supported i.e you do not have to fully spell out the
//! YAML for a given section. Serde fills in the defaults for whatever is
//! missing.
use std::{
    fmt::Display,
    fs::{self, File},
    io::{ErrorKind, Write},
    path::Path,
};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Snafu)]
#[snafu(visibility = "pub")]
pub enum ConfigError {
    #[snafu(display("Failed to read config file {}: {}", file, source))]
    ReadConfig {
        source: std::io::Error,
        file: String,
    },
    #[snafu(display("Failed to parse config file {}: {}", file, source))]
    ParseConfig {
        source: serde_yaml::Error,
        file: String,
    },
    #[snafu(display("Failed to serialize config: {}", source))]
    SerializeConfig { source: serde_yaml::Error },
    #[snafu(display("Failed to write config file {}: {}", file, source))]
    WriteConfig {
        source: std::io::Error,
        file: String,
    },
}

/// Options for the I/O descriptor pools and the devices of the in-memory
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolOpts {
    /// number of I/O descriptors per channel
    pub channel_pool_size: usize,
    /// block size of created devices
    pub block_len: u32,
    /// number of blocks of created devices
    pub num_blocks: u64,
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            channel_pool_size: 256,
            block_len: 512,
            num_blocks: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// location of the config file that we loaded
    #[serde(skip)]
    pub source: Option<String>,
    /// default log filter, overruled by RUST_LOG
    pub log_level: String,
    /// compare the descriptor layout with the engine during init
    pub verify_layout: bool,
    pub pool: PoolOpts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            log_level: "info".into(),
            verify_layout: true,
            pool: Default::default(),
        }
    }
}

impl Config {
    /// initialize the config by executing F and return a reference to the
    /// initialized data
    pub fn get_or_init<F>(f: F) -> &'static Self
    where
        F: FnOnce() -> Config,
    {
        CONFIG.get_or_init(f)
    }

    /// the global config, the default one if nothing was set before
    pub fn get() -> &'static Self {
        CONFIG.get_or_init(Config::default)
    }

    /// Read the config file from disk. A missing or empty file yields the
    /// default config, which still records the file so it can be written
    /// out later.
    pub fn read<P>(file: P) -> Result<Config, ConfigError>
    where
        P: AsRef<Path> + Display,
    {
        debug!("loading configuration file from {}", file);
        let cfg = match fs::read(&file) {
            Ok(cfg) => cfg,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).context(ReadConfig {
                    file: file.to_string(),
                })
            }
        };

        let mut config = if cfg.is_empty() {
            info!("Config file {} is empty, reverting to default config", file);
            Config::default()
        } else {
            serde_yaml::from_slice(&cfg).context(ParseConfig {
                file: file.to_string(),
            })?
        };

        config.source = Some(file.to_string());
        Ok(config)
    }

    /// write the configuration to disk
    pub fn write<P>(&self, file: P) -> Result<(), ConfigError>
    where
        P: AsRef<Path> + Display,
    {
        let s = serde_yaml::to_string(&self).context(SerializeConfig)?;
        File::create(&file)
            .and_then(|mut f| f.write_all(s.as_bytes()))
            .context(WriteConfig {
                file: file.to_string(),
            })
    }
}
