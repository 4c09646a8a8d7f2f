use structopt::StructOpt;

use crate::{
    config::{Config, ConfigError},
    core::{layout, CoreError},
    logger,
};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "bioprobe",
    about = "Acquire engine I/O descriptors until the channel pool runs dry",
    setting(structopt::clap::AppSettings::ColoredHelp)
)]
pub struct BridgeCliArgs {
    #[structopt(short = "c")]
    /// Path to the configuration file if any
    pub config: Option<String>,
    #[structopt(short = "l", env = "IOBRIDGE_LOGLEVEL")]
    /// Log level, overrides the configuration file
    pub log_level: Option<String>,
    #[structopt(short = "n")]
    /// Number of I/O descriptors per channel
    pub pool_size: Option<usize>,
    #[structopt(short = "b", default_value = "mem0")]
    /// Name of the device to probe
    pub bdev: String,
    #[structopt(long = "skip-layout-check")]
    /// Do not compare the descriptor layout with the engine
    pub skip_layout_check: bool,
}

/// Defaults are redefined here in case of using it during tests
impl Default for BridgeCliArgs {
    fn default() -> Self {
        Self {
            config: None,
            log_level: None,
            pool_size: None,
            bdev: "mem0".into(),
            skip_layout_check: false,
        }
    }
}

impl BridgeCliArgs {
    /// Load the configuration file, if any, and apply the command line
    /// overrides on top of it.
    pub fn config(&self) -> Result<Config, ConfigError> {
        let mut cfg = match &self.config {
            Some(file) => Config::read(file)?,
            None => Config::default(),
        };

        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        if let Some(size) = self.pool_size {
            cfg.pool.channel_pool_size = size;
        }
        if self.skip_layout_check {
            cfg.verify_layout = false;
        }
        Ok(cfg)
    }
}

/// Bring up the bridge: configure logging, point the engine's log trampoline
/// at Rust and forward engine records to the `log` facade. When enabled, the
/// descriptor layout is verified before any descriptor is touched.
pub fn bridge_env_init(cfg: &Config) -> Result<(), CoreError> {
    logger::init(&cfg.log_level);
    logger::install();
    logger::forward_to_log();

    if cfg.verify_layout {
        layout::verify()?;
    }

    info!(
        "bridge initialized, {} I/O descriptors per channel",
        cfg.pool.channel_pool_size
    );
    Ok(())
}
