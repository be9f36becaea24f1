//! Parse and validate the daemon json configuration file.

use serde::Deserialize;
use std::{fs, net::IpAddr, path::Path};

use crate::error::{DomeError, DomeResult};

fn default_serial_retries() -> u32 {
    3
}

/// Daemon configuration parsed from a json file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub serial_port: String,
    pub serial_baud: u32,
    pub serial_timeout: f64,
    #[serde(default = "default_serial_retries")]
    pub serial_retries: u32,
    pub steps_per_rotation: f64,
    pub home_azimuth: f64,
    pub park_azimuth: f64,
    pub tracking_max_separation: f64,
    pub idle_loop_delay: f64,
    pub moving_loop_delay: f64,
    pub azimuth_move_timeout: f64,
    pub shutter_move_timeout: f64,
    pub dome_radius_cm: f64,
    pub telescope_offset_x_cm: f64,
    pub control_ips: Vec<IpAddr>,
    pub telescope_ips: Vec<IpAddr>,
}

impl Config {
    pub fn load(config_filename: &Path) -> DomeResult<Config> {
        let config_json = fs::read_to_string(config_filename)?;
        Config::from_json(&config_json)
    }

    pub fn from_json(config_json: &str) -> DomeResult<Config> {
        let config: Config = serde_json::from_str(config_json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> DomeResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DomeError::new("latitude must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DomeError::new("longitude must be between -180 and 180"));
        }
        if self.altitude < 0.0 {
            return Err(DomeError::new("altitude must not be negative"));
        }
        if self.serial_baud == 0 {
            return Err(DomeError::new("serial_baud must be positive"));
        }
        if self.serial_timeout <= 0.0 {
            return Err(DomeError::new("serial_timeout must be positive"));
        }
        if self.serial_retries == 0 {
            return Err(DomeError::new("serial_retries must be positive"));
        }
        if self.steps_per_rotation <= 0.0 {
            return Err(DomeError::new("steps_per_rotation must be positive"));
        }
        if !(0.0..360.0).contains(&self.home_azimuth) {
            return Err(DomeError::new("home_azimuth must be in [0, 360)"));
        }
        if !(0.0..360.0).contains(&self.park_azimuth) {
            return Err(DomeError::new("park_azimuth must be in [0, 360)"));
        }
        if self.tracking_max_separation <= 0.0 {
            return Err(DomeError::new("tracking_max_separation must be positive"));
        }
        if self.idle_loop_delay <= 0.0 || self.moving_loop_delay <= 0.0 {
            return Err(DomeError::new("loop delays must be positive"));
        }
        if self.azimuth_move_timeout <= 0.0 || self.shutter_move_timeout <= 0.0 {
            return Err(DomeError::new("move timeouts must be positive"));
        }
        if self.dome_radius_cm <= 0.0 {
            return Err(DomeError::new("dome_radius_cm must be positive"));
        }
        Ok(())
    }
}
