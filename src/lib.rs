//! Control daemon core for an observatory dome.
//!
//! Drives the azimuth and shutter stepper motors over a serial link, keeps
//! the slit aligned with the telescope and closes the shutter when the
//! supervising software stops asserting liveness.

pub mod config;
pub mod controller;
pub mod dome;
pub mod error;
pub mod geometry;
pub mod mock_controller;
pub mod motor_cmd_regex;
pub mod motor_command;
pub mod serial_link;
pub mod status;
