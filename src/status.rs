//! Status codes, the dome state record and the snapshot returned to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status of the dome rotation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AzimuthStatus {
    #[default]
    Disconnected,
    NotHomed,
    Idle,
    Moving,
    Homing,
}

impl AzimuthStatus {
    pub fn code(&self) -> u8 {
        match self {
            AzimuthStatus::Disconnected => 0,
            AzimuthStatus::NotHomed => 1,
            AzimuthStatus::Idle => 2,
            AzimuthStatus::Moving => 3,
            AzimuthStatus::Homing => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AzimuthStatus::Disconnected => "DISCONNECTED",
            AzimuthStatus::NotHomed => "NOT HOMED",
            AzimuthStatus::Idle => "IDLE",
            AzimuthStatus::Moving => "MOVING",
            AzimuthStatus::Homing => "HOMING",
        }
    }
}

/// Status of the dome shutter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ShutterStatus {
    #[default]
    Disconnected,
    Closed,
    Open,
    PartiallyOpen,
    Opening,
    Closing,
}

impl ShutterStatus {
    pub fn code(&self) -> u8 {
        match self {
            ShutterStatus::Disconnected => 0,
            ShutterStatus::Closed => 1,
            ShutterStatus::Open => 2,
            ShutterStatus::PartiallyOpen => 3,
            ShutterStatus::Opening => 4,
            ShutterStatus::Closing => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShutterStatus::Disconnected => "DISCONNECTED",
            ShutterStatus::Closed => "CLOSED",
            ShutterStatus::Open => "OPEN",
            ShutterStatus::PartiallyOpen => "PARTIALLY OPEN",
            ShutterStatus::Opening => "OPENING",
            ShutterStatus::Closing => "CLOSING",
        }
    }
}

/// Status of the dome heartbeat monitoring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    #[default]
    Disabled,
    Active,
    TrippedClosing,
    TrippedIdle,
}

impl HeartbeatStatus {
    pub fn code(&self) -> u8 {
        match self {
            HeartbeatStatus::Disabled => 0,
            HeartbeatStatus::Active => 1,
            HeartbeatStatus::TrippedClosing => 2,
            HeartbeatStatus::TrippedIdle => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HeartbeatStatus::Disabled => "DISABLED",
            HeartbeatStatus::Active => "ACTIVE",
            HeartbeatStatus::TrippedClosing => "CLOSING DOME",
            HeartbeatStatus::TrippedIdle => "TRIPPED",
        }
    }
}

/// Numeric return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Succeeded,
    Failed,
    Blocked,
    InvalidControlIP,
    NotConnected,
    NotDisconnected,
    NotHomed,
    HeartbeatTimedOut,
    HeartbeatCloseInProgress,
    HeartbeatInvalidTimeout,
    EngineeringModeRequiresHeartbeatDisabled,
    EngineeringModeActive,
    FollowModeActive,
}

impl CommandStatus {
    pub fn code(&self) -> u8 {
        match self {
            CommandStatus::Succeeded => 0,
            CommandStatus::Failed => 1,
            CommandStatus::Blocked => 2,
            CommandStatus::InvalidControlIP => 3,
            CommandStatus::NotConnected => 7,
            CommandStatus::NotDisconnected => 8,
            CommandStatus::NotHomed => 9,
            CommandStatus::HeartbeatTimedOut => 13,
            CommandStatus::HeartbeatCloseInProgress => 14,
            CommandStatus::HeartbeatInvalidTimeout => 16,
            CommandStatus::EngineeringModeRequiresHeartbeatDisabled => 17,
            CommandStatus::EngineeringModeActive => 18,
            CommandStatus::FollowModeActive => 19,
        }
    }

    /// Returns a human readable string describing an error code.
    pub fn message(&self) -> &'static str {
        match self {
            CommandStatus::Succeeded => "command succeeded",
            CommandStatus::Failed => "error: command failed",
            CommandStatus::Blocked => "error: another command is already running",
            CommandStatus::InvalidControlIP => "error: command not accepted from this IP",
            CommandStatus::NotConnected => "error: dome is not connected",
            CommandStatus::NotDisconnected => "error: dome is already connected",
            CommandStatus::NotHomed => "error: dome has not been homed",
            CommandStatus::HeartbeatTimedOut => "error: heartbeat has tripped",
            CommandStatus::HeartbeatCloseInProgress => "error: heartbeat is closing the dome",
            CommandStatus::HeartbeatInvalidTimeout => {
                "error: heartbeat timeout must be less than 180s"
            }
            CommandStatus::EngineeringModeRequiresHeartbeatDisabled => {
                "error: heartbeat must be disabled before enabling engineering mode"
            }
            CommandStatus::EngineeringModeActive => "error: dome is in engineering mode",
            CommandStatus::FollowModeActive => "error: dome is following the telescope",
        }
    }
}

/// The authoritative dome state, mutated only by the controller task and
/// published through a watch channel after every iteration.
#[derive(Debug, Clone)]
pub struct DomeState {
    pub state_timestamp: DateTime<Utc>,
    pub connected: bool,
    pub azimuth_status: AzimuthStatus,
    pub shutter_status: ShutterStatus,
    pub heartbeat_status: HeartbeatStatus,
    /// Unwrapped slit azimuth; may lie outside [0, 360).
    pub azimuth_degrees: f64,
    pub heartbeat_expires_at: Option<DateTime<Utc>>,
    pub engineering_mode: bool,
    pub follow_telescope: bool,
    pub tracking_coord: Option<(f64, f64)>,
    /// Target dome azimuth computed on the latest tracking evaluation.
    pub tracking_azimuth: Option<f64>,
    /// A park slew is owed after the current home completes.
    pub park_pending: bool,
}

impl Default for DomeState {
    fn default() -> DomeState {
        DomeState {
            state_timestamp: Utc::now(),
            connected: false,
            azimuth_status: AzimuthStatus::Disconnected,
            shutter_status: ShutterStatus::Disconnected,
            heartbeat_status: HeartbeatStatus::Disabled,
            azimuth_degrees: 0.0,
            heartbeat_expires_at: None,
            engineering_mode: false,
            follow_telescope: true,
            tracking_coord: None,
            tracking_azimuth: None,
            park_pending: false,
        }
    }
}

impl DomeState {
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot {
            date: self.state_timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            azimuth_status: self.azimuth_status.code(),
            azimuth_status_label: self.azimuth_status.label(),
            shutter: self.shutter_status.code(),
            shutter_label: self.shutter_status.label(),
            engineering_mode: self.engineering_mode,
            azimuth: None,
            follow_telescope: None,
            closed: None,
            heartbeat_status: None,
            heartbeat_status_label: None,
            heartbeat_remaining: None,
            tracking_ra: None,
            tracking_dec: None,
            tracking_azimuth: None,
        };

        if !self.connected {
            return snapshot;
        }

        snapshot.azimuth = Some(self.azimuth_degrees.rem_euclid(360.0));
        snapshot.follow_telescope = Some(self.follow_telescope);
        snapshot.closed = Some(self.shutter_status == ShutterStatus::Closed);
        snapshot.heartbeat_status = Some(self.heartbeat_status.code());
        snapshot.heartbeat_status_label = Some(self.heartbeat_status.label());

        if self.heartbeat_status == HeartbeatStatus::Active {
            if let Some(expires_at) = self.heartbeat_expires_at {
                let remaining = (expires_at - self.state_timestamp).num_milliseconds() as f64
                    / 1000.0;
                snapshot.heartbeat_remaining = Some(remaining.max(0.0));
            }
        }

        if let Some((ra, dec)) = self.tracking_coord {
            snapshot.tracking_ra = Some(ra);
            snapshot.tracking_dec = Some(dec);
            snapshot.tracking_azimuth = self.tracking_azimuth;
        }

        snapshot
    }
}

/// Status snapshot returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub date: String,
    pub azimuth_status: u8,
    pub azimuth_status_label: &'static str,
    pub shutter: u8,
    pub shutter_label: &'static str,
    pub engineering_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_telescope: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_status_label: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_ra: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_dec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_azimuth: Option<f64>,
}
