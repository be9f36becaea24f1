//! Define the command vocabulary accepted by the stepper motor controllers.

/// Bit asserted in the shutter input-limit bitfield when the closed limit
/// switch is made.
pub const SHUTTER_CLOSED_LIMIT_BIT: u32 = 2;
/// Bit asserted in the shutter input-limit bitfield when the open limit
/// switch is made.
pub const SHUTTER_OPEN_LIMIT_BIT: u32 = 3;

/// Relative step count large enough to drive the shutter across its full
/// travel; the limit switches stop the motor.
pub const SHUTTER_TRAVEL_STEPS: i64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCmd {
    /// Poll "motor is moving" for the shutter.
    ShutterMoving,
    /// Signed velocity of the shutter motor.
    ShutterVelocity,
    /// Input-limit bitfield for the shutter.
    ShutterLimits,
    /// Poll "motor is moving" for the azimuth axis.
    AzimuthMoving,
    /// Current signed step count of the azimuth motor.
    AzimuthPosition,
    /// Zero the azimuth step register.
    ZeroAzimuthCounter,
    /// Move the shutter by relative steps.
    MoveShutter(i64),
    /// Move the azimuth axis to an absolute step count.
    MoveAzimuth(i64),
    /// Stop the shutter at zero velocity.
    StopShutter,
    /// Stop the azimuth axis at zero velocity.
    StopAzimuth,
    /// Initiate a home seek on the azimuth axis.
    HomeAzimuth,
    Unknown,
}

impl MotorCmd {
    pub fn command(&self) -> String {
        match &self {
            MotorCmd::ShutterMoving => "OPR MV".to_string(),
            MotorCmd::ShutterVelocity => "OPR V".to_string(),
            MotorCmd::ShutterLimits => "OPR IL".to_string(),
            MotorCmd::AzimuthMoving => "APR MV".to_string(),
            MotorCmd::AzimuthPosition => "APR P".to_string(),
            MotorCmd::ZeroAzimuthCounter => "AP=0".to_string(),
            MotorCmd::MoveShutter(steps) => format!("OMR {steps}"),
            MotorCmd::MoveAzimuth(steps) => format!("AMA {steps}"),
            MotorCmd::StopShutter => "OSL 0".to_string(),
            MotorCmd::StopAzimuth => "ASL 0".to_string(),
            MotorCmd::HomeAzimuth => "AHM 1".to_string(),
            MotorCmd::Unknown => "".to_string(),
        }
    }

    /// True for the commands the controller answers with a value line.
    pub fn expects_value(&self) -> bool {
        matches!(
            self,
            MotorCmd::ShutterMoving
                | MotorCmd::ShutterVelocity
                | MotorCmd::ShutterLimits
                | MotorCmd::AzimuthMoving
                | MotorCmd::AzimuthPosition
        )
    }
}
