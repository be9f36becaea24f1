use regex::{Regex, RegexSet};

use crate::motor_command::MotorCmd;

const SHUTTER_MOVING_REGEX: &str = r"^OPR MV$";
const SHUTTER_VELOCITY_REGEX: &str = r"^OPR V$";
const SHUTTER_LIMITS_REGEX: &str = r"^OPR IL$";
const AZIMUTH_MOVING_REGEX: &str = r"^APR MV$";
const AZIMUTH_POSITION_REGEX: &str = r"^APR P$";
const ZERO_AZIMUTH_COUNTER_REGEX: &str = r"^AP=0$";
const MOVE_SHUTTER_REGEX: &str = r"^OMR (?P<steps>-?[0-9]+)$";
const MOVE_AZIMUTH_REGEX: &str = r"^AMA (?P<steps>-?[0-9]+)$";
const STOP_SHUTTER_REGEX: &str = r"^OSL 0$";
const STOP_AZIMUTH_REGEX: &str = r"^ASL 0$";
const HOME_AZIMUTH_REGEX: &str = r"^AHM 1$";

pub struct MotorCmdRegex {
    regex_set: RegexSet,
    regex: Vec<Regex>,
}

impl MotorCmdRegex {
    pub fn new() -> MotorCmdRegex {
        let regex_set = RegexSet::new([
            SHUTTER_MOVING_REGEX,
            SHUTTER_VELOCITY_REGEX,
            SHUTTER_LIMITS_REGEX,
            AZIMUTH_MOVING_REGEX,
            AZIMUTH_POSITION_REGEX,
            ZERO_AZIMUTH_COUNTER_REGEX,
            MOVE_SHUTTER_REGEX,
            MOVE_AZIMUTH_REGEX,
            STOP_SHUTTER_REGEX,
            STOP_AZIMUTH_REGEX,
            HOME_AZIMUTH_REGEX,
        ])
        .unwrap();

        let regex = regex_set
            .patterns()
            .iter()
            .map(|pattern| Regex::new(pattern).unwrap())
            .collect();

        MotorCmdRegex { regex_set, regex }
    }

    fn get_match_index(&self, text: &str) -> Option<usize> {
        self.regex_set.matches(text).into_iter().next()
    }

    fn capture_steps(&self, match_index: usize, text: &str) -> Option<i64> {
        let capture = self.regex[match_index].captures(text)?;
        capture["steps"].parse().ok()
    }

    pub fn into_motor_cmd(&self, text: &str) -> MotorCmd {
        if let Some(match_index) = self.get_match_index(text) {
            match match_index {
                0 => MotorCmd::ShutterMoving,
                1 => MotorCmd::ShutterVelocity,
                2 => MotorCmd::ShutterLimits,
                3 => MotorCmd::AzimuthMoving,
                4 => MotorCmd::AzimuthPosition,
                5 => MotorCmd::ZeroAzimuthCounter,
                6 => match self.capture_steps(match_index, text) {
                    Some(steps) => MotorCmd::MoveShutter(steps),
                    None => MotorCmd::Unknown,
                },
                7 => match self.capture_steps(match_index, text) {
                    Some(steps) => MotorCmd::MoveAzimuth(steps),
                    None => MotorCmd::Unknown,
                },
                8 => MotorCmd::StopShutter,
                9 => MotorCmd::StopAzimuth,
                10 => MotorCmd::HomeAzimuth,
                _ => MotorCmd::Unknown,
            }
        } else {
            MotorCmd::Unknown
        }
    }
}

impl Default for MotorCmdRegex {
    fn default() -> MotorCmdRegex {
        MotorCmdRegex::new()
    }
}
