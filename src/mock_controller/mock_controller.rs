//! Mock motor controller.
//!
//! Simulates the azimuth and shutter stepper controllers behind a single
//! byte stream speaking the framed, checksummed wire protocol. The binary
//! serves it over TCP so the daemon can be exercised without hardware;
//! tests drive it over in-memory duplex streams.

use std::sync::{Arc, Mutex};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    task,
    time::{sleep, Duration},
};

use crate::{
    error::{DomeError, DomeResult},
    motor_cmd_regex::MotorCmdRegex,
    motor_command::{MotorCmd, SHUTTER_CLOSED_LIMIT_BIT, SHUTTER_OPEN_LIMIT_BIT},
    serial_link::checksum,
};

const FRAME_BYTE: u8 = 0x0A;
const ACK_BYTE: u8 = 0x06;
const NAK_BYTE: u8 = 0x15;
const REBOOT_BYTE: u8 = 0x03;

// How much the azimuth motor can move per cycle.
// 1 cycle is 50 milliseconds when served by run_mock_controller.
const AZIMUTH_STEPS_PER_CYCLE: i64 = 300;
// How much the shutter motor can move per cycle.
const SHUTTER_STEPS_PER_CYCLE: i64 = 200;
// Step count between the shutter limit switches.
const SHUTTER_TRAVEL: i64 = 20_000;
// Cycles a home seek takes before the switch asserts.
const HOMING_CYCLES: i64 = 3;

#[derive(Debug)]
pub struct MockMotors {
    azimuth_steps: i64,
    azimuth_target: i64,
    homing_cycles_left: i64,
    shutter_position: i64,
    shutter_remaining: i64,
}

impl MockMotors {
    pub fn new() -> MockMotors {
        MockMotors {
            azimuth_steps: 0,
            azimuth_target: 0,
            homing_cycles_left: 0,
            shutter_position: 0,
            shutter_remaining: 0,
        }
    }

    fn azimuth_moving(&self) -> bool {
        self.homing_cycles_left > 0 || self.azimuth_steps != self.azimuth_target
    }

    fn shutter_limits(&self) -> u32 {
        let mut limits = 0;
        if self.shutter_position <= 0 {
            limits |= 1 << SHUTTER_CLOSED_LIMIT_BIT;
        }
        if self.shutter_position >= SHUTTER_TRAVEL {
            limits |= 1 << SHUTTER_OPEN_LIMIT_BIT;
        }
        limits
    }

    fn shutter_velocity(&self) -> i64 {
        self.shutter_remaining.signum() * SHUTTER_STEPS_PER_CYCLE
    }

    /// Power-on reset: the step registers clear but the shutter stays where
    /// it physically is.
    pub fn reboot(&mut self) {
        self.azimuth_steps = 0;
        self.azimuth_target = 0;
        self.homing_cycles_left = 0;
        self.shutter_remaining = 0;
    }

    pub fn handle_command(&mut self, cmd: MotorCmd) -> Option<String> {
        match cmd {
            MotorCmd::ShutterMoving => {
                Some(if self.shutter_remaining != 0 { "1" } else { "0" }.to_string())
            }
            MotorCmd::ShutterVelocity => Some(self.shutter_velocity().to_string()),
            MotorCmd::ShutterLimits => Some(self.shutter_limits().to_string()),
            MotorCmd::AzimuthMoving => {
                Some(if self.azimuth_moving() { "1" } else { "0" }.to_string())
            }
            MotorCmd::AzimuthPosition => Some(self.azimuth_steps.to_string()),
            MotorCmd::ZeroAzimuthCounter => {
                self.azimuth_steps = 0;
                self.azimuth_target = 0;
                None
            }
            MotorCmd::MoveShutter(steps) => {
                self.shutter_remaining = steps;
                None
            }
            MotorCmd::MoveAzimuth(steps) => {
                self.azimuth_target = steps;
                None
            }
            MotorCmd::StopShutter => {
                self.shutter_remaining = 0;
                None
            }
            MotorCmd::StopAzimuth => {
                self.azimuth_target = self.azimuth_steps;
                None
            }
            MotorCmd::HomeAzimuth => {
                self.homing_cycles_left = HOMING_CYCLES;
                None
            }
            MotorCmd::Unknown => None,
        }
    }

    /// Advance the simulated motors by one cycle.
    pub fn tick(&mut self) {
        if self.homing_cycles_left > 0 {
            self.homing_cycles_left -= 1;
            if self.homing_cycles_left == 0 {
                // the seek stops on the switch wherever the register happens
                // to be; the host zeroes it afterwards
                self.azimuth_target = self.azimuth_steps;
            }
        } else if self.azimuth_steps != self.azimuth_target {
            let remaining = self.azimuth_target - self.azimuth_steps;
            let step = remaining.signum() * remaining.abs().min(AZIMUTH_STEPS_PER_CYCLE);
            self.azimuth_steps += step;
        }

        if self.shutter_remaining != 0 {
            let step = self.shutter_remaining.signum()
                * self.shutter_remaining.abs().min(SHUTTER_STEPS_PER_CYCLE);
            self.shutter_position += step;
            self.shutter_remaining -= step;

            if self.shutter_position <= 0 {
                self.shutter_position = 0;
                // closed limit switch stops the motor
                if step < 0 {
                    self.shutter_remaining = 0;
                }
            }
            if self.shutter_position >= SHUTTER_TRAVEL {
                self.shutter_position = SHUTTER_TRAVEL;
                if step > 0 {
                    self.shutter_remaining = 0;
                }
            }
        }
    }
}

impl Default for MockMotors {
    fn default() -> MockMotors {
        MockMotors::new()
    }
}

/// Serve the wire protocol on one stream until it closes.
pub async fn serve_stream<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    motors: Arc<Mutex<MockMotors>>,
) -> DomeResult<()> {
    let motor_cmd_regex = MotorCmdRegex::new();
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte).await {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(error) => return Err(DomeError::new(&error.to_string())),
        }

        match byte[0] {
            REBOOT_BYTE => {
                motors.lock().unwrap().reboot();
            }
            FRAME_BYTE => {
                let mut frame = Vec::new();
                loop {
                    match stream.read(&mut byte).await {
                        Ok(0) => return Ok(()),
                        Ok(_) => {}
                        Err(error) => return Err(DomeError::new(&error.to_string())),
                    }
                    if byte[0] == FRAME_BYTE {
                        break;
                    }
                    frame.push(byte[0]);
                }

                if frame.is_empty() {
                    continue;
                }

                let (payload, frame_checksum) = frame.split_at(frame.len() - 1);
                let cmd_text = String::from_utf8_lossy(payload).to_string();

                if frame_checksum[0] != checksum(payload) {
                    log::warn!("Bad checksum for command: {cmd_text}.");
                    stream.write_all(&[NAK_BYTE]).await?;
                    continue;
                }

                let motor_cmd = motor_cmd_regex.into_motor_cmd(&cmd_text);
                if matches!(motor_cmd, MotorCmd::Unknown) {
                    log::warn!("Unknown motor command: {cmd_text}.");
                    stream.write_all(&[NAK_BYTE]).await?;
                    continue;
                }

                let reply = motors.lock().unwrap().handle_command(motor_cmd);

                stream.write_all(&[ACK_BYTE]).await?;
                if let Some(value) = reply {
                    let mut line = value.into_bytes();
                    line.push(checksum(&line));
                    line.extend_from_slice(b"\r\n");
                    stream.write_all(&line).await?;
                }
                stream.flush().await?;
            }
            _ => {}
        }
    }
}

pub async fn run_mock_controller(port: u16) -> DomeResult<()> {
    let listener = TcpListener::bind(&format!("127.0.0.1:{port}")).await?;
    let motors = Arc::new(Mutex::new(MockMotors::new()));

    let simulated_motors = Arc::clone(&motors);
    task::spawn(async move {
        loop {
            simulated_motors.lock().unwrap().tick();
            sleep(Duration::from_millis(50)).await;
        }
    });

    log::info!("Mock motor controller listening on port {port}.");

    loop {
        let (socket, peer) = listener.accept().await?;
        log::info!("Accepted connection from {peer}.");
        let motors = Arc::clone(&motors);
        task::spawn(async move {
            if let Err(error) = serve_stream(socket, motors).await {
                log::warn!("Connection from {peer} ended: {error}.");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial_link::SerialLink;
    use tokio::io::duplex;

    #[test]
    fn test_mock_motors_initial_state() {
        let motors = MockMotors::new();

        assert!(!motors.azimuth_moving());
        assert_eq!(motors.shutter_limits(), 1 << SHUTTER_CLOSED_LIMIT_BIT);
        assert_eq!(motors.shutter_velocity(), 0);
    }

    #[test]
    fn test_mock_motors_azimuth_move() {
        let mut motors = MockMotors::new();

        motors.handle_command(MotorCmd::MoveAzimuth(500));
        assert!(motors.azimuth_moving());

        motors.tick();
        assert_eq!(motors.azimuth_steps, 300);
        motors.tick();
        assert_eq!(motors.azimuth_steps, 500);
        assert!(!motors.azimuth_moving());
    }

    #[test]
    fn test_mock_motors_azimuth_stop() {
        let mut motors = MockMotors::new();

        motors.handle_command(MotorCmd::MoveAzimuth(5000));
        motors.tick();
        motors.handle_command(MotorCmd::StopAzimuth);

        assert!(!motors.azimuth_moving());
        assert_eq!(motors.azimuth_steps, 300);
    }

    #[test]
    fn test_mock_motors_shutter_hits_open_limit() {
        let mut motors = MockMotors::new();

        motors.handle_command(MotorCmd::MoveShutter(100_000_000));
        assert_eq!(
            motors.handle_command(MotorCmd::ShutterMoving),
            Some("1".to_string())
        );
        assert!(motors.shutter_velocity() > 0);

        for _ in 0..(SHUTTER_TRAVEL / SHUTTER_STEPS_PER_CYCLE + 1) {
            motors.tick();
        }

        assert_eq!(motors.shutter_position, SHUTTER_TRAVEL);
        assert_eq!(motors.shutter_remaining, 0);
        assert_eq!(motors.shutter_limits(), 1 << SHUTTER_OPEN_LIMIT_BIT);
    }

    #[test]
    fn test_mock_motors_shutter_close_from_partial() {
        let mut motors = MockMotors::new();

        motors.handle_command(MotorCmd::MoveShutter(100_000_000));
        motors.tick();
        motors.handle_command(MotorCmd::StopShutter);
        assert_eq!(motors.shutter_limits(), 0);

        motors.handle_command(MotorCmd::MoveShutter(-100_000_000));
        assert!(motors.shutter_velocity() < 0);
        motors.tick();
        motors.tick();

        assert_eq!(motors.shutter_position, 0);
        assert_eq!(motors.shutter_limits(), 1 << SHUTTER_CLOSED_LIMIT_BIT);
    }

    #[test]
    fn test_mock_motors_home_and_zero() {
        let mut motors = MockMotors::new();
        motors.azimuth_steps = 700;
        motors.azimuth_target = 700;

        motors.handle_command(MotorCmd::HomeAzimuth);
        assert!(motors.azimuth_moving());
        for _ in 0..HOMING_CYCLES {
            motors.tick();
        }
        assert!(!motors.azimuth_moving());

        motors.handle_command(MotorCmd::ZeroAzimuthCounter);
        assert_eq!(
            motors.handle_command(MotorCmd::AzimuthPosition),
            Some("0".to_string())
        );
    }

    #[test]
    fn test_mock_motors_reboot_keeps_shutter_position() {
        let mut motors = MockMotors::new();
        motors.handle_command(MotorCmd::MoveShutter(100_000_000));
        motors.tick();
        motors.handle_command(MotorCmd::MoveAzimuth(500));
        motors.tick();

        motors.reboot();

        assert_eq!(motors.azimuth_steps, 0);
        assert!(!motors.azimuth_moving());
        assert_eq!(motors.shutter_position, SHUTTER_STEPS_PER_CYCLE);
        assert_eq!(motors.shutter_remaining, 0);
    }

    #[tokio::test]
    async fn test_serve_stream_round_trip() {
        let (local, remote) = duplex(1024);
        let motors = Arc::new(Mutex::new(MockMotors::new()));
        let served = Arc::clone(&motors);
        task::spawn(async move {
            let _ = serve_stream(remote, served).await;
        });

        let mut link =
            SerialLink::from_stream(Box::new(local), Duration::from_millis(250), 1);

        let position = link.send_command("APR P", true).await.unwrap();
        assert_eq!(position, Some("0".to_string()));

        link.send_command("AMA 500", false).await.unwrap();
        motors.lock().unwrap().tick();
        motors.lock().unwrap().tick();

        let position = link.send_command("APR P", true).await.unwrap();
        assert_eq!(position, Some("500".to_string()));

        let moving = link.send_command("APR MV", true).await.unwrap();
        assert_eq!(moving, Some("0".to_string()));
    }

    #[tokio::test]
    async fn test_serve_stream_rejects_unknown_command() {
        let (local, remote) = duplex(1024);
        let motors = Arc::new(Mutex::new(MockMotors::new()));
        task::spawn(async move {
            let _ = serve_stream(remote, motors).await;
        });

        let mut link =
            SerialLink::from_stream(Box::new(local), Duration::from_millis(250), 1);

        let reply = link.send_command("QQQ 1", false).await;

        assert!(reply.is_err());
    }
}
