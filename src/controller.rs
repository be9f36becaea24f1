//! Dome controller: a single worker task that owns the serial link and the
//! dome state, consuming one request per iteration.
//!
//! Everything that touches the motors happens here. The remote surface only
//! submits requests over a channel and reads the state snapshots published
//! through a watch channel after every iteration.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::timeout,
};

use crate::{
    config::Config,
    error::{DomeError, DomeResult},
    geometry,
    motor_command::{
        MotorCmd, SHUTTER_CLOSED_LIMIT_BIT, SHUTTER_OPEN_LIMIT_BIT, SHUTTER_TRAVEL_STEPS,
    },
    serial_link::SerialLink,
    status::{AzimuthStatus, CommandStatus, DomeState, HeartbeatStatus, ShutterStatus},
};

/// Heartbeat timeouts must be strictly below this many seconds.
pub const HEARTBEAT_MAX_TIMEOUT: i64 = 180;

/// Horizon for estimating the direction of sky motion when issuing a
/// leading tracking slew.
const TRACKING_LOOKAHEAD_SECONDS: i64 = 60;

#[derive(Debug)]
pub enum Request {
    Connect,
    Disconnect,
    OpenShutter { override_move: bool },
    CloseShutter { override_move: bool },
    StopShutter,
    StopAzimuth,
    HomeAzimuth,
    SlewAzimuth(f64),
    TrackRadec { ra: f64, dec: f64 },
    SlewRadec { ra: f64, dec: f64 },
    SlewAltAz { alt: f64, az: f64 },
    Heartbeat(i64),
    EngineeringMode(bool),
    FollowMode(bool),
    HeartbeatExpired,
}

pub type RequestPayload = (Request, Option<oneshot::Sender<CommandStatus>>);

/// Produce serial links on demand. Swapped out in tests so the controller
/// talks to the mock motors over an in-memory stream.
#[async_trait]
pub trait LinkConnector: Send + 'static {
    async fn connect(&mut self) -> DomeResult<SerialLink>;
}

pub struct SerialPortConnector {
    config: Config,
}

impl SerialPortConnector {
    pub fn new(config: &Config) -> SerialPortConnector {
        SerialPortConnector {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl LinkConnector for SerialPortConnector {
    async fn connect(&mut self) -> DomeResult<SerialLink> {
        SerialLink::open_port(&self.config).await
    }
}

pub struct DomeController {
    config: Config,
    connector: Box<dyn LinkConnector>,
    request_receiver: mpsc::Receiver<RequestPayload>,
    state_sender: watch::Sender<DomeState>,
    link: Option<SerialLink>,
    state: DomeState,
}

impl DomeController {
    pub fn new(
        config: Config,
        connector: Box<dyn LinkConnector>,
        request_receiver: mpsc::Receiver<RequestPayload>,
        state_sender: watch::Sender<DomeState>,
    ) -> DomeController {
        DomeController {
            config,
            connector,
            request_receiver,
            state_sender,
            link: None,
            state: DomeState::default(),
        }
    }

    /// Run the control loop until every request sender is dropped.
    pub async fn run(mut self) {
        loop {
            let poll_delay = self.poll_delay();
            match timeout(poll_delay, self.request_receiver.recv()).await {
                Ok(Some((request, reply))) => match request {
                    Request::Connect => {
                        let result = self.do_connect().await;
                        self.publish_state();
                        Self::send_reply(reply, result);
                    }
                    Request::Disconnect => {
                        let result = self.do_disconnect();
                        self.publish_state();
                        Self::send_reply(reply, result);
                    }
                    request => self.iterate(Some((request, reply))).await,
                },
                Ok(None) => break,
                Err(_) => self.iterate(None).await,
            }
        }
    }

    /// One pass of the control loop: refresh status, fire internal
    /// transitions, then dispatch the dequeued request if there is one.
    async fn iterate(&mut self, request: Option<RequestPayload>) {
        if self.link.is_some() {
            if let Err(error) = self.refresh_status().await {
                log::error!("Lost connection to the motor controllers: {error}.");
                self.drop_link();
            }
        }

        // the heartbeat is checked on every tick, external request or not
        let mut internal_dispatched = false;
        if self.link.is_some() && self.heartbeat_expired() {
            log::warn!("Heartbeat expired; closing the shutter.");
            let result = self.dispatch(Request::HeartbeatExpired).await;
            if result != CommandStatus::Succeeded {
                log::error!("Heartbeat close failed: {}.", result.message());
            }
            internal_dispatched = true;
        }

        if !internal_dispatched && request.is_none() && self.link.is_some() {
            if self.state.park_pending && self.state.azimuth_status == AzimuthStatus::Idle {
                self.state.park_pending = false;
                self.state.tracking_coord = None;
                self.state.tracking_azimuth = None;
                log::info!(
                    "Homing complete; slewing to park azimuth {}.",
                    self.config.park_azimuth
                );
                if let Err(error) = self.slew_to_azimuth(self.config.park_azimuth).await {
                    log::error!("Lost connection to the motor controllers: {error}.");
                    self.drop_link();
                }
            } else if self.state.tracking_coord.is_some()
                && self.state.azimuth_status == AzimuthStatus::Idle
            {
                self.run_tracking_correction().await;
            }
        }

        if let Some((request, reply)) = request {
            let result = match self.reject(&request) {
                Some(status) => status,
                None => {
                    let result = self.dispatch(request).await;
                    if self.link.is_some() {
                        if let Err(error) = self.refresh_status().await {
                            log::error!("Lost connection to the motor controllers: {error}.");
                            self.drop_link();
                        }
                    }
                    result
                }
            };
            self.publish_state();
            Self::send_reply(reply, result);
        } else {
            self.publish_state();
        }
    }

    fn send_reply(reply: Option<oneshot::Sender<CommandStatus>>, result: CommandStatus) {
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn publish_state(&self) {
        self.state_sender.send_replace(self.state.clone());
    }

    fn heartbeat_expired(&self) -> bool {
        self.state.heartbeat_status == HeartbeatStatus::Active
            && self
                .state
                .heartbeat_expires_at
                .map(|expires_at| Utc::now() > expires_at)
                .unwrap_or(false)
    }

    /// Queue-wait period for the next iteration: the moving delay while any
    /// axis is in motion, clipped to a second when the heartbeat would
    /// otherwise expire unnoticed.
    fn poll_delay(&self) -> Duration {
        let moving = matches!(
            self.state.azimuth_status,
            AzimuthStatus::Moving | AzimuthStatus::Homing
        ) || matches!(
            self.state.shutter_status,
            ShutterStatus::Opening | ShutterStatus::Closing
        );

        let mut delay = if moving {
            self.config.moving_loop_delay
        } else {
            self.config.idle_loop_delay
        };

        if self.state.heartbeat_status == HeartbeatStatus::Active {
            if let Some(expires_at) = self.state.heartbeat_expires_at {
                let remaining =
                    (expires_at - Utc::now()).num_milliseconds() as f64 / 1000.0;
                if remaining < delay {
                    delay = delay.min(1.0);
                }
            }
        }

        Duration::from_secs_f64(delay)
    }

    async fn do_connect(&mut self) -> CommandStatus {
        if self.link.is_some() {
            return CommandStatus::NotDisconnected;
        }

        match self.connector.connect().await {
            Ok(link) => {
                self.link = Some(link);
                self.state.connected = true;
                self.state.azimuth_status = AzimuthStatus::NotHomed;
                self.state.heartbeat_status = HeartbeatStatus::Disabled;
                self.state.heartbeat_expires_at = None;
                self.state.follow_telescope = true;
                self.state.tracking_coord = None;
                self.state.tracking_azimuth = None;
                self.state.park_pending = false;

                if let Err(error) = self.refresh_status().await {
                    log::error!("Failed to read the initial dome status: {error}.");
                    self.drop_link();
                    return CommandStatus::Failed;
                }

                log::info!("Connected to the dome motor controllers.");
                CommandStatus::Succeeded
            }
            Err(error) => {
                log::error!("Failed to connect to the motor controllers: {error}.");
                CommandStatus::Failed
            }
        }
    }

    fn do_disconnect(&mut self) -> CommandStatus {
        if self.link.is_none() {
            return CommandStatus::NotConnected;
        }
        self.drop_link();
        log::info!("Disconnected from the dome motor controllers.");
        CommandStatus::Succeeded
    }

    fn drop_link(&mut self) {
        self.link = None;
        self.state.connected = false;
        self.state.azimuth_status = AzimuthStatus::Disconnected;
        self.state.shutter_status = ShutterStatus::Disconnected;
        self.state.heartbeat_status = HeartbeatStatus::Disabled;
        self.state.heartbeat_expires_at = None;
        self.state.tracking_coord = None;
        self.state.tracking_azimuth = None;
        self.state.park_pending = false;
    }

    /// Read the shutter and azimuth motors and fold the results into the
    /// dome state.
    async fn refresh_status(&mut self) -> DomeResult<()> {
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };

        let shutter_moving = Self::read_value::<i64>(link, MotorCmd::ShutterMoving).await? != 0;
        let shutter_velocity = Self::read_value::<i64>(link, MotorCmd::ShutterVelocity).await?;
        let shutter_limits = Self::read_value::<u32>(link, MotorCmd::ShutterLimits).await?;
        let azimuth_steps = Self::read_value::<i64>(link, MotorCmd::AzimuthPosition).await?;
        let azimuth_moving = Self::read_value::<i64>(link, MotorCmd::AzimuthMoving).await? != 0;

        self.state.shutter_status = if shutter_moving {
            if shutter_velocity >= 0 {
                ShutterStatus::Opening
            } else {
                ShutterStatus::Closing
            }
        } else if shutter_limits & (1 << SHUTTER_CLOSED_LIMIT_BIT) != 0 {
            ShutterStatus::Closed
        } else if shutter_limits & (1 << SHUTTER_OPEN_LIMIT_BIT) != 0 {
            ShutterStatus::Open
        } else {
            ShutterStatus::PartiallyOpen
        };

        match self.state.azimuth_status {
            AzimuthStatus::Homing => {
                if !azimuth_moving {
                    // the home switch defines the origin of the step register
                    link.send_command(&MotorCmd::ZeroAzimuthCounter.command(), false)
                        .await?;
                    self.state.azimuth_degrees = self.config.home_azimuth;
                    self.state.azimuth_status = AzimuthStatus::Idle;
                    self.state.park_pending = true;
                    log::info!("Azimuth homed at {} degrees.", self.config.home_azimuth);
                }
            }
            AzimuthStatus::Disconnected | AzimuthStatus::NotHomed => {}
            AzimuthStatus::Idle | AzimuthStatus::Moving => {
                self.state.azimuth_degrees = geometry::steps_to_azimuth(
                    azimuth_steps,
                    self.config.home_azimuth,
                    self.config.steps_per_rotation,
                );
                self.state.azimuth_status = if azimuth_moving {
                    AzimuthStatus::Moving
                } else {
                    AzimuthStatus::Idle
                };
            }
        }

        if self.state.heartbeat_status == HeartbeatStatus::TrippedClosing
            && self.state.shutter_status == ShutterStatus::Closed
        {
            self.state.heartbeat_status = HeartbeatStatus::TrippedIdle;
            log::info!("Heartbeat close complete; the shutter is closed.");
        }

        self.state.state_timestamp = Utc::now();
        Ok(())
    }

    async fn read_value<T: std::str::FromStr>(
        link: &mut SerialLink,
        cmd: MotorCmd,
    ) -> DomeResult<T> {
        let command = cmd.command();
        let reply = link
            .send_command(&command, true)
            .await?
            .ok_or_else(|| DomeError::new(&format!("missing reply to command {command}")))?;
        reply
            .trim()
            .parse()
            .map_err(|_| DomeError::new(&format!("unexpected reply to command {command}: {reply}")))
    }

    /// Interlocks, evaluated in order, for an externally submitted request.
    fn reject(&self, request: &Request) -> Option<CommandStatus> {
        // internal transitions bypass the interlocks
        if matches!(request, Request::HeartbeatExpired) {
            return None;
        }

        if self.link.is_none() {
            return Some(CommandStatus::NotConnected);
        }

        if self.state.engineering_mode && !matches!(request, Request::EngineeringMode(_)) {
            return Some(CommandStatus::EngineeringModeActive);
        }

        let shutter_move = matches!(
            request,
            Request::OpenShutter { .. } | Request::CloseShutter { .. }
        );

        match self.state.heartbeat_status {
            HeartbeatStatus::TrippedClosing => {
                if shutter_move
                    || matches!(
                        request,
                        Request::EngineeringMode(_) | Request::StopShutter | Request::Heartbeat(_)
                    )
                {
                    return Some(CommandStatus::HeartbeatCloseInProgress);
                }
            }
            HeartbeatStatus::TrippedIdle => {
                if shutter_move || matches!(request, Request::EngineeringMode(_)) {
                    return Some(CommandStatus::HeartbeatTimedOut);
                }
                if let Request::Heartbeat(timeout) = request {
                    if *timeout != 0 {
                        return Some(CommandStatus::HeartbeatTimedOut);
                    }
                }
            }
            _ => {}
        }

        if let Request::OpenShutter { override_move } | Request::CloseShutter { override_move } =
            request
        {
            if !override_move
                && matches!(
                    self.state.shutter_status,
                    ShutterStatus::Opening | ShutterStatus::Closing
                )
            {
                return Some(CommandStatus::Blocked);
            }
        }

        let slew = matches!(
            request,
            Request::SlewAzimuth(_)
                | Request::TrackRadec { .. }
                | Request::SlewRadec { .. }
                | Request::SlewAltAz { .. }
        );

        if (slew || matches!(request, Request::HomeAzimuth | Request::EngineeringMode(_)))
            && matches!(
                self.state.azimuth_status,
                AzimuthStatus::Moving | AzimuthStatus::Homing
            )
        {
            return Some(CommandStatus::Blocked);
        }

        if slew && self.state.azimuth_status == AzimuthStatus::NotHomed {
            return Some(CommandStatus::NotHomed);
        }

        if let Request::Heartbeat(timeout) = request {
            if *timeout < 0 || *timeout >= HEARTBEAT_MAX_TIMEOUT {
                return Some(CommandStatus::HeartbeatInvalidTimeout);
            }
        }

        if let Request::EngineeringMode(true) = request {
            if self.state.heartbeat_status != HeartbeatStatus::Disabled {
                return Some(CommandStatus::EngineeringModeRequiresHeartbeatDisabled);
            }
        }

        None
    }

    async fn dispatch(&mut self, request: Request) -> CommandStatus {
        match self.execute(request).await {
            Ok(status) => status,
            Err(error) => {
                log::error!("Lost connection to the motor controllers: {error}.");
                self.drop_link();
                CommandStatus::Failed
            }
        }
    }

    async fn execute(&mut self, request: Request) -> DomeResult<CommandStatus> {
        match request {
            Request::Connect | Request::Disconnect => {
                // handled before the iteration ever starts
                Ok(CommandStatus::Failed)
            }
            Request::OpenShutter { .. } => {
                self.send(MotorCmd::MoveShutter(SHUTTER_TRAVEL_STEPS)).await?;
                self.state.shutter_status = ShutterStatus::Opening;
                Ok(CommandStatus::Succeeded)
            }
            Request::CloseShutter { .. } => {
                self.send(MotorCmd::MoveShutter(-SHUTTER_TRAVEL_STEPS)).await?;
                self.state.shutter_status = ShutterStatus::Closing;
                Ok(CommandStatus::Succeeded)
            }
            Request::HeartbeatExpired => {
                self.send(MotorCmd::MoveShutter(-SHUTTER_TRAVEL_STEPS)).await?;
                self.state.shutter_status = ShutterStatus::Closing;
                self.state.heartbeat_status = HeartbeatStatus::TrippedClosing;
                self.state.heartbeat_expires_at = None;
                Ok(CommandStatus::Succeeded)
            }
            Request::StopShutter => {
                self.send(MotorCmd::StopShutter).await?;
                Ok(CommandStatus::Succeeded)
            }
            Request::StopAzimuth => {
                self.send(MotorCmd::StopAzimuth).await?;
                self.state.tracking_coord = None;
                self.state.tracking_azimuth = None;
                self.state.park_pending = false;
                Ok(CommandStatus::Succeeded)
            }
            Request::HomeAzimuth => {
                self.send(MotorCmd::HomeAzimuth).await?;
                self.state.azimuth_status = AzimuthStatus::Homing;
                self.state.tracking_coord = None;
                self.state.tracking_azimuth = None;
                self.state.park_pending = false;
                Ok(CommandStatus::Succeeded)
            }
            Request::SlewAzimuth(azimuth) => {
                self.state.tracking_coord = None;
                self.state.tracking_azimuth = None;
                self.state.park_pending = false;
                self.slew_to_azimuth(azimuth).await?;
                Ok(CommandStatus::Succeeded)
            }
            Request::SlewAltAz { alt, az } => {
                let dome_az = geometry::dome_azimuth(
                    alt,
                    az,
                    self.config.dome_radius_cm,
                    self.config.telescope_offset_x_cm,
                );
                self.state.tracking_coord = None;
                self.state.tracking_azimuth = None;
                self.state.park_pending = false;
                self.slew_to_azimuth(dome_az).await?;
                Ok(CommandStatus::Succeeded)
            }
            Request::SlewRadec { ra, dec } => {
                let dome_az = self.dome_azimuth_for_radec(ra, dec, 0);
                self.state.tracking_coord = None;
                self.state.tracking_azimuth = None;
                self.state.park_pending = false;
                self.slew_to_azimuth(dome_az).await?;
                Ok(CommandStatus::Succeeded)
            }
            Request::TrackRadec { ra, dec } => {
                let dome_az = self.dome_azimuth_for_radec(ra, dec, 0);
                self.state.tracking_coord = Some((ra, dec));
                self.state.tracking_azimuth = Some(dome_az);
                self.state.park_pending = false;
                self.slew_to_azimuth(dome_az).await?;
                Ok(CommandStatus::Succeeded)
            }
            Request::Heartbeat(heartbeat_timeout) => {
                if heartbeat_timeout == 0 {
                    self.state.heartbeat_status = HeartbeatStatus::Disabled;
                    self.state.heartbeat_expires_at = None;
                } else {
                    self.state.heartbeat_status = HeartbeatStatus::Active;
                    self.state.heartbeat_expires_at =
                        Some(Utc::now() + ChronoDuration::seconds(heartbeat_timeout));
                }
                Ok(CommandStatus::Succeeded)
            }
            Request::EngineeringMode(enabled) => {
                self.state.engineering_mode = enabled;
                if enabled {
                    self.state.tracking_coord = None;
                    self.state.tracking_azimuth = None;
                    self.state.park_pending = false;
                }
                Ok(CommandStatus::Succeeded)
            }
            Request::FollowMode(enabled) => {
                self.state.follow_telescope = enabled;
                Ok(CommandStatus::Succeeded)
            }
        }
    }

    async fn send(&mut self, cmd: MotorCmd) -> DomeResult<()> {
        let Some(link) = self.link.as_mut() else {
            return Err(DomeError::new("dome is not connected"));
        };
        link.send_command(&cmd.command(), false).await?;
        Ok(())
    }

    /// Slew to the requested wrapped azimuth, resolving the nearest
    /// unwrapped representative so the dome never takes the long way around.
    async fn slew_to_azimuth(&mut self, azimuth: f64) -> DomeResult<()> {
        let target = geometry::unwrap_azimuth(
            self.state.azimuth_degrees,
            geometry::wrap_degrees(azimuth),
        );
        let steps = geometry::azimuth_to_steps(
            target,
            self.config.home_azimuth,
            self.config.steps_per_rotation,
        );
        self.send(MotorCmd::MoveAzimuth(steps)).await?;
        self.state.azimuth_status = AzimuthStatus::Moving;
        log::debug!("Slewing the dome to {target} degrees ({steps} steps).");
        Ok(())
    }

    fn dome_azimuth_for_radec(&self, ra: f64, dec: f64, offset_seconds: i64) -> f64 {
        let time = Utc::now() + ChronoDuration::seconds(offset_seconds);
        geometry::dome_azimuth_for_radec(
            ra,
            dec,
            &time,
            self.config.latitude,
            self.config.longitude,
            self.config.dome_radius_cm,
            self.config.telescope_offset_x_cm,
        )
    }

    /// Re-centre the slit on the tracked target when the separation grows
    /// beyond the configured limit, leading the sky in its direction of
    /// motion so the dome catches it rather than lags it.
    async fn run_tracking_correction(&mut self) {
        let Some((ra, dec)) = self.state.tracking_coord else {
            return;
        };

        let target = self.dome_azimuth_for_radec(ra, dec, 0);
        self.state.tracking_azimuth = Some(target);

        let delta = geometry::signed_separation(
            target,
            geometry::wrap_degrees(self.state.azimuth_degrees),
        );
        if delta.abs() <= self.config.tracking_max_separation {
            return;
        }

        let future = self.dome_azimuth_for_radec(ra, dec, TRACKING_LOOKAHEAD_SECONDS);
        let direction = geometry::signed_separation(future, target).signum();
        let lead_target = target + direction * self.config.tracking_max_separation;

        log::debug!(
            "Tracking separation {delta:.2} degrees exceeds limit; slewing to {lead_target:.2}."
        );
        if let Err(error) = self.slew_to_azimuth(lead_target).await {
            log::error!("Lost connection to the motor controllers: {error}.");
            self.drop_link();
        }
    }
}
