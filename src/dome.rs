//! Remote command surface for the dome daemon.
//!
//! Operations are gated by the caller's network identity and translated
//! into requests for the controller task. Blocking variants subscribe to
//! the published state and wait for the movement they started to finish.

use std::{net::IpAddr, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task,
    time::{timeout, Instant},
};

use crate::{
    config::Config,
    controller::{DomeController, LinkConnector, Request, RequestPayload, SerialPortConnector},
    status::{AzimuthStatus, CommandStatus, DomeState, ShutterStatus, StatusSnapshot},
};

const REQUEST_CHANNEL_SIZE: usize = 32;

/// Client-facing handle to a running dome controller.
#[derive(Clone)]
pub struct Dome {
    config: Arc<Config>,
    request_sender: mpsc::Sender<RequestPayload>,
    state_receiver: watch::Receiver<DomeState>,
}

impl Dome {
    /// Start the controller against the configured serial port.
    pub fn start(config: Config) -> Dome {
        let connector = Box::new(SerialPortConnector::new(&config));
        Dome::start_with_connector(config, connector)
    }

    /// Start the controller with a custom link connector.
    pub fn start_with_connector(config: Config, connector: Box<dyn LinkConnector>) -> Dome {
        let (request_sender, request_receiver) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let (state_sender, state_receiver) = watch::channel(DomeState::default());

        let controller =
            DomeController::new(config.clone(), connector, request_receiver, state_sender);
        task::spawn(controller.run());

        Dome {
            config: Arc::new(config),
            request_sender,
            state_receiver,
        }
    }

    fn verify_control(&self, caller: IpAddr) -> Option<CommandStatus> {
        if self.config.control_ips.contains(&caller) {
            None
        } else {
            Some(CommandStatus::InvalidControlIP)
        }
    }

    fn verify_telescope(&self, caller: IpAddr) -> Option<CommandStatus> {
        if self.config.telescope_ips.contains(&caller) {
            None
        } else {
            Some(CommandStatus::InvalidControlIP)
        }
    }

    fn follow_mode_engaged(&self) -> bool {
        let state = self.state_receiver.borrow();
        state.connected && state.follow_telescope
    }

    async fn submit(&self, request: Request) -> CommandStatus {
        let (reply_sender, reply_receiver) = oneshot::channel();
        if self
            .request_sender
            .send((request, Some(reply_sender)))
            .await
            .is_err()
        {
            return CommandStatus::Failed;
        }
        reply_receiver.await.unwrap_or(CommandStatus::Failed)
    }

    /// Wait until `complete` holds for a published state, rechecking each
    /// second or on notification. Returns the state that satisfied the
    /// predicate, or None on timeout or disconnection.
    async fn wait_for_movement<F>(&self, timeout_seconds: f64, complete: F) -> Option<DomeState>
    where
        F: Fn(&DomeState) -> bool,
    {
        let mut state_receiver = self.state_receiver.clone();
        let deadline = Instant::now() + Duration::from_secs_f64(timeout_seconds);

        loop {
            {
                let state = state_receiver.borrow_and_update().clone();
                if !state.connected {
                    return None;
                }
                if complete(&state) {
                    return Some(state);
                }
            }

            if Instant::now() >= deadline {
                return None;
            }

            match timeout(Duration::from_secs(1), state_receiver.changed()).await {
                Ok(Err(_)) => return None,
                Ok(Ok(())) | Err(_) => {}
            }
        }
    }

    async fn wait_for_azimuth_idle(&self) -> CommandStatus {
        let final_state = self
            .wait_for_movement(self.config.azimuth_move_timeout, |state| {
                !matches!(
                    state.azimuth_status,
                    AzimuthStatus::Moving | AzimuthStatus::Homing
                ) && !state.park_pending
            })
            .await;

        match final_state {
            Some(state) if state.azimuth_status == AzimuthStatus::Idle => CommandStatus::Succeeded,
            _ => CommandStatus::Failed,
        }
    }

    async fn wait_for_shutter(
        &self,
        transit: ShutterStatus,
        settled: ShutterStatus,
    ) -> CommandStatus {
        let final_state = self
            .wait_for_movement(self.config.shutter_move_timeout, |state| {
                state.shutter_status != transit
            })
            .await;

        match final_state {
            Some(state) if state.shutter_status == settled => CommandStatus::Succeeded,
            _ => CommandStatus::Failed,
        }
    }

    /// Connect to the dome controllers.
    pub async fn initialize(&self, caller: IpAddr) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        self.submit(Request::Connect).await
    }

    /// Disconnect from the dome controllers.
    pub async fn shutdown(&self, caller: IpAddr) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        self.submit(Request::Disconnect).await
    }

    pub async fn open_shutter(
        &self,
        caller: IpAddr,
        blocking: bool,
        override_move: bool,
    ) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        let result = self.submit(Request::OpenShutter { override_move }).await;
        if result != CommandStatus::Succeeded || !blocking {
            return result;
        }
        self.wait_for_shutter(ShutterStatus::Opening, ShutterStatus::Open)
            .await
    }

    pub async fn close_shutter(
        &self,
        caller: IpAddr,
        blocking: bool,
        override_move: bool,
    ) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        let result = self.submit(Request::CloseShutter { override_move }).await;
        if result != CommandStatus::Succeeded || !blocking {
            return result;
        }
        self.wait_for_shutter(ShutterStatus::Closing, ShutterStatus::Closed)
            .await
    }

    pub async fn stop_shutter(&self, caller: IpAddr) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        self.submit(Request::StopShutter).await
    }

    pub async fn stop_azimuth(&self, caller: IpAddr) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        if self.follow_mode_engaged() {
            return CommandStatus::FollowModeActive;
        }
        self.submit(Request::StopAzimuth).await
    }

    pub async fn home_azimuth(&self, caller: IpAddr, blocking: bool) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        let result = self.submit(Request::HomeAzimuth).await;
        if result != CommandStatus::Succeeded || !blocking {
            return result;
        }
        // the controller chains a park slew after the home; wait that out too
        self.wait_for_azimuth_idle().await
    }

    /// Slew to the configured park azimuth.
    pub async fn park(&self, caller: IpAddr, blocking: bool) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        if self.follow_mode_engaged() {
            return CommandStatus::FollowModeActive;
        }
        self.slew_to(Request::SlewAzimuth(self.config.park_azimuth), blocking)
            .await
    }

    pub async fn slew_azimuth(&self, caller: IpAddr, azimuth: f64, blocking: bool) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        if self.follow_mode_engaged() {
            return CommandStatus::FollowModeActive;
        }
        self.slew_to(Request::SlewAzimuth(azimuth), blocking).await
    }

    pub async fn track_radec(
        &self,
        caller: IpAddr,
        ra: f64,
        dec: f64,
        blocking: bool,
    ) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        if self.follow_mode_engaged() {
            return CommandStatus::FollowModeActive;
        }
        self.slew_to(Request::TrackRadec { ra, dec }, blocking).await
    }

    async fn slew_to(&self, request: Request, blocking: bool) -> CommandStatus {
        let result = self.submit(request).await;
        if result != CommandStatus::Succeeded || !blocking {
            return result;
        }
        self.wait_for_azimuth_idle().await
    }

    pub async fn set_follow_mode(&self, caller: IpAddr, enabled: bool) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        self.submit(Request::FollowMode(enabled)).await
    }

    pub async fn set_engineering_mode(&self, caller: IpAddr, enabled: bool) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        self.submit(Request::EngineeringMode(enabled)).await
    }

    /// Arm the watchdog for `timeout_seconds`; zero disarms it.
    pub async fn set_heartbeat_timer(&self, caller: IpAddr, timeout_seconds: i64) -> CommandStatus {
        if let Some(status) = self.verify_control(caller) {
            return status;
        }
        self.submit(Request::Heartbeat(timeout_seconds)).await
    }

    /// Snapshot of the dome state; allowed from any caller.
    pub fn status(&self) -> StatusSnapshot {
        self.state_receiver.borrow().snapshot()
    }

    /// Unconditional liveness check; allowed from any caller.
    pub fn ping(&self) -> CommandStatus {
        CommandStatus::Succeeded
    }

    pub async fn notify_telescope_radec(
        &self,
        caller: IpAddr,
        ra: f64,
        dec: f64,
        tracking: bool,
    ) -> CommandStatus {
        if let Some(status) = self.verify_telescope(caller) {
            return status;
        }
        if !self.follow_mode_engaged() {
            return CommandStatus::Succeeded;
        }
        if tracking {
            self.submit(Request::TrackRadec { ra, dec }).await
        } else {
            self.submit(Request::SlewRadec { ra, dec }).await
        }
    }

    pub async fn notify_telescope_altaz(&self, caller: IpAddr, alt: f64, az: f64) -> CommandStatus {
        if let Some(status) = self.verify_telescope(caller) {
            return status;
        }
        if !self.follow_mode_engaged() {
            return CommandStatus::Succeeded;
        }
        self.submit(Request::SlewAltAz { alt, az }).await
    }

    pub async fn notify_telescope_stopped(&self, caller: IpAddr) -> CommandStatus {
        if let Some(status) = self.verify_telescope(caller) {
            return status;
        }
        if !self.follow_mode_engaged() {
            return CommandStatus::Succeeded;
        }
        self.submit(Request::StopAzimuth).await
    }

    pub async fn notify_telescope_parked(&self, caller: IpAddr) -> CommandStatus {
        if let Some(status) = self.verify_telescope(caller) {
            return status;
        }
        if !self.follow_mode_engaged() {
            return CommandStatus::Succeeded;
        }
        self.submit(Request::SlewAzimuth(self.config.park_azimuth))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::DomeResult,
        geometry,
        mock_controller::mock_controller::{serve_stream, MockMotors},
        serial_link::SerialLink,
    };
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::{io::duplex, time::sleep};

    const CONTROL: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1));
    const TELESCOPE: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 2));
    const STRANGER: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 99));

    fn test_config() -> Config {
        Config::from_json(
            r#"{
                "latitude": 28.7603135,
                "longitude": -17.8796168,
                "altitude": 2387.0,
                "serial_port": "/dev/dome",
                "serial_baud": 9600,
                "serial_timeout": 0.25,
                "serial_retries": 2,
                "steps_per_rotation": 3600.0,
                "home_azimuth": 110.0,
                "park_azimuth": 200.0,
                "tracking_max_separation": 5.0,
                "idle_loop_delay": 0.05,
                "moving_loop_delay": 0.05,
                "azimuth_move_timeout": 20.0,
                "shutter_move_timeout": 20.0,
                "dome_radius_cm": 200.0,
                "telescope_offset_x_cm": 40.0,
                "control_ips": ["10.0.0.1"],
                "telescope_ips": ["10.0.0.2"]
            }"#,
        )
        .unwrap()
    }

    struct MockConnector {
        motors: Arc<Mutex<MockMotors>>,
    }

    impl MockConnector {
        fn new() -> MockConnector {
            let motors = Arc::new(Mutex::new(MockMotors::new()));

            let simulated_motors = Arc::clone(&motors);
            task::spawn(async move {
                loop {
                    simulated_motors.lock().unwrap().tick();
                    sleep(Duration::from_millis(20)).await;
                }
            });

            MockConnector { motors }
        }
    }

    #[async_trait]
    impl LinkConnector for MockConnector {
        async fn connect(&mut self) -> DomeResult<SerialLink> {
            let (local, remote) = duplex(1024);
            let motors = Arc::clone(&self.motors);
            task::spawn(async move {
                let _ = serve_stream(remote, motors).await;
            });
            Ok(SerialLink::from_stream(
                Box::new(local),
                Duration::from_millis(250),
                2,
            ))
        }
    }

    fn mock_dome() -> Dome {
        Dome::start_with_connector(test_config(), Box::new(MockConnector::new()))
    }

    async fn wait_until<F>(dome: &Dome, deadline_seconds: f64, predicate: F) -> bool
    where
        F: Fn(&crate::status::StatusSnapshot) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs_f64(deadline_seconds);
        loop {
            if predicate(&dome.status()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_ping_and_status_before_initialize() {
        let dome = mock_dome();

        assert_eq!(dome.ping(), CommandStatus::Succeeded);

        let snapshot = dome.status();
        assert_eq!(snapshot.azimuth_status_label, "DISCONNECTED");
        assert_eq!(snapshot.shutter_label, "DISCONNECTED");
        assert!(snapshot.azimuth.is_none());
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let dome = mock_dome();

        assert_eq!(
            dome.open_shutter(CONTROL, false, false).await,
            CommandStatus::NotConnected
        );
        assert_eq!(
            dome.home_azimuth(CONTROL, false).await,
            CommandStatus::NotConnected
        );
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 30).await,
            CommandStatus::NotConnected
        );
        assert_eq!(
            dome.shutdown(CONTROL).await,
            CommandStatus::NotConnected
        );
    }

    #[tokio::test]
    async fn test_initialize_gating_and_state() {
        let dome = mock_dome();

        assert_eq!(
            dome.initialize(STRANGER).await,
            CommandStatus::InvalidControlIP
        );
        assert_eq!(
            dome.initialize(TELESCOPE).await,
            CommandStatus::InvalidControlIP
        );
        assert_eq!(dome.initialize(CONTROL).await, CommandStatus::Succeeded);
        assert_eq!(
            dome.initialize(CONTROL).await,
            CommandStatus::NotDisconnected
        );

        let snapshot = dome.status();
        assert_eq!(snapshot.azimuth_status_label, "NOT HOMED");
        assert_eq!(snapshot.shutter_label, "CLOSED");
        assert_eq!(snapshot.closed, Some(true));
        assert_eq!(snapshot.follow_telescope, Some(true));
        assert_eq!(snapshot.heartbeat_status_label, Some("DISABLED"));

        assert_eq!(dome.shutdown(CONTROL).await, CommandStatus::Succeeded);
        assert_eq!(dome.status().azimuth_status_label, "DISCONNECTED");
    }

    #[tokio::test]
    async fn test_open_and_close_shutter_blocking() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;

        assert_eq!(
            dome.open_shutter(CONTROL, true, false).await,
            CommandStatus::Succeeded
        );
        let snapshot = dome.status();
        assert_eq!(snapshot.shutter_label, "OPEN");
        assert_eq!(snapshot.closed, Some(false));

        assert_eq!(
            dome.close_shutter(CONTROL, true, false).await,
            CommandStatus::Succeeded
        );
        assert_eq!(dome.status().shutter_label, "CLOSED");
    }

    #[tokio::test]
    async fn test_shutter_move_blocks_reverse_without_override() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;

        assert_eq!(
            dome.open_shutter(CONTROL, false, false).await,
            CommandStatus::Succeeded
        );
        assert_eq!(
            dome.close_shutter(CONTROL, false, false).await,
            CommandStatus::Blocked
        );
        assert_eq!(
            dome.close_shutter(CONTROL, true, true).await,
            CommandStatus::Succeeded
        );
        assert_eq!(dome.status().shutter_label, "CLOSED");
    }

    #[tokio::test]
    async fn test_stop_shutter_leaves_it_partially_open() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;

        dome.open_shutter(CONTROL, false, false).await;
        assert!(wait_until(&dome, 5.0, |s| s.shutter_label == "OPENING").await);

        assert_eq!(dome.stop_shutter(CONTROL).await, CommandStatus::Succeeded);
        assert!(wait_until(&dome, 5.0, |s| s.shutter_label == "PARTIALLY OPEN").await);
    }

    #[tokio::test]
    async fn test_home_then_park() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;

        assert_eq!(
            dome.home_azimuth(CONTROL, true).await,
            CommandStatus::Succeeded
        );

        let snapshot = dome.status();
        assert_eq!(snapshot.azimuth_status_label, "IDLE");
        let azimuth = snapshot.azimuth.unwrap();
        assert!(
            (azimuth - 200.0).abs() < 0.2,
            "azimuth {azimuth} not at park"
        );
    }

    #[tokio::test]
    async fn test_slew_rejected_before_home() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;
        dome.set_follow_mode(CONTROL, false).await;

        assert_eq!(
            dome.slew_azimuth(CONTROL, 90.0, false).await,
            CommandStatus::NotHomed
        );
        assert_eq!(dome.park(CONTROL, false).await, CommandStatus::NotHomed);
    }

    #[tokio::test]
    async fn test_slew_azimuth_blocking() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;
        dome.home_azimuth(CONTROL, true).await;
        dome.set_follow_mode(CONTROL, false).await;

        assert_eq!(
            dome.slew_azimuth(CONTROL, 90.0, true).await,
            CommandStatus::Succeeded
        );

        let azimuth = dome.status().azimuth.unwrap();
        assert!((azimuth - 90.0).abs() < 0.2, "azimuth {azimuth} not at 90");
    }

    #[tokio::test]
    async fn test_follow_mode_refuses_direct_motion() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;
        dome.home_azimuth(CONTROL, true).await;

        // follow mode is engaged by default after a connect
        assert_eq!(
            dome.slew_azimuth(CONTROL, 90.0, false).await,
            CommandStatus::FollowModeActive
        );
        assert_eq!(dome.park(CONTROL, false).await, CommandStatus::FollowModeActive);
        assert_eq!(
            dome.stop_azimuth(CONTROL).await,
            CommandStatus::FollowModeActive
        );
        assert_eq!(
            dome.track_radec(CONTROL, 120.0, 20.0, false).await,
            CommandStatus::FollowModeActive
        );

        // the shutter is not follow-gated
        assert_eq!(
            dome.open_shutter(CONTROL, false, false).await,
            CommandStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_telescope_notifications_drive_the_dome() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;
        dome.home_azimuth(CONTROL, true).await;

        assert_eq!(
            dome.notify_telescope_altaz(CONTROL, 30.0, 90.0).await,
            CommandStatus::InvalidControlIP
        );

        assert_eq!(
            dome.notify_telescope_altaz(TELESCOPE, 30.0, 90.0).await,
            CommandStatus::Succeeded
        );

        let expected = geometry::dome_azimuth(30.0, 90.0, 200.0, 40.0);
        assert!(
            wait_until(&dome, 10.0, |s| {
                s.azimuth_status_label == "IDLE"
                    && s.azimuth
                        .map(|az| (az - expected).abs() < 0.2)
                        .unwrap_or(false)
            })
            .await
        );

        assert_eq!(
            dome.notify_telescope_parked(TELESCOPE).await,
            CommandStatus::Succeeded
        );
        assert!(
            wait_until(&dome, 10.0, |s| {
                s.azimuth_status_label == "IDLE"
                    && s.azimuth.map(|az| (az - 200.0).abs() < 0.2).unwrap_or(false)
            })
            .await
        );
    }

    #[tokio::test]
    async fn test_telescope_notifications_are_noops_without_follow_mode() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;
        dome.set_follow_mode(CONTROL, false).await;

        // returns Succeeded but does not slew a dome that was never homed
        assert_eq!(
            dome.notify_telescope_altaz(TELESCOPE, 30.0, 90.0).await,
            CommandStatus::Succeeded
        );
        assert_eq!(
            dome.notify_telescope_stopped(TELESCOPE).await,
            CommandStatus::Succeeded
        );
        assert_eq!(dome.status().azimuth_status_label, "NOT HOMED");
    }

    #[tokio::test]
    async fn test_track_radec_sets_tracking_state() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;
        dome.home_azimuth(CONTROL, true).await;
        dome.set_follow_mode(CONTROL, false).await;

        assert_eq!(
            dome.track_radec(CONTROL, 150.0, 22.5, true).await,
            CommandStatus::Succeeded
        );

        let snapshot = dome.status();
        assert_eq!(snapshot.tracking_ra, Some(150.0));
        assert_eq!(snapshot.tracking_dec, Some(22.5));
        let tracking_azimuth = snapshot.tracking_azimuth.unwrap();
        let azimuth = snapshot.azimuth.unwrap();
        assert!(
            geometry::signed_separation(tracking_azimuth, azimuth).abs() < 0.5,
            "azimuth {azimuth} not tracking {tracking_azimuth}"
        );

        // a direct slew drops the tracking target
        assert_eq!(
            dome.slew_azimuth(CONTROL, 10.0, true).await,
            CommandStatus::Succeeded
        );
        assert!(dome.status().tracking_ra.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_trips_and_closes_shutter() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;

        dome.open_shutter(CONTROL, false, false).await;
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 1).await,
            CommandStatus::Succeeded
        );
        assert_eq!(dome.status().heartbeat_status_label, Some("ACTIVE"));

        // let the heartbeat lapse: the shutter must close on its own
        assert!(
            wait_until(&dome, 15.0, |s| {
                s.heartbeat_status_label == Some("TRIPPED") && s.shutter_label == "CLOSED"
            })
            .await
        );

        assert_eq!(
            dome.close_shutter(CONTROL, false, false).await,
            CommandStatus::HeartbeatTimedOut
        );
        assert_eq!(
            dome.open_shutter(CONTROL, false, false).await,
            CommandStatus::HeartbeatTimedOut
        );
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 30).await,
            CommandStatus::HeartbeatTimedOut
        );

        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 0).await,
            CommandStatus::Succeeded
        );
        assert_eq!(dome.status().heartbeat_status_label, Some("DISABLED"));

        assert_eq!(
            dome.open_shutter(CONTROL, true, false).await,
            CommandStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_bounds() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;

        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 180).await,
            CommandStatus::HeartbeatInvalidTimeout
        );
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, -1).await,
            CommandStatus::HeartbeatInvalidTimeout
        );
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 179).await,
            CommandStatus::Succeeded
        );
        assert!(dome.status().heartbeat_remaining.unwrap() > 170.0);
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 0).await,
            CommandStatus::Succeeded
        );
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 0).await,
            CommandStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_engineering_mode_interlocks() {
        let dome = mock_dome();
        dome.initialize(CONTROL).await;

        dome.set_heartbeat_timer(CONTROL, 60).await;
        assert_eq!(
            dome.set_engineering_mode(CONTROL, true).await,
            CommandStatus::EngineeringModeRequiresHeartbeatDisabled
        );

        dome.set_heartbeat_timer(CONTROL, 0).await;
        assert_eq!(
            dome.set_engineering_mode(CONTROL, true).await,
            CommandStatus::Succeeded
        );
        assert!(dome.status().engineering_mode);

        assert_eq!(
            dome.open_shutter(CONTROL, false, false).await,
            CommandStatus::EngineeringModeActive
        );
        assert_eq!(
            dome.home_azimuth(CONTROL, false).await,
            CommandStatus::EngineeringModeActive
        );
        assert_eq!(
            dome.set_follow_mode(CONTROL, false).await,
            CommandStatus::EngineeringModeActive
        );
        assert_eq!(
            dome.set_heartbeat_timer(CONTROL, 30).await,
            CommandStatus::EngineeringModeActive
        );

        assert_eq!(
            dome.set_engineering_mode(CONTROL, false).await,
            CommandStatus::Succeeded
        );
        assert_eq!(
            dome.open_shutter(CONTROL, true, false).await,
            CommandStatus::Succeeded
        );
    }
}
