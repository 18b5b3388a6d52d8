//! Business logic layer (hardware-independent)
//!
//! [`DeviceOrchestrator`] is the node's operating loop written as a state
//! machine. Each call to [`DeviceOrchestrator::tick`] runs until the next wait
//! point and returns how long the caller should sleep before ticking again:
//!
//! ```text
//! Startup -> OptIn -> (WirelessSetup -> AwaitLink) -> Settle
//!   -> [Sample -> Show(T) -> Show(H) -> Show(P)] x N -> PublishCycle -> Session -> Sample ...
//! ```

use core::fmt::Write;

use embassy_time::Duration;
use log::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::model::{Metric, Reading};
use crate::payload;
use crate::traits::{
    ConnectivityManager, DisplayPresenter, InputButton, MetricScreen, PublishChannel, SensorSource,
};

/// Status texts shown on the display.
pub mod status {
    pub const NO_SENSOR: &str = "No sensor";
    pub const OPT_IN_PROMPT: &str = "Enable WiFi?";
    pub const OPT_IN_COUNTDOWN: &str = "Enable WiFi?\nStart in:\n";
    pub const NO_WIRELESS: &str = "Starting...\nNo WiFi";
    pub const WIFI_SETUP: &str = "WiFi setup";
    pub const WIFI_FAILED: &str = "WiFi failed\nNo WiFi";
    pub const CONNECTED: &str = "Connected:\n";
    pub const BROKER_CONFIG: &str = "MQTT config\nNo WiFi";
    pub const RECONNECTING: &str = "Reconnecting\nWiFi";
    pub const NO_BROKER: &str = "No MQTT.";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Why the orchestrator is waiting for the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPurpose {
    Setup,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Startup,
    /// `polls` poll waits have elapsed.
    OptIn { polls: u32 },
    WirelessSetup,
    /// `requested` is true when the current poll already sent an association
    /// request. Every poll that finds the link down sends a new one.
    AwaitLink { purpose: LinkPurpose, requested: bool },
    Settle,
    Sample { cycle: u32 },
    Show { cycle: u32, metric: Metric },
    PublishCycle,
    Session,
}

enum Step {
    Continue,
    Wait(Duration),
}

pub struct DeviceOrchestrator<S, D, B, L, P> {
    config: NodeConfig,
    sensor: S,
    display: D,
    button: B,
    link: L,
    channel: P,
    phase: Phase,
    sub_cycles: u32,
    current: Reading,
    rotation: Metric,
    opt_in: Option<bool>,
    wireless: bool,
    link_indicator: bool,
    connectivity: ConnectivityState,
    session: SessionState,
}

impl<S, D, B, L, P> DeviceOrchestrator<S, D, B, L, P>
where
    S: SensorSource,
    D: DisplayPresenter,
    B: InputButton,
    L: ConnectivityManager,
    P: PublishChannel,
{
    pub fn new(config: NodeConfig, sensor: S, display: D, button: B, link: L, channel: P) -> Self {
        let mut sub_cycles = config.timing.sub_cycles();
        if sub_cycles == 0 {
            warn!(
                "[NODE] publish interval {}ms shorter than one sampling sub-cycle, using 1",
                config.timing.publish_interval.as_millis()
            );
            sub_cycles = 1;
        }

        Self {
            config,
            sensor,
            display,
            button,
            link,
            channel,
            phase: Phase::Startup,
            sub_cycles,
            current: Reading::default(),
            rotation: Metric::Temperature,
            opt_in: None,
            wireless: false,
            link_indicator: false,
            connectivity: ConnectivityState::Disconnected,
            session: SessionState::Disconnected,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Decision of the opt-in window, once it has closed.
    pub fn opt_in(&self) -> Option<bool> {
        self.opt_in
    }

    /// Wireless features are active (opted in and setup succeeded).
    pub fn wireless(&self) -> bool {
        self.wireless
    }

    pub fn reading(&self) -> &Reading {
        &self.current
    }

    /// Metric the next display step will show.
    pub fn rotation(&self) -> Metric {
        self.rotation
    }

    pub fn sub_cycles(&self) -> u32 {
        self.sub_cycles
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    /// Advance to the next wait point and return the wait.
    pub async fn tick(&mut self) -> Duration {
        loop {
            match self.step().await {
                Step::Wait(wait) => return wait,
                Step::Continue => {}
            }
        }
    }

    async fn step(&mut self) -> Step {
        match self.phase {
            Phase::Startup => self.startup(),
            Phase::OptIn { polls } => self.poll_opt_in(polls),
            Phase::WirelessSetup => self.wireless_setup(),
            Phase::AwaitLink { purpose, requested } => self.await_link(purpose, requested),
            Phase::Settle => {
                self.phase = Phase::Sample { cycle: 0 };
                Step::Wait(self.config.timing.sample_interval)
            }
            Phase::Sample { cycle } => self.take_sample(cycle),
            Phase::Show { cycle, metric } => self.show(cycle, metric),
            Phase::PublishCycle => self.publish_cycle(),
            Phase::Session => {
                self.run_session().await;
                self.phase = Phase::Sample { cycle: 0 };
                Step::Continue
            }
        }
    }

    fn startup(&mut self) -> Step {
        if let Err(e) = self.sensor.configure() {
            error!("[SENSOR] {}", e);
            self.display.show_status(status::NO_SENSOR);
        }
        self.current = self.sensor.sample();

        self.display.show_status(status::OPT_IN_PROMPT);
        self.phase = Phase::OptIn { polls: 0 };
        Step::Continue
    }

    fn poll_opt_in(&mut self, polls: u32) -> Step {
        let window = self.config.opt_in;

        if polls > 0 {
            let remaining = window.remaining_after(polls).as_millis() as f32 / 1000.0;
            let mut text = heapless::String::<32>::new();
            let _ = write!(text, "{}{:.2}", status::OPT_IN_COUNTDOWN, remaining);
            self.display.show_status(text.as_str());
        }

        if polls >= window.polls() {
            self.close_opt_in(false);
            return Step::Continue;
        }

        if self.button.is_pressed() {
            self.close_opt_in(true);
            return Step::Continue;
        }

        self.phase = Phase::OptIn { polls: polls + 1 };
        Step::Wait(window.poll)
    }

    fn close_opt_in(&mut self, enabled: bool) {
        info!("[NODE] wireless opt-in: {}", enabled);
        self.opt_in = Some(enabled);
        self.wireless = enabled;
        if enabled {
            self.phase = Phase::WirelessSetup;
        } else {
            self.display.show_status(status::NO_WIRELESS);
            self.phase = Phase::Settle;
        }
    }

    fn wireless_setup(&mut self) -> Step {
        self.display.show_status(status::WIFI_SETUP);
        info!("[WIFI] connecting to {}", self.config.wifi.ssid);

        match self.link.connect() {
            Ok(()) => {
                self.connectivity = ConnectivityState::Connecting;
                self.phase = Phase::AwaitLink {
                    purpose: LinkPurpose::Setup,
                    requested: true,
                };
            }
            Err(e) => {
                error!("[WIFI] setup failed: {}", e);
                self.display.show_status(status::WIFI_FAILED);
                self.disable_wireless();
            }
        }
        Step::Continue
    }

    fn await_link(&mut self, purpose: LinkPurpose, requested: bool) -> Step {
        if !requested {
            match self.link.connect() {
                Ok(()) => self.connectivity = ConnectivityState::Connecting,
                Err(e) => warn!("[WIFI] association request failed: {}", e),
            }
        }

        if !self.link.is_up() {
            // The radio does not retry a lost association on its own.
            self.phase = Phase::AwaitLink {
                purpose,
                requested: false,
            };
            return Step::Wait(self.config.reconnect_poll);
        }

        self.connectivity = ConnectivityState::Connected;
        match purpose {
            LinkPurpose::Setup => self.link_ready(),
            LinkPurpose::Reconnect => {
                info!("[WIFI] link restored");
                self.phase = Phase::Session;
            }
        }
        Step::Continue
    }

    fn link_ready(&mut self) {
        let mut text = heapless::String::<32>::new();
        let _ = write!(text, "{}", status::CONNECTED);
        if let Some(address) = self.link.address() {
            info!("[WIFI] connected, address {}", address);
            let _ = write!(text, "{}", address);
        }
        self.display.show_status(text.as_str());

        match self.channel.configure() {
            Ok(()) => self.phase = Phase::Settle,
            Err(e) => {
                error!("[MQTT] broker configuration rejected: {}", e);
                self.display.show_status(status::BROKER_CONFIG);
                self.disable_wireless();
            }
        }
    }

    fn disable_wireless(&mut self) {
        warn!("[NODE] continuing without wireless");
        self.wireless = false;
        self.connectivity = ConnectivityState::Disconnected;
        self.phase = Phase::Settle;
    }

    fn take_sample(&mut self, cycle: u32) -> Step {
        self.link_indicator = self.wireless && self.link.is_up();
        if self.wireless {
            self.connectivity = if self.link_indicator {
                ConnectivityState::Connected
            } else {
                ConnectivityState::Disconnected
            };
        }
        self.current = self.sensor.sample();
        debug!(
            "[SENSOR] {:.2}C {:.2}% {:.2}hPa",
            self.current.temperature, self.current.humidity, self.current.pressure
        );

        self.rotation = Metric::Temperature;
        self.phase = Phase::Show {
            cycle,
            metric: Metric::Temperature,
        };
        Step::Wait(self.config.timing.sample_interval)
    }

    fn show(&mut self, cycle: u32, metric: Metric) -> Step {
        let screen = MetricScreen::new(metric, &self.current, self.link_indicator);
        self.display.show_metric(&screen);
        self.rotation = metric.next();

        if !metric.is_last() {
            self.phase = Phase::Show {
                cycle,
                metric: metric.next(),
            };
            return Step::Wait(self.config.timing.sample_interval);
        }

        self.phase = if cycle + 1 < self.sub_cycles {
            Phase::Sample { cycle: cycle + 1 }
        } else {
            Phase::PublishCycle
        };
        Step::Continue
    }

    fn publish_cycle(&mut self) -> Step {
        if !self.wireless {
            self.phase = Phase::Sample { cycle: 0 };
            return Step::Continue;
        }

        if self.link.is_up() {
            self.connectivity = ConnectivityState::Connected;
            self.phase = Phase::Session;
        } else {
            warn!("[WIFI] link down, reconnecting");
            self.connectivity = ConnectivityState::Disconnected;
            self.display.show_status(status::RECONNECTING);
            self.phase = Phase::AwaitLink {
                purpose: LinkPurpose::Reconnect,
                requested: false,
            };
        }
        Step::Continue
    }

    async fn run_session(&mut self) {
        if !self.channel.is_connected() {
            self.session = SessionState::Disconnected;
            if !self.channel.connect().await {
                warn!("[MQTT] broker unreachable, skipping this cycle");
                self.display.show_status(status::NO_BROKER);
                return;
            }
            info!("[MQTT] connected as {}", self.config.broker.client_id);
        }
        self.session = SessionState::Connected;

        if !self.channel.service().await {
            warn!("[MQTT] session dropped while servicing");
        }

        match payload::encode(&self.current) {
            Ok(body) => {
                if self.channel.publish(body.as_bytes()).await {
                    debug!("[MQTT] published {}", body.as_str());
                } else {
                    warn!("[MQTT] publish not accepted");
                }
            }
            Err(e) => error!("[MQTT] {}", e),
        }

        if !self.channel.is_connected() {
            self.session = SessionState::Disconnected;
        }
    }
}
