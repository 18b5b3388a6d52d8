//! Mock collaborators sharing one virtual world.
//!
//! Every call the orchestrator makes is journaled with the virtual time it
//! happened at. The clock only moves when [`Rig::tick`] sleeps for the wait
//! the orchestrator asked for, so timings are exact.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use airnode::config::{NodeConfig, Timing};
use airnode::error::{LinkFault, PublishFault, SensorFault};
use airnode::logic::DeviceOrchestrator;
use airnode::model::Reading;
use airnode::traits::{
    ConnectivityManager, DisplayPresenter, InputButton, MetricScreen, PublishChannel, SensorSource,
};
use core::net::Ipv4Addr;
use embassy_futures::block_on;
use embassy_time::Duration;

// ── Call journal ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SensorConfigure,
    SensorSample,
    Status(String),
    Metric { label: String, value: f32, link_up: bool },
    ButtonRead,
    LinkConnect,
    LinkIsUp,
    ChannelConfigure,
    ChannelConnect,
    ChannelService,
    ChannelPublish(String),
}

impl Call {
    pub fn is_wireless(&self) -> bool {
        matches!(
            self,
            Call::LinkConnect
                | Call::LinkIsUp
                | Call::ChannelConfigure
                | Call::ChannelConnect
                | Call::ChannelService
                | Call::ChannelPublish(_)
        )
    }
}

// ── World ─────────────────────────────────────────────────────

pub struct World {
    pub clock: u64,
    pub journal: Vec<(u64, Call)>,

    pub sensor_present: bool,
    pub reading: Reading,

    /// Button reads as pressed from this time on.
    pub press_from: Option<u64>,

    pub link_accepts: bool,
    pub associated: bool,
    /// Access point unreachable. An outage drops the association, and
    /// requests accepted during one never complete.
    pub link_outages: Vec<Range<u64>>,
    pub address: Ipv4Addr,

    pub broker_valid: bool,
    pub broker_accepts: bool,
    pub session_open: bool,
}

impl Default for World {
    fn default() -> Self {
        Self {
            clock: 0,
            journal: Vec::new(),
            sensor_present: true,
            reading: Reading::from_raw(21.5, 40.25, 101_325.0),
            press_from: None,
            link_accepts: true,
            associated: false,
            link_outages: Vec::new(),
            address: Ipv4Addr::new(192, 168, 1, 42),
            broker_valid: true,
            broker_accepts: true,
            session_open: false,
        }
    }
}

#[allow(dead_code)]
impl World {
    fn record(&mut self, call: Call) {
        self.journal.push((self.clock, call));
    }

    fn ap_down(&self) -> bool {
        self.link_outages.iter().any(|o| o.contains(&self.clock))
    }

    fn link_up(&self) -> bool {
        self.associated && !self.ap_down()
    }

    pub fn statuses(&self) -> Vec<(u64, String)> {
        self.journal
            .iter()
            .filter_map(|(at, c)| match c {
                Call::Status(text) => Some((*at, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn metrics(&self) -> Vec<(u64, String, bool)> {
        self.journal
            .iter()
            .filter_map(|(at, c)| match c {
                Call::Metric { label, link_up, .. } => Some((*at, label.clone(), *link_up)),
                _ => None,
            })
            .collect()
    }

    pub fn publishes(&self) -> Vec<(u64, String)> {
        self.journal
            .iter()
            .filter_map(|(at, c)| match c {
                Call::ChannelPublish(body) => Some((*at, body.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn times_of(&self, call: &Call) -> Vec<u64> {
        self.journal
            .iter()
            .filter(|(_, c)| c == call)
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.times_of(call).len()
    }
}

pub type Shared = Rc<RefCell<World>>;

// ── Collaborators ─────────────────────────────────────────────

pub struct MockSensor(Shared);

impl SensorSource for MockSensor {
    fn configure(&mut self) -> Result<(), SensorFault> {
        let mut w = self.0.borrow_mut();
        w.record(Call::SensorConfigure);
        if w.sensor_present {
            Ok(())
        } else {
            Err(SensorFault::NotFound)
        }
    }

    fn sample(&mut self) -> Reading {
        let mut w = self.0.borrow_mut();
        w.record(Call::SensorSample);
        w.reading
    }
}

pub struct MockDisplay(Shared);

impl DisplayPresenter for MockDisplay {
    fn show_status(&mut self, text: &str) {
        self.0.borrow_mut().record(Call::Status(text.to_string()));
    }

    fn show_metric(&mut self, screen: &MetricScreen<'_>) {
        self.0.borrow_mut().record(Call::Metric {
            label: screen.label.to_string(),
            value: screen.value,
            link_up: screen.link_up,
        });
    }
}

pub struct MockButton(Shared);

impl InputButton for MockButton {
    fn is_pressed(&mut self) -> bool {
        let mut w = self.0.borrow_mut();
        w.record(Call::ButtonRead);
        w.press_from.is_some_and(|from| w.clock >= from)
    }
}

pub struct MockLink(Shared);

impl ConnectivityManager for MockLink {
    fn connect(&mut self) -> Result<(), LinkFault> {
        let mut w = self.0.borrow_mut();
        w.record(Call::LinkConnect);
        if w.link_accepts {
            w.associated = !w.ap_down();
            Ok(())
        } else {
            Err(LinkFault::Associate)
        }
    }

    fn is_up(&mut self) -> bool {
        let mut w = self.0.borrow_mut();
        w.record(Call::LinkIsUp);
        if w.ap_down() {
            w.associated = false;
        }
        w.link_up()
    }

    fn address(&self) -> Option<Ipv4Addr> {
        let w = self.0.borrow();
        w.link_up().then_some(w.address)
    }
}

pub struct MockChannel(Shared);

impl PublishChannel for MockChannel {
    fn configure(&mut self) -> Result<(), PublishFault> {
        let mut w = self.0.borrow_mut();
        w.record(Call::ChannelConfigure);
        if w.broker_valid {
            Ok(())
        } else {
            Err(PublishFault::BadAddress)
        }
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().session_open
    }

    async fn connect(&mut self) -> bool {
        let mut w = self.0.borrow_mut();
        w.record(Call::ChannelConnect);
        w.session_open = w.broker_accepts;
        w.session_open
    }

    async fn service(&mut self) -> bool {
        let mut w = self.0.borrow_mut();
        w.record(Call::ChannelService);
        w.session_open
    }

    async fn publish(&mut self, payload: &[u8]) -> bool {
        let mut w = self.0.borrow_mut();
        let body = String::from_utf8_lossy(payload).into_owned();
        w.record(Call::ChannelPublish(body));
        w.session_open
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type Node = DeviceOrchestrator<MockSensor, MockDisplay, MockButton, MockLink, MockChannel>;

pub fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.timing = Timing {
        sample_interval: Duration::from_millis(5_000),
        publish_interval: Duration::from_millis(60_000),
    };
    config.opt_in.decision = Duration::from_millis(10_000);
    config.opt_in.poll = Duration::from_millis(50);
    config.reconnect_poll = Duration::from_millis(1_000);
    config
}

pub struct Rig {
    pub world: Shared,
    pub node: Node,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(world: World) -> Self {
        Self::with_config(world, test_config())
    }

    pub fn with_config(world: World, config: NodeConfig) -> Self {
        let world = Rc::new(RefCell::new(world));
        let node = DeviceOrchestrator::new(
            config,
            MockSensor(world.clone()),
            MockDisplay(world.clone()),
            MockButton(world.clone()),
            MockLink(world.clone()),
            MockChannel(world.clone()),
        );
        Self { world, node }
    }

    /// Opted-in node whose link and broker work.
    pub fn online() -> Self {
        Self::new(World {
            press_from: Some(0),
            ..World::default()
        })
    }

    pub fn now(&self) -> u64 {
        self.world.borrow().clock
    }

    /// Run one tick, then sleep the requested wait on the virtual clock.
    pub fn tick(&mut self) -> Duration {
        let wait = block_on(self.node.tick());
        self.world.borrow_mut().clock += wait.as_millis();
        wait
    }

    /// Tick until the virtual clock reaches `t`.
    pub fn run_until(&mut self, t: u64) {
        while self.now() < t {
            self.tick();
        }
    }

    pub fn world(&self) -> std::cell::Ref<'_, World> {
        self.world.borrow()
    }

    pub fn world_mut(&self) -> std::cell::RefMut<'_, World> {
        self.world.borrow_mut()
    }
}
