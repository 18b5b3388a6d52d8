//! ESP32-S3 adapters for the collaborator traits

use core::net::Ipv4Addr;

use bme280::i2c::BME280;
use embassy_net::{
    Stack,
    tcp::{State, TcpSocket},
};
use embassy_time::{Duration, Instant, with_timeout};
use embedded_io_async::{Read, Write};
use esp_hal::{
    Blocking,
    delay::Delay,
    gpio::{AnyPin, Input, InputConfig, Pull},
    i2c::master::{Config as I2cConfig, I2c},
    peripherals::{I2C0, I2C1},
    time::Rate,
};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{debug, error, info, warn};
use ssd1306::{I2CDisplayInterface, Ssd1306, mode::BufferedGraphicsMode, prelude::*};

use crate::config::{BrokerConfig, WifiConfig};
use crate::display::{render_metric, render_status};
use crate::error::{LinkFault, PublishFault, SensorFault};
use crate::model::Reading;
use crate::mqtt::{self, ConnackCode, FixedHeader, Inbound, PacketType};
use crate::traits::{
    ConnectivityManager, DisplayPresenter, InputButton, MetricScreen, PublishChannel, SensorSource,
};

const SENSOR_I2C_KHZ: u32 = 100;
const DISPLAY_I2C_KHZ: u32 = 400;
const SOCKET_TIMEOUT_SECS: u64 = 10;
const CONNACK_TIMEOUT_SECS: u64 = 5;
const PACKET_BUF: usize = 192;

fn i2c_bus<'a, SDA, SCL>(
    i2c: impl esp_hal::i2c::master::Instance + 'a,
    sda: SDA,
    scl: SCL,
    khz: u32,
) -> Result<I2c<'a, Blocking>, &'static str>
where
    SDA: Into<AnyPin<'a>>,
    SCL: Into<AnyPin<'a>>,
{
    let bus = I2c::new(i2c, I2cConfig::default().with_frequency(Rate::from_khz(khz)))
        .map_err(|_| "Invalid I2C configuration")?
        .with_sda(sda.into())
        .with_scl(scl.into());
    Ok(bus)
}

/// BME280 on I2C0, address 0x76, forced measurements
pub struct Bme280Hardware<'a> {
    sensor: Option<BME280<I2c<'a, Blocking>>>,
    delay: Delay,
    last: Reading,
}

impl<'a> Bme280Hardware<'a> {
    pub fn new<SDA, SCL>(i2c_periph: I2C0<'a>, sda: SDA, scl: SCL) -> Result<Self, &'static str>
    where
        SDA: Into<AnyPin<'a>>,
        SCL: Into<AnyPin<'a>>,
    {
        let i2c = i2c_bus(i2c_periph, sda, scl, SENSOR_I2C_KHZ)?;

        Ok(Self {
            sensor: Some(BME280::new_primary(i2c)),
            delay: Delay::new(),
            last: Reading::default(),
        })
    }

    /// Sensor whose bus could not be set up. Reports itself missing and
    /// reads as zero.
    pub fn unavailable() -> Self {
        Self {
            sensor: None,
            delay: Delay::new(),
            last: Reading::default(),
        }
    }
}

impl SensorSource for Bme280Hardware<'_> {
    fn configure(&mut self) -> Result<(), SensorFault> {
        let sensor = self.sensor.as_mut().ok_or(SensorFault::NotFound)?;
        sensor.init(&mut self.delay).map_err(|e| {
            error!("[BME280] init failed: {:?}", e);
            SensorFault::NotFound
        })?;
        info!("[BME280] Initialized - forced mode, x1 oversampling");
        Ok(())
    }

    fn sample(&mut self) -> Reading {
        let Some(sensor) = self.sensor.as_mut() else {
            return self.last;
        };
        match sensor.measure(&mut self.delay) {
            Ok(m) => self.last = Reading::from_raw(m.temperature, m.humidity, m.pressure),
            Err(e) => warn!("[BME280] {}: {:?}", SensorFault::ReadFailed, e),
        }
        self.last
    }
}

type Oled<'a> = Ssd1306<
    I2CInterface<I2c<'a, Blocking>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

/// SSD1306 128x64 on I2C1, address 0x3C, mounted upside down
pub struct OledDisplay<'a> {
    display: Option<Oled<'a>>,
    ready: bool,
}

impl<'a> OledDisplay<'a> {
    pub fn new<SDA, SCL>(i2c_periph: I2C1<'a>, sda: SDA, scl: SCL) -> Result<Self, &'static str>
    where
        SDA: Into<AnyPin<'a>>,
        SCL: Into<AnyPin<'a>>,
    {
        let i2c = i2c_bus(i2c_periph, sda, scl, DISPLAY_I2C_KHZ)?;

        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate180)
            .into_buffered_graphics_mode();

        let ready = match display.init() {
            Ok(()) => {
                info!("[OLED] Display ready");
                true
            }
            Err(e) => {
                error!("[OLED] init failed: {:?}", e);
                false
            }
        };

        Ok(Self {
            display: Some(display),
            ready,
        })
    }

    /// Headless node: every screen is dropped.
    pub fn unavailable() -> Self {
        Self {
            display: None,
            ready: false,
        }
    }

    fn panel(&mut self) -> Option<&mut Oled<'a>> {
        if self.ready {
            self.display.as_mut()
        } else {
            None
        }
    }
}

fn flush(display: &mut Oled<'_>) {
    if let Err(e) = display.flush() {
        warn!("[OLED] flush failed: {:?}", e);
    }
}

impl DisplayPresenter for OledDisplay<'_> {
    fn show_status(&mut self, text: &str) {
        let Some(display) = self.panel() else {
            return;
        };
        if let Err(e) = render_status(display, text) {
            warn!("[OLED] {}", e);
        }
        flush(display);
    }

    fn show_metric(&mut self, screen: &MetricScreen<'_>) {
        let Some(display) = self.panel() else {
            return;
        };
        if let Err(e) = render_metric(display, screen) {
            warn!("[OLED] {}", e);
        }
        flush(display);
    }
}

/// Active-low push button with internal pull-up
pub struct ButtonInput<'a> {
    input: Input<'a>,
}

impl<'a> ButtonInput<'a> {
    pub fn new<PIN>(pin: PIN) -> Self
    where
        PIN: Into<AnyPin<'a>>,
    {
        let config = InputConfig::default().with_pull(Pull::Up);
        Self {
            input: Input::new(pin.into(), config),
        }
    }
}

impl InputButton for ButtonInput<'_> {
    fn is_pressed(&mut self) -> bool {
        self.input.is_low()
    }
}

/// Station-mode Wi-Fi. "Up" means associated and DHCP configured.
pub struct WifiLink<'a> {
    radio: Option<(WifiController<'a>, Stack<'a>)>,
    wifi: WifiConfig,
    configured: bool,
}

impl<'a> WifiLink<'a> {
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>, wifi: WifiConfig) -> Self {
        Self {
            radio: Some((controller, stack)),
            wifi,
            configured: false,
        }
    }

    /// Link whose radio failed to initialize; every connect attempt fails.
    pub fn unavailable(wifi: WifiConfig) -> Self {
        Self {
            radio: None,
            wifi,
            configured: false,
        }
    }
}

impl ConnectivityManager for WifiLink<'_> {
    fn connect(&mut self) -> Result<(), LinkFault> {
        let Some((controller, _)) = self.radio.as_mut() else {
            return Err(LinkFault::Unavailable);
        };

        if !self.configured {
            let client = ClientConfig::default()
                .with_ssid(self.wifi.ssid.into())
                .with_password(self.wifi.password.into());
            controller
                .set_config(&ModeConfig::Client(client))
                .map_err(|e| {
                    warn!("[WIFI] set_config failed: {:?}", e);
                    LinkFault::Config
                })?;
            self.configured = true;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            controller.start().map_err(|e| {
                warn!("[WIFI] start failed: {:?}", e);
                LinkFault::Start
            })?;
            info!("[WIFI] started STA mode as {}", self.wifi.hostname);
        }

        if matches!(controller.is_connected(), Ok(true)) {
            return Ok(());
        }
        controller.connect().map_err(|e| {
            warn!("[WIFI] connect failed: {:?}", e);
            LinkFault::Associate
        })
    }

    fn is_up(&mut self) -> bool {
        match &self.radio {
            Some((controller, stack)) => {
                matches!(controller.is_connected(), Ok(true)) && stack.is_config_up()
            }
            None => false,
        }
    }

    fn address(&self) -> Option<Ipv4Addr> {
        let (_, stack) = self.radio.as_ref()?;
        stack.config_v4().map(|config| config.address.address())
    }
}

/// MQTT 3.1.1 publisher over a single reusable TCP socket
pub struct MqttChannel<'a> {
    socket: Option<TcpSocket<'a>>,
    broker: BrokerConfig,
    address: Option<Ipv4Addr>,
    connected: bool,
    last_sent: Instant,
    packet: [u8; PACKET_BUF],
    inbound: Inbound<PACKET_BUF>,
}

impl<'a> MqttChannel<'a> {
    pub fn new(stack: Stack<'a>, rx: &'a mut [u8], tx: &'a mut [u8], broker: BrokerConfig) -> Self {
        Self::with_socket(Some(TcpSocket::new(stack, rx, tx)), broker)
    }

    pub fn unavailable(broker: BrokerConfig) -> Self {
        Self::with_socket(None, broker)
    }

    fn with_socket(socket: Option<TcpSocket<'a>>, broker: BrokerConfig) -> Self {
        Self {
            socket,
            broker,
            address: None,
            connected: false,
            last_sent: Instant::from_ticks(0),
            packet: [0; PACKET_BUF],
            inbound: Inbound::new(),
        }
    }

    async fn open(&mut self, address: Ipv4Addr) -> Result<(), PublishFault> {
        let socket = self.socket.as_mut().ok_or(PublishFault::Unavailable)?;

        // Drop whatever the previous session left behind.
        socket.abort();
        let _ = socket.flush().await;
        self.inbound.clear();

        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));
        socket
            .connect((address, self.broker.port))
            .await
            .map_err(|e| {
                debug!("[MQTT] tcp connect: {:?}", e);
                PublishFault::Transport
            })?;

        let n = mqtt::encode_connect(
            &mut self.packet,
            self.broker.client_id,
            self.broker.keep_alive_secs,
        )?;
        send(socket, &self.packet[..n]).await?;

        let mut ack = [0u8; 4];
        with_timeout(
            Duration::from_secs(CONNACK_TIMEOUT_SECS),
            socket.read_exact(&mut ack),
        )
        .await
        .map_err(|_| PublishFault::Timeout)?
        .map_err(|e| {
            debug!("[MQTT] connack read: {:?}", e);
            PublishFault::Transport
        })?;

        match mqtt::decode_connack(&ack)? {
            ConnackCode::Accepted => {
                self.last_sent = Instant::now();
                Ok(())
            }
            ConnackCode::Refused(code) => Err(PublishFault::Refused(code)),
        }
    }

    fn drop_session(&mut self, reason: &str) {
        if self.connected {
            warn!("[MQTT] session lost: {}", reason);
        }
        self.connected = false;
        if let Some(socket) = self.socket.as_mut() {
            socket.abort();
        }
    }
}

impl PublishChannel for MqttChannel<'_> {
    fn configure(&mut self) -> Result<(), PublishFault> {
        if self.socket.is_none() {
            return Err(PublishFault::Unavailable);
        }
        if self.broker.topic.is_empty() || self.broker.client_id.is_empty() {
            return Err(PublishFault::MissingIdentity);
        }
        let address = self
            .broker
            .host
            .parse::<Ipv4Addr>()
            .map_err(|_| PublishFault::BadAddress)?;
        info!(
            "[MQTT] broker {}:{} topic {}",
            address, self.broker.port, self.broker.topic
        );
        self.address = Some(address);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
            && self
                .socket
                .as_ref()
                .is_some_and(|socket| socket.state() == State::Established)
    }

    async fn connect(&mut self) -> bool {
        let Some(address) = self.address else {
            error!("[MQTT] broker not configured");
            return false;
        };
        match self.open(address).await {
            Ok(()) => {
                self.connected = true;
                true
            }
            Err(e) => {
                warn!("[MQTT] connect to {} failed: {}", address, e);
                self.drop_session("handshake failed");
                false
            }
        }
    }

    async fn service(&mut self) -> bool {
        if !self.is_connected() {
            self.drop_session("socket closed");
            return false;
        }
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };

        while socket.can_recv() {
            match socket.read(self.inbound.spare()).await {
                Ok(0) | Err(_) => {
                    self.drop_session("read failed");
                    return false;
                }
                Ok(n) => {
                    self.inbound.commit(n, log_inbound);
                }
            }
        }

        let keep_alive = Duration::from_secs(self.broker.keep_alive_secs as u64);
        if self.last_sent.elapsed() >= keep_alive {
            let sent = match mqtt::encode_pingreq(&mut self.packet) {
                Ok(n) => send(socket, &self.packet[..n]).await,
                Err(e) => Err(e.into()),
            };
            if sent.is_err() {
                self.drop_session("keep-alive failed");
                return false;
            }
            self.last_sent = Instant::now();
        }
        true
    }

    async fn publish(&mut self, payload: &[u8]) -> bool {
        if !self.connected {
            return false;
        }
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };

        let n = match mqtt::encode_publish(&mut self.packet, self.broker.topic, payload) {
            Ok(n) => n,
            Err(e) => {
                error!("[MQTT] cannot encode publish: {}", e);
                return false;
            }
        };

        match send(socket, &self.packet[..n]).await {
            Ok(()) => {
                self.last_sent = Instant::now();
                true
            }
            Err(e) => {
                warn!("[MQTT] publish failed: {}", e);
                self.drop_session("write failed");
                false
            }
        }
    }
}

async fn send(socket: &mut TcpSocket<'_>, bytes: &[u8]) -> Result<(), PublishFault> {
    socket.write_all(bytes).await.map_err(|e| {
        debug!("[MQTT] write: {:?}", e);
        PublishFault::Transport
    })?;
    socket.flush().await.map_err(|_| PublishFault::Transport)
}

fn log_inbound(header: FixedHeader, packet: &[u8]) {
    match header.packet {
        PacketType::Publish => match mqtt::publish_topic(packet) {
            Ok(topic) => info!("[MQTT] message on {}", topic),
            Err(e) => debug!("[MQTT] unreadable publish: {}", e),
        },
        PacketType::Pingresp => debug!("[MQTT] pong"),
        other => debug!("[MQTT] ignoring {:?}", other),
    }
}
