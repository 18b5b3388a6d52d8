#![no_std]
#![no_main]

use core::panic::PanicInfo;
use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, Runner, Stack, StackResources};
use embassy_time::Timer;
use esp_backtrace as _;
use esp_hal::{delay::Delay, peripherals::WIFI, timer::timg::TimerGroup};
use esp_radio::wifi::{WifiController, WifiDevice};
use log::{error, info};
use static_cell::StaticCell;

use airnode::{
    config::{NodeConfig, WifiConfig},
    hardware::{Bme280Hardware, ButtonInput, MqttChannel, OledDisplay, WifiLink},
    logic::DeviceOrchestrator,
};

const NET_SEED: u64 = 0x6a1e_0d3c_92f4_b871;
const SOCKET_BUF: usize = 1024;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static RX_BUF: StaticCell<[u8; SOCKET_BUF]> = StaticCell::new();
static TX_BUF: StaticCell<[u8; SOCKET_BUF]> = StaticCell::new();

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    esp_println::println!("[PANIC] {:?}", info);
    let delay = Delay::new();
    loop {
        delay.delay_millis(1_000);
        esp_println::println!("[PANIC] continue...");
    }
}

esp_bootloader_esp_idf::esp_app_desc!();

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Radio driver plus network stack. `None` leaves the node sensor-only.
fn bring_up_radio(
    spawner: &Spawner,
    wifi: WIFI<'static>,
    config: &WifiConfig,
) -> Option<(WifiController<'static>, Stack<'static>)> {
    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(e) => {
            error!("[WIFI] radio init failed: {:?}", e);
            return None;
        }
    };

    let (controller, interfaces) = match esp_radio::wifi::new(radio, wifi, Default::default()) {
        Ok(parts) => parts,
        Err(e) => {
            error!("[WIFI] wifi init failed: {:?}", e);
            return None;
        }
    };

    let mut dhcp = DhcpConfig::default();
    dhcp.hostname = config.hostname.try_into().ok();

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(dhcp),
        NET_RESOURCES.init(StackResources::new()),
        NET_SEED,
    );

    if let Err(e) = spawner.spawn(net_task(runner)) {
        error!("[WIFI] failed to spawn net task: {:?}", e);
        return None;
    }

    Some((controller, stack))
}

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 72 * 1024);

    esp_println::println!("=== Airnode ===");

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let config = NodeConfig::from_build_env();
    info!(
        "[NODE] sample every {}ms, publish every {}ms",
        config.timing.sample_interval.as_millis(),
        config.timing.publish_interval.as_millis()
    );

    // Sensor: I2C0 on GPIO8 (SDA) / GPIO9 (SCL)
    let sensor = Bme280Hardware::new(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9)
        .unwrap_or_else(|e| {
            error!("[BME280] {}, running without sensor", e);
            Bme280Hardware::unavailable()
        });

    // Display: I2C1 on GPIO2 (SDA) / GPIO1 (SCL)
    let display = OledDisplay::new(peripherals.I2C1, peripherals.GPIO2, peripherals.GPIO1)
        .unwrap_or_else(|e| {
            error!("[OLED] {}, running headless", e);
            OledDisplay::unavailable()
        });

    // Boot button, active low
    let button = ButtonInput::new(peripherals.GPIO0);

    let (link, channel) = match bring_up_radio(&spawner, peripherals.WIFI, &config.wifi) {
        Some((controller, stack)) => (
            WifiLink::new(controller, stack, config.wifi),
            MqttChannel::new(
                stack,
                RX_BUF.init([0; SOCKET_BUF]),
                TX_BUF.init([0; SOCKET_BUF]),
                config.broker,
            ),
        ),
        None => (
            WifiLink::unavailable(config.wifi),
            MqttChannel::unavailable(config.broker),
        ),
    };

    let mut node = DeviceOrchestrator::new(config, sensor, display, button, link, channel);

    loop {
        let wait = node.tick().await;
        Timer::after(wait).await;
    }
}
