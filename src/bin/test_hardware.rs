#![no_std]
#![no_main]

use core::panic::PanicInfo;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_backtrace as _;
use esp_hal::{delay::Delay, timer::timg::TimerGroup};

use airnode::{
    config::{NodeConfig, Timing},
    error::SensorFault,
    hardware::{Bme280Hardware, OledDisplay},
    model::{Metric, Reading},
    mqtt, payload,
    traits::{DisplayPresenter, SensorSource},
};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    esp_println::println!("[PANIC] {:?}", info);
    let delay = Delay::new();
    loop {
        delay.delay_millis(1_000);
    }
}

esp_bootloader_esp_idf::esp_app_desc!();

struct TestResults {
    passed: u32,
    failed: u32,
    total: u32,
}

impl TestResults {
    fn new() -> Self {
        Self {
            passed: 0,
            failed: 0,
            total: 0,
        }
    }

    fn assert(&mut self, condition: bool, test_name: &str) {
        self.total += 1;
        if condition {
            self.passed += 1;
            esp_println::println!("  ✓ {}", test_name);
        } else {
            self.failed += 1;
            esp_println::println!("  ✗ {} FAILED", test_name);
        }
    }

    fn assert_eq<T: PartialEq + core::fmt::Debug>(&mut self, left: T, right: T, test_name: &str) {
        self.total += 1;
        if left == right {
            self.passed += 1;
            esp_println::println!("  ✓ {}", test_name);
        } else {
            self.failed += 1;
            esp_println::println!("  ✗ {} FAILED: {:?} != {:?}", test_name, left, right);
        }
    }

    fn print_summary(&self) {
        esp_println::println!("\n==========================================");
        esp_println::println!("Test Summary:");
        esp_println::println!("  Total:  {}", self.total);
        esp_println::println!("  Passed: {}", self.passed);
        esp_println::println!("  Failed: {}", self.failed);
        if self.failed == 0 {
            esp_println::println!("\n✓ ALL TESTS PASSED!");
        } else {
            esp_println::println!("\n✗ SOME TESTS FAILED");
        }
        esp_println::println!("==========================================");
    }
}

fn test_node_logic(results: &mut TestResults) {
    esp_println::println!("\n[TEST] Node logic");

    let reading = Reading::from_raw(21.5, 40.25, 101_325.0);
    match payload::encode(&reading) {
        Ok(json) => results.assert_eq(
            json.as_str(),
            r#"{"temp":21.50,"humidity":40.25,"pressure":1013.25}"#,
            "payload format",
        ),
        Err(_) => results.assert(false, "payload format"),
    }

    results.assert_eq(Metric::Pressure.next(), Metric::Temperature, "rotation wraps");

    let config = NodeConfig::from_build_env();
    results.assert(config.timing.sub_cycles() >= 1, "configured timing has sub-cycles");

    let odd = Timing {
        sample_interval: Duration::from_millis(5_000),
        publish_interval: Duration::from_millis(50_000),
    };
    results.assert_eq(odd.sub_cycles(), 3, "sub-cycles truncate");

    let mut frame = [0u8; 32];
    match mqtt::encode_connect(&mut frame, "ESP8266", 15) {
        Ok(n) => {
            results.assert_eq(n, 21, "CONNECT length");
            results.assert_eq(frame[0], 0x10, "CONNECT packet type");
        }
        Err(_) => results.assert(false, "CONNECT encodes"),
    }

    match mqtt::encode_disconnect(&mut frame) {
        Ok(n) => results.assert_eq(&frame[..n], &[0xE0u8, 0x00][..], "DISCONNECT frame"),
        Err(_) => results.assert(false, "DISCONNECT encodes"),
    }
}

fn test_fallbacks(results: &mut TestResults) {
    esp_println::println!("\n[TEST] Fallback peripherals");

    let mut sensor = Bme280Hardware::unavailable();
    results.assert_eq(sensor.configure(), Err(SensorFault::NotFound), "missing sensor");
    results.assert_eq(sensor.sample(), Reading::default(), "missing sensor reads zero");

    let mut display = OledDisplay::unavailable();
    display.show_status("headless");
    results.assert(true, "headless display accepts status");
}

async fn test_bme280_sensor<SDA, SCL>(
    results: &mut TestResults,
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: SDA,
    scl: SCL,
) where
    SDA: Into<esp_hal::gpio::AnyPin<'static>>,
    SCL: Into<esp_hal::gpio::AnyPin<'static>>,
{
    esp_println::println!("\n[TEST] BME280 Sensor Tests");

    let mut sensor = match Bme280Hardware::new(i2c0, sda, scl) {
        Ok(sensor) => sensor,
        Err(e) => {
            esp_println::println!("  I2C setup failed: {}", e);
            results.assert(false, "I2C bus setup");
            return;
        }
    };

    if let Err(e) = sensor.configure() {
        esp_println::println!("  Failed to initialize BME280: {}", e);
        results.assert(false, "BME280 initialization");
        return;
    }
    results.assert(true, "BME280 initialization");

    esp_println::println!("  Sampling (5 forced measurements)...");
    let mut samples = heapless::Vec::<Reading, 5>::new();
    for i in 0..5 {
        Timer::after(Duration::from_millis(100)).await;
        let r = sensor.sample();
        esp_println::println!(
            "    Sample {}: {:.2}°C {:.2}% {:.2}hPa",
            i + 1,
            r.temperature,
            r.humidity,
            r.pressure
        );
        let _ = samples.push(r);
    }

    for r in samples.iter() {
        results.assert(r.temperature > -40.0 && r.temperature < 85.0, "temperature in valid range");
        results.assert(r.humidity >= 0.0 && r.humidity <= 100.0, "humidity in valid range");
        results.assert(r.pressure > 300.0 && r.pressure < 1100.0, "pressure in valid range");
    }

    let min_t = samples.iter().fold(f32::INFINITY, |a, r| a.min(r.temperature));
    let max_t = samples.iter().fold(f32::NEG_INFINITY, |a, r| a.max(r.temperature));
    results.assert(max_t - min_t < 2.0, "temperature readings stable (within 2°C)");
}

#[esp_rtos::main]
async fn main(_spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_println::println!("\n==========================================");
    esp_println::println!("=== Airnode Hardware Test Runner ===");
    esp_println::println!("==========================================");

    let mut results = TestResults::new();

    test_node_logic(&mut results);
    test_fallbacks(&mut results);

    let i2c0 = peripherals.I2C0;
    let gpio8 = peripherals.GPIO8;
    let gpio9 = peripherals.GPIO9;

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    test_bme280_sensor(&mut results, i2c0, gpio8, gpio9).await;

    results.print_summary();

    esp_println::println!("\nTest run complete. Looping...");
    let period = if results.failed == 0 { 200 } else { 1000 };
    loop {
        Timer::after(Duration::from_millis(period)).await;
    }
}
