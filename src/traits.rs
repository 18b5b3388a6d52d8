//! Hardware abstraction traits

use core::net::Ipv4Addr;

use crate::error::{LinkFault, PublishFault, SensorFault};
use crate::model::{Metric, Reading};

/// Source of environment readings
pub trait SensorSource {
    /// Bring the sensor up. A fault is reported once; `sample` keeps working
    /// on a best-effort basis afterwards.
    fn configure(&mut self) -> Result<(), SensorFault>;

    /// Take one forced measurement. May return stale or zeroed values after a fault.
    fn sample(&mut self) -> Reading;
}

/// Text scale used on metric screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextScale {
    Small,
    Large,
}

/// One metric page of the display rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricScreen<'a> {
    pub label: &'a str,
    pub value: f32,
    pub scale: TextScale,
    /// Wireless link was up when the sample was taken.
    pub link_up: bool,
}

impl MetricScreen<'static> {
    pub fn new(metric: Metric, reading: &Reading, link_up: bool) -> Self {
        Self {
            label: metric.label(),
            value: reading.value(metric),
            scale: TextScale::Large,
            link_up,
        }
    }
}

/// Output surface. Every call clears and redraws the whole screen.
pub trait DisplayPresenter {
    fn show_status(&mut self, text: &str);

    fn show_metric(&mut self, screen: &MetricScreen<'_>);
}

/// Digital input sampled during the opt-in window
pub trait InputButton {
    fn is_pressed(&mut self) -> bool;
}

/// Wireless link
pub trait ConnectivityManager {
    /// Start associating with the configured network. Completion is observed
    /// through `is_up`.
    fn connect(&mut self) -> Result<(), LinkFault>;

    fn is_up(&mut self) -> bool;

    fn address(&self) -> Option<Ipv4Addr>;
}

/// Broker session
#[allow(async_fn_in_trait)]
pub trait PublishChannel {
    /// Check the broker settings before the first handshake.
    fn configure(&mut self) -> Result<(), PublishFault>;

    fn is_connected(&self) -> bool;

    /// One handshake attempt.
    async fn connect(&mut self) -> bool;

    /// Process inbound traffic and keep the session alive. Returns `false`
    /// once the session is found dead.
    async fn service(&mut self) -> bool;

    /// Fire-and-forget publish to the configured topic.
    async fn publish(&mut self, payload: &[u8]) -> bool;
}
