// Model of the data read in this app

/// One snapshot of the environment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
}

impl Reading {
    /// Build a reading from sensor units; pressure arrives in Pa and is kept in hPa.
    pub fn from_raw(temperature: f32, humidity: f32, pressure_pa: f32) -> Self {
        Self {
            temperature,
            humidity,
            pressure: pressure_pa / 100.0,
        }
    }

    pub fn value(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Pressure => self.pressure,
        }
    }
}

/// Metrics in display rotation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
}

impl Metric {
    pub const ROTATION: [Metric; 3] = [Metric::Temperature, Metric::Humidity, Metric::Pressure];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Temperature => "Temp [C]:",
            Metric::Humidity => "Hum [%]:",
            Metric::Pressure => "Pre [hPa]:",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next metric in the rotation, wrapping after pressure.
    pub fn next(self) -> Metric {
        Self::ROTATION[(self.index() + 1) % Self::ROTATION.len()]
    }

    pub fn is_last(self) -> bool {
        self.index() == Self::ROTATION.len() - 1
    }
}
