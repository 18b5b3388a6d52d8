//! Published message body

use core::fmt::Write;

use crate::error::PayloadError;
use crate::model::Reading;

/// Upper bound of a serialized reading, in bytes.
pub const MAX_PAYLOAD: usize = 60;

pub type Payload = heapless::String<MAX_PAYLOAD>;

/// Render `{"temp":..,"humidity":..,"pressure":..}` with two decimals.
///
/// Values that would not fit the buffer are rejected instead of truncated.
pub fn encode(reading: &Reading) -> Result<Payload, PayloadError> {
    let mut buffer = Payload::new();
    write!(
        buffer,
        "{{\"temp\":{:.2},\"humidity\":{:.2},\"pressure\":{:.2}}}",
        reading.temperature, reading.humidity, reading.pressure
    )
    .map_err(|_| PayloadError::TooLong(MAX_PAYLOAD))?;
    Ok(buffer)
}
