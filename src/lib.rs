#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod display;
pub mod error;
pub mod logic;
pub mod model;
pub mod mqtt;
pub mod payload;
pub mod traits;

#[cfg(feature = "esp32s3")]
pub mod hardware;
