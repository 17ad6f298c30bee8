//! Firmware protocol handling

pub mod grbl;
