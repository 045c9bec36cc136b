//! Infrastructure adapters. Implement outbound ports.
//!
//! Record stores, notification delivery, step sources, clocks and the terminal UI.
//! Map errors to DomainError.

pub mod clock;
pub mod friends;
pub mod notifications;
pub mod pedometer;
pub mod persistence;
pub mod ui;
