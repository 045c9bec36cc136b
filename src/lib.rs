//! workout-sync: shared workout sessions with reminders, fan-out and step tracking.
//! Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
