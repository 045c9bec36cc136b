//! Notification adapters. Implement NotificationDispatcher and NotificationPermission.
//!
//! Provides the Expo push adapter and a logging dispatcher for local runs and tests.

pub mod expo_push;
pub mod log_dispatcher;
pub mod permission;

pub use expo_push::{EXPO_PUSH_URL, ExpoPushDispatcher};
pub use log_dispatcher::LogDispatcher;
pub use permission::StaticPermission;
