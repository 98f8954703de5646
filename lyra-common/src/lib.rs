//! # Lyra Common Library
//!
//! Shared code for the Lyra corpus services including:
//! - Error and result types
//! - Bootstrap configuration loading (TOML, root folder resolution)
//! - Event types (LyraEvent enum) and the broadcast EventBus
//! - SSE helpers
//! - Clock abstraction used for TTL and progress timestamps

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
