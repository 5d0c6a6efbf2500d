//! devlink: typed remote operations on instrument devices.
//!
//! Architecture:
//! - `devgen`: build-time generator reading annotated C++ device headers
//! - `protocol`: command envelope, codec and discovery table
//! - `device`: server-side device runtime and built-in devices
//! - `network`: client runtime, sessions and the listener loop
//! - `core`: memory-mapped register window

pub mod core;
pub mod devgen;
pub mod device;
pub mod error;
pub mod logger;
pub mod network;
pub mod protocol;

pub use error::{Error, Result};
