//! # overtflake-client
//!
//! A TCP client for the overt-flake ID service. The client keeps at most
//! one live connection, re-dialing its configured servers in priority order
//! whenever a call finds the connection gone or broken, and decodes the raw
//! ID payload into bytes, 128-bit integers, or structured
//! [`OvertFlakeId`](overtflake::OvertFlakeId) records.

mod client;
mod config;
mod error;

pub use crate::client::*;
pub use crate::config::*;
pub use crate::error::*;
