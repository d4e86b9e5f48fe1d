//! # overtflake
//!
//! Core building blocks for minting overt-flake identifiers: 128-bit,
//! time-ordered, coordination-free IDs composed of a millisecond timestamp
//! delta, a per-millisecond sequence number, a 48-bit hardware id, and a
//! 16-bit process id.
//!
//! The crate is split along the three responsibilities that carry the real
//! engineering:
//!
//! - [`Synthesizer`]: the bit-exact layout of an ID (128-bit overt-flake,
//!   its 53-bit-safe variant, and the classic 64-bit Twitter layout).
//! - [`Allocator`]: the time/sequence state machine that hands out runs of
//!   sequence numbers within a single millisecond tick.
//! - [`Generator`]: the composition of the two, exposing bulk and streaming
//!   generation.
//!
//! Time is always read through the [`TimeSource`] trait so tests can drive
//! the tick-exhaustion and backwards-time paths deterministically.
//!
//! The [`wire`] module holds the request-frame contract shared by the TCP
//! server and client crates.

mod allocator;
mod error;
mod generator;
mod hardware;
mod id;
mod synthesizer;
mod time;
pub mod wire;

pub use crate::allocator::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::hardware::*;
pub use crate::id::*;
pub use crate::synthesizer::*;
pub use crate::time::*;
