pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for overt-flake ID generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The wall clock is behind the allocator's last observed tick.
    /// Generation cannot resume until time catches back up; the caller may
    /// retry later.
    #[error("time is moving backwards; cannot resume until the last tick is reached")]
    TimeMovingBackwards,

    /// A single allocation asked for more sequence numbers than one
    /// millisecond tick can ever hold.
    #[error("requested {requested} ids exceeds the per-allocation maximum of {max}")]
    TooManyRequested { requested: u64, max: u64 },

    /// The scratch buffer handed to a streaming API cannot hold even one ID.
    #[error("buffer of {len} bytes is too small to hold a single {required}-byte id")]
    BufferTooSmall { len: usize, required: usize },

    /// The current time predates the configured epoch.
    #[error("time {now}ms is earlier than the configured epoch {epoch}ms")]
    ClockOutOfEpoch { now: i64, epoch: i64 },

    /// The configured sequence width is outside the supported range.
    #[error("sequence bits {bits} is outside the supported range {min}..={max}",
        min = crate::MIN_SEQUENCE_BITS, max = crate::MAX_SEQUENCE_BITS)]
    InvalidSequenceBits { bits: u32 },

    /// No network interfaces are available for hardware-id discovery.
    #[error("no network interfaces are available")]
    NoNetworkInterfaces,

    /// Network interfaces exist but none of them carry a hardware address.
    #[error("no hardware addresses are available")]
    NoHardwareAddresses,

    /// The requested hardware-id size is not supported by the provider.
    #[error("the requested hardware id size ({size}) is not supported by the provider")]
    InvalidSizeForHardwareId { size: usize },
}
