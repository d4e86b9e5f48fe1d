pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by the overt-flake client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The client was configured without any server entries.
    #[error("no servers (network addresses) were provided for client connections")]
    NoServers,

    /// An auth token exceeds what the wire can announce in one byte.
    #[error("auth token cannot exceed {max} bytes in length", max = overtflake::wire::MAX_AUTH_TOKEN_LEN)]
    AuthTokenTooLarge,

    /// Every configured server failed to accept a connection.
    #[error("none of the configured servers could be reached")]
    NoServerConnection,

    /// The server delivered fewer bytes than the request called for.
    #[error("read fewer bytes than expected")]
    ShortRead,

    /// The requested count cannot be encoded as a generate frame.
    #[error("{count} is not a valid id count for a single request")]
    InvalidCount { count: u32 },

    /// The scratch buffer handed to a streaming call cannot hold one ID.
    #[error("buffer of {len} bytes is too small to hold a single {required}-byte id")]
    BufferTooSmall { len: usize, required: usize },

    /// A structured decode was requested for a non-overt-flake ID size.
    #[error("structured decoding requires 16-byte ids, but the client is configured for {size}")]
    IdSizeMismatch { size: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
