//! Per-connection protocol handling.
//!
//! A connection is a sequence of 4-byte request frames: an optional
//! authentication preamble followed by generate requests, answered with raw
//! ID bytes and nothing else. Any protocol violation, allocator failure, or
//! I/O error terminates the connection; no error frame is ever written to
//! the wire.
//!
//! The handler is generic over the byte stream so the state machine can be
//! exercised against in-memory pipes.

use overtflake::wire::{self, RequestFrame};
use overtflake::{Generator, TimeSource};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// IDs held by the reusable per-connection scratch buffer.
const SCRATCH_IDS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The server requires a token and the first frame was not a valid
    /// authentication.
    #[error("client authentication is required")]
    AuthRequired,

    /// The presented token did not match the configured one.
    #[error("invalid credentials")]
    InvalidAuth,

    /// The client sent an authentication frame after it had already
    /// authenticated (or after its one tolerated unsolicited frame).
    #[error("client is attempting unexpected re-authentication")]
    InvalidReauthentication,

    /// A generate frame carried a zero count.
    #[error("a zero id count is not a valid request")]
    BadCount,

    #[error(transparent)]
    Generate(#[from] overtflake::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Runs the protocol state machine until the peer disconnects or an error
/// closes the connection.
///
/// When `auth_token` is non-empty the first frame must authenticate.
/// When it is empty, one unsolicited authentication frame is consumed and
/// discarded (tolerant client libraries send it unconditionally); a second
/// one is an error.
pub async fn serve_connection<S, T>(
    mut stream: S,
    generator: &Generator<T>,
    auth_token: &str,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: TimeSource,
{
    let mut scratch = vec![0u8; SCRATCH_IDS * generator.id_size()];
    let mut authenticated = false;

    loop {
        let mut header = [0u8; 4];
        let n = stream.read(&mut header).await?;
        if n == 0 {
            // Clean close between requests.
            return Ok(());
        }
        stream.read_exact(&mut header[n..]).await?;

        match wire::parse_request(u32::from_be_bytes(header)) {
            RequestFrame::Auth { len } => {
                let mut token = vec![0u8; usize::from(len)];
                stream.read_exact(&mut token).await?;

                if authenticated {
                    return Err(ConnectionError::InvalidReauthentication);
                }
                if !auth_token.is_empty() && token != auth_token.as_bytes() {
                    return Err(ConnectionError::InvalidAuth);
                }
                authenticated = true;
            }
            RequestFrame::Generate { count } => {
                if !auth_token.is_empty() && !authenticated {
                    return Err(ConnectionError::AuthRequired);
                }
                if count == 0 {
                    return Err(ConnectionError::BadCount);
                }

                stream_ids(generator, count, &mut scratch, &mut stream).await?;
            }
        }
    }
}

/// Streams `count` IDs to the peer through the reusable scratch buffer:
/// a full buffer goes out as one write, the tail as a final partial write,
/// with a flush after each chunk.
async fn stream_ids<S, T>(
    generator: &Generator<T>,
    count: u32,
    scratch: &mut [u8],
    stream: &mut S,
) -> Result<(), ConnectionError>
where
    S: AsyncWrite + Unpin,
    T: TimeSource,
{
    let id_size = generator.id_size();
    let mut remaining = u64::from(count);
    let mut cursor = 0usize;

    while remaining > 0 {
        let run = generator.allocate(remaining)?;

        for index in 0..run.granted {
            generator.synthesize_at(scratch, cursor, run.tick, run.sequence_start + index)?;
            cursor += id_size;

            if cursor == scratch.len() {
                stream.write_all(scratch).await?;
                stream.flush().await?;
                cursor = 0;
            }
        }

        remaining -= run.granted;
    }

    if cursor > 0 {
        stream.write_all(&scratch[..cursor]).await?;
        stream.flush().await?;
    }

    Ok(())
}
