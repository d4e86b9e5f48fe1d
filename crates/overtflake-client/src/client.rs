use overtflake::wire;
use overtflake::{OvertFlakeId, OVERT_FLAKE_ID_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ServerEntry;
use crate::error::{Error, Result};

/// A client for the overt-flake ID service.
///
/// The client holds at most one live connection, guarded by a lock that
/// serialises callers. Any I/O or protocol error drops the connection; the
/// next call re-dials the configured entries in order until one accepts.
///
/// The ID size is a deployment-wide constant conveyed out of band: 16 bytes
/// for overt-flake servers (the default), 8 for Twitter-style ones.
#[derive(Debug)]
pub struct Client {
    entries: Vec<ServerEntry>,
    id_size: usize,
    conn: Mutex<Option<TcpStream>>,
}

impl Client {
    /// A client for servers minting the default 16-byte overt-flake IDs.
    ///
    /// # Errors
    ///
    /// - [`Error::NoServers`] when `entries` is empty.
    /// - [`Error::AuthTokenTooLarge`] when any token exceeds 255 bytes.
    pub fn new(entries: Vec<ServerEntry>) -> Result<Self> {
        Self::with_id_size(entries, OVERT_FLAKE_ID_LEN)
    }

    /// A client for servers minting `id_size`-byte IDs.
    pub fn with_id_size(entries: Vec<ServerEntry>, id_size: usize) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::NoServers);
        }
        if entries
            .iter()
            .any(|entry| entry.auth_token.len() > wire::MAX_AUTH_TOKEN_LEN)
        {
            return Err(Error::AuthTokenTooLarge);
        }

        Ok(Self {
            entries,
            id_size,
            conn: Mutex::new(None),
        })
    }

    /// The serialized size of one ID, in bytes.
    pub fn id_size(&self) -> usize {
        self.id_size
    }

    /// Requests `count` IDs in one round trip and returns the raw payload,
    /// `count * id_size` bytes.
    pub async fn generate(&self, count: u32) -> Result<Vec<u8>> {
        if !wire::is_valid_count(count) {
            return Err(Error::InvalidCount { count });
        }

        let mut conn = self.conn.lock().await;

        let mut ids = vec![0u8; count as usize * self.id_size];
        match self.request(&mut conn, count, &mut ids).await {
            Ok(()) => Ok(ids),
            Err(error) => {
                // Whatever went wrong, the connection is no longer
                // trustworthy; the next call re-dials.
                *conn = None;
                Err(error)
            }
        }
    }

    /// Requests a single ID.
    pub async fn generate_one(&self) -> Result<Vec<u8>> {
        self.generate(1).await
    }

    /// Requests `count` IDs in sub-requests sized to `scratch`, invoking
    /// `on_chunk` with `(ids_in_chunk, bytes)` once per round trip.
    /// Returns the total number of IDs delivered.
    pub async fn generate_stream(
        &self,
        count: u32,
        scratch: &mut [u8],
        mut on_chunk: impl FnMut(usize, &[u8]) -> Result<()>,
    ) -> Result<u64> {
        let ids_per_chunk = scratch.len() / self.id_size;
        if ids_per_chunk == 0 {
            return Err(Error::BufferTooSmall {
                len: scratch.len(),
                required: self.id_size,
            });
        }

        let mut conn = self.conn.lock().await;
        let mut remaining = u64::from(count);
        let mut delivered = 0u64;

        while remaining > 0 {
            let chunk_ids = remaining.min(ids_per_chunk as u64) as u32;
            let chunk_bytes = chunk_ids as usize * self.id_size;

            let result = self
                .request(&mut conn, chunk_ids, &mut scratch[..chunk_bytes])
                .await;
            if let Err(error) = result {
                *conn = None;
                return Err(error);
            }

            on_chunk(chunk_ids as usize, &scratch[..chunk_bytes])?;
            delivered += u64::from(chunk_ids);
            remaining -= u64::from(chunk_ids);
        }

        Ok(delivered)
    }

    /// Requests `count` IDs and decodes each as an [`OvertFlakeId`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdSizeMismatch`] when the client is configured for
    /// a non-16-byte layout.
    pub async fn generate_ids(&self, count: u32) -> Result<Vec<OvertFlakeId>> {
        if self.id_size != OVERT_FLAKE_ID_LEN {
            return Err(Error::IdSizeMismatch { size: self.id_size });
        }

        let bytes = self.generate(count).await?;
        Ok(bytes
            .chunks_exact(OVERT_FLAKE_ID_LEN)
            .filter_map(OvertFlakeId::from_slice)
            .collect())
    }

    /// Requests `count` IDs and decodes each as a big-endian 128-bit
    /// integer.
    pub async fn generate_u128s(&self, count: u32) -> Result<Vec<u128>> {
        Ok(self
            .generate_ids(count)
            .await?
            .iter()
            .map(OvertFlakeId::to_u128)
            .collect())
    }

    /// Drops the current connection. The next call reconnects.
    pub async fn close(&self) {
        *self.conn.lock().await = None;
    }

    /// One request/response round trip, connecting first when necessary.
    /// `payload` must be exactly `count * id_size` bytes, for a `count`
    /// already validated against the wire rules.
    async fn request(
        &self,
        conn: &mut Option<TcpStream>,
        count: u32,
        payload: &mut [u8],
    ) -> Result<()> {
        if conn.is_none() {
            *conn = Some(self.connect().await?);
        }
        let stream = conn.as_mut().ok_or(Error::NoServerConnection)?;

        stream.write_all(&wire::count_header(count)).await?;

        stream.read_exact(payload).await.map_err(|error| {
            if error.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ShortRead
            } else {
                Error::Io(error)
            }
        })?;

        Ok(())
    }

    /// Dials the configured entries in order, sending the authentication
    /// preamble where the entry carries a token.
    async fn connect(&self) -> Result<TcpStream> {
        for entry in &self.entries {
            let mut stream = match TcpStream::connect(&entry.addr).await {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(addr = %entry.addr, %error, "server unreachable, trying next");
                    continue;
                }
            };

            if !entry.auth_token.is_empty() {
                let mut frame = Vec::with_capacity(4 + entry.auth_token.len());
                frame.extend_from_slice(&wire::auth_header(entry.auth_token.len() as u8));
                frame.extend_from_slice(entry.auth_token.as_bytes());

                if let Err(error) = stream.write_all(&frame).await {
                    warn!(addr = %entry.addr, %error, "authentication write failed, trying next");
                    continue;
                }
            }

            debug!(addr = %entry.addr, "connected");
            return Ok(stream);
        }

        Err(Error::NoServerConnection)
    }
}
