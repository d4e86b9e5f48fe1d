use std::future::Future;
use std::sync::Arc;

use overtflake::{Generator, TimeSource};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::serve_connection;

/// The TCP front end: one listener, one shared [`Generator`], one spawned
/// handler per accepted connection.
///
/// Per-connection failures are logged and the accept loop keeps going; only
/// a listener error or the shutdown future ends the server.
pub struct OvertFlakeServer<T> {
    listen_addr: String,
    auth_token: String,
    generator: Arc<Generator<T>>,
}

impl<T> OvertFlakeServer<T>
where
    T: TimeSource + Send + Sync + 'static,
{
    pub fn new(listen_addr: String, auth_token: String, generator: Generator<T>) -> Self {
        Self {
            listen_addr,
            auth_token,
            generator: Arc::new(generator),
        }
    }

    /// Accepts and serves connections until `shutdown` resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(
            addr = %self.listen_addr,
            auth = !self.auth_token.is_empty(),
            id_size = self.generator.id_size(),
            "listening"
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let generator = Arc::clone(&self.generator);
                    let auth_token = self.auth_token.clone();

                    tokio::spawn(async move {
                        if let Err(error) = serve_connection(stream, &generator, &auth_token).await {
                            warn!(%peer, %error, "connection closed");
                        }
                    });
                }
                () = &mut shutdown => {
                    info!("shutdown signal received, stopping accept loop");
                    return Ok(());
                }
            }
        }
    }
}
