/// One server the client may draw IDs from.
///
/// Entries are tried in the order they were configured; the first one that
/// accepts a connection wins until that connection breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Full `host:port` address of the server.
    pub addr: String,
    /// Auth token for this server; empty for no authentication.
    pub auth_token: String,
}

impl ServerEntry {
    pub fn new(addr: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            auth_token: auth_token.into(),
        }
    }

    /// An entry for a server that does not require authentication.
    pub fn unauthenticated(addr: impl Into<String>) -> Self {
        Self::new(addr, "")
    }
}
