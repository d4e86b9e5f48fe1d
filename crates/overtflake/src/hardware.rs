use core::fmt;

use mac_address::MacAddressIterator;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The length, in bytes, of a node's hardware id (one MAC address).
pub const HARDWARE_ID_LEN: usize = 6;

/// Size of a SHA-1 digest; the upper bound for hashed hardware ids.
const SHA1_LEN: usize = 20;

/// A stable 6-byte node identity, treated as the most significant 48 bits of
/// the machine id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareId([u8; HARDWARE_ID_LEN]);

impl HardwareId {
    pub const fn from_bytes(bytes: [u8; HARDWARE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a hardware id from the first 6 bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSizeForHardwareId`] when fewer than 6 bytes
    /// are supplied.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HARDWARE_ID_LEN {
            return Err(Error::InvalidSizeForHardwareId { size: bytes.len() });
        }
        let mut id = [0u8; HARDWARE_ID_LEN];
        id.copy_from_slice(&bytes[..HARDWARE_ID_LEN]);
        Ok(Self(id))
    }

    pub const fn as_bytes(&self) -> &[u8; HARDWARE_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Strategies for deriving a node's hardware id bytes.
///
/// The `Mac` provider folds every discovered interface address through SHA-1
/// so that adding or removing one NIC changes the id completely rather than
/// shifting neighbours; `SimpleMac` takes the first interface address as-is
/// and is not recommended for production fleets; `Fixed` serves operators who
/// assign node identity through configuration.
#[derive(Debug, Clone)]
pub enum HardwareIdProvider {
    /// SHA-1 over the concatenation of every discovered MAC address.
    Mac,
    /// The first discovered MAC address, verbatim.
    SimpleMac,
    /// A configured byte string, truncated to the requested size.
    Fixed(Vec<u8>),
}

impl HardwareIdProvider {
    /// Produces `size` bytes of hardware id.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSizeForHardwareId`] when `size` is outside the
    ///   provider's supported range (`6..=20` for `Mac`, exactly 6 for
    ///   `SimpleMac`, at most the configured length for `Fixed`).
    /// - [`Error::NoNetworkInterfaces`] / [`Error::NoHardwareAddresses`]
    ///   when interface enumeration fails or yields nothing.
    pub fn get(&self, size: usize) -> Result<Vec<u8>> {
        match self {
            Self::Mac => {
                if !(HARDWARE_ID_LEN..=SHA1_LEN).contains(&size) {
                    return Err(Error::InvalidSizeForHardwareId { size });
                }

                let mut concat = Vec::new();
                for mac in discover_macs()? {
                    concat.extend_from_slice(&mac);
                }
                if concat.is_empty() {
                    return Err(Error::NoHardwareAddresses);
                }

                let digest = Sha1::digest(&concat);
                Ok(digest[..size].to_vec())
            }
            Self::SimpleMac => {
                if size != HARDWARE_ID_LEN {
                    return Err(Error::InvalidSizeForHardwareId { size });
                }

                discover_macs()?
                    .into_iter()
                    .next()
                    .map(|mac| mac.to_vec())
                    .ok_or(Error::NoHardwareAddresses)
            }
            Self::Fixed(bytes) => {
                if size > bytes.len() {
                    return Err(Error::InvalidSizeForHardwareId { size });
                }
                Ok(bytes[..size].to_vec())
            }
        }
    }

    /// Convenience wrapper producing the 6-byte [`HardwareId`] the generator
    /// consumes.
    pub fn hardware_id(&self) -> Result<HardwareId> {
        HardwareId::from_slice(&self.get(HARDWARE_ID_LEN)?)
    }
}

/// Enumerates the hardware addresses of every network interface, in
/// interface-enumeration order.
fn discover_macs() -> Result<Vec<[u8; HARDWARE_ID_LEN]>> {
    let iter = MacAddressIterator::new().map_err(|_| Error::NoNetworkInterfaces)?;
    Ok(iter.map(|mac| mac.bytes()).collect())
}
