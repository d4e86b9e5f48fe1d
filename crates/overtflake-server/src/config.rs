use anyhow::bail;
use clap::Parser;
use overtflake::wire::MAX_AUTH_TOKEN_LEN;
use overtflake::{
    HardwareIdProvider, DEFAULT_SEQUENCE_BITS, MAX_SEQUENCE_BITS, MIN_SEQUENCE_BITS,
    OVERTONE_EPOCH_MS,
};

/// Runtime configuration for the `overtflake-server` binary.
///
/// All values are parsed from CLI arguments or environment variables, with
/// defaults matching a standalone single-node deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "overtflake-server",
    version,
    about = "A TCP service for streaming overt-flake IDs"
)]
pub struct CliArgs {
    /// Network interface/address to listen on.
    ///
    /// Environment variable: `LISTEN_ADDR`
    #[arg(long, env = "LISTEN_ADDR", default_value_t = String::from("0.0.0.0:4444"))]
    pub listen_addr: String,

    /// Hardware id provider: `mac` (SHA-1 over all NIC addresses),
    /// `simple` (first NIC address), or `fixed` (requires `--hardware-id`).
    ///
    /// Environment variable: `HID_TYPE`
    #[arg(long, env = "HID_TYPE", default_value_t = String::from("mac"))]
    pub hid_type: String,

    /// Byte string backing the `fixed` hardware id provider (at least 6
    /// bytes).
    ///
    /// Environment variable: `HARDWARE_ID`
    #[arg(long, env = "HARDWARE_ID")]
    pub hardware_id: Option<String>,

    /// Generator type: `default` (128-bit overt-flake), `flake53`
    /// (53-bit-safe upper half), or `twitter` (64-bit snowflake).
    ///
    /// Environment variable: `GEN_TYPE`
    #[arg(long, env = "GEN_TYPE", default_value_t = String::from("default"))]
    pub gen_type: String,

    /// Epoch for id generation, in milliseconds since the Unix epoch.
    ///
    /// Environment variable: `EPOCH`
    #[arg(long, env = "EPOCH", default_value_t = OVERTONE_EPOCH_MS)]
    pub epoch: i64,

    /// Width of the per-millisecond sequence field, in bits.
    ///
    /// Environment variable: `SEQUENCE_BITS`
    #[arg(long, env = "SEQUENCE_BITS", default_value_t = DEFAULT_SEQUENCE_BITS)]
    pub sequence_bits: u32,

    /// Tick watermark: id generation may start at this time, but not
    /// before. Operators pass the last persisted allocation time here
    /// after a restart.
    ///
    /// Environment variable: `WAIT_FOR`
    #[arg(long, env = "WAIT_FOR", default_value_t = 0)]
    pub wait_for: i64,

    /// Shared token clients must present before their first request. An
    /// empty token disables authentication.
    ///
    /// Environment variable: `AUTH_TOKEN`
    #[arg(long, env = "AUTH_TOKEN", default_value_t = String::new())]
    pub auth_token: String,

    /// Machine id for the `twitter` generator (5 bits).
    ///
    /// Environment variable: `MACHINE_ID`
    #[arg(long, env = "MACHINE_ID", default_value_t = 0)]
    pub machine_id: u64,

    /// Data-center id for the `twitter` generator (5 bits).
    ///
    /// Environment variable: `DATA_CENTER_ID`
    #[arg(long, env = "DATA_CENTER_ID", default_value_t = 0)]
    pub data_center_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenType {
    Default,
    Flake53,
    Twitter,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub hid_provider: HardwareIdProvider,
    pub gen_type: GenType,
    pub epoch: i64,
    pub sequence_bits: u32,
    pub wait_for: i64,
    pub auth_token: String,
    pub machine_id: u64,
    pub data_center_id: u64,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.auth_token.len() > MAX_AUTH_TOKEN_LEN {
            bail!(
                "AUTH_TOKEN is {} bytes; the wire protocol caps tokens at {}",
                args.auth_token.len(),
                MAX_AUTH_TOKEN_LEN
            );
        }

        let hid_provider = match args.hid_type.to_lowercase().as_str() {
            "mac" => HardwareIdProvider::Mac,
            "simple" => HardwareIdProvider::SimpleMac,
            "fixed" => match args.hardware_id {
                Some(bytes) => HardwareIdProvider::Fixed(bytes.into_bytes()),
                None => bail!("HID_TYPE 'fixed' requires HARDWARE_ID"),
            },
            other => bail!("unsupported hardware id provider: {other}"),
        };

        let gen_type = match args.gen_type.to_lowercase().as_str() {
            "default" => GenType::Default,
            "flake53" => GenType::Flake53,
            "twitter" => GenType::Twitter,
            other => bail!("unsupported generator type: {other}"),
        };

        if gen_type == GenType::Default
            && !(MIN_SEQUENCE_BITS..=MAX_SEQUENCE_BITS).contains(&args.sequence_bits)
        {
            bail!(
                "SEQUENCE_BITS ({}) must be within {}..={}",
                args.sequence_bits,
                MIN_SEQUENCE_BITS,
                MAX_SEQUENCE_BITS
            );
        }

        if gen_type == GenType::Twitter && (args.machine_id > 0x1F || args.data_center_id > 0x1F) {
            bail!(
                "MACHINE_ID ({}) and DATA_CENTER_ID ({}) are 5-bit fields (0..=31)",
                args.machine_id,
                args.data_center_id
            );
        }

        Ok(Self {
            listen_addr: args.listen_addr,
            hid_provider,
            gen_type,
            epoch: args.epoch,
            sequence_bits: args.sequence_bits,
            wait_for: args.wait_for,
            auth_token: args.auth_token,
            machine_id: args.machine_id,
            data_center_id: args.data_center_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["overtflake-server"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn defaults_build_a_mac_backed_default_generator() {
        let config = ServerConfig::try_from(args(&[])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:4444");
        assert_eq!(config.gen_type, GenType::Default);
        assert_eq!(config.epoch, OVERTONE_EPOCH_MS);
        assert_eq!(config.sequence_bits, DEFAULT_SEQUENCE_BITS);
        assert!(matches!(config.hid_provider, HardwareIdProvider::Mac));
        assert!(config.auth_token.is_empty());
    }

    #[test]
    fn fixed_provider_requires_the_byte_string() {
        assert!(ServerConfig::try_from(args(&["--hid-type", "fixed"])).is_err());

        let config = ServerConfig::try_from(args(&[
            "--hid-type",
            "fixed",
            "--hardware-id",
            "node-a",
        ]))
        .unwrap();
        match config.hid_provider {
            HardwareIdProvider::Fixed(bytes) => assert_eq!(bytes, b"node-a"),
            other => panic!("unexpected provider {other:?}"),
        }
    }

    #[test]
    fn out_of_range_sequence_bits_are_rejected() {
        assert!(ServerConfig::try_from(args(&["--sequence-bits", "11"])).is_err());
        assert!(ServerConfig::try_from(args(&["--sequence-bits", "23"])).is_err());
        assert!(ServerConfig::try_from(args(&["--sequence-bits", "12"])).is_ok());
    }

    #[test]
    fn twitter_node_ids_are_bounds_checked() {
        assert!(ServerConfig::try_from(args(&[
            "--gen-type",
            "twitter",
            "--machine-id",
            "32"
        ]))
        .is_err());
        assert!(ServerConfig::try_from(args(&[
            "--gen-type",
            "twitter",
            "--machine-id",
            "31",
            "--data-center-id",
            "7"
        ]))
        .is_ok());
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(ServerConfig::try_from(args(&["--hid-type", "dmi"])).is_err());
        assert!(ServerConfig::try_from(args(&["--gen-type", "ulid"])).is_err());
    }
}
