use crate::error::{Error, Result};
use crate::hardware::HardwareId;
use crate::id::OVERT_FLAKE_ID_LEN;
use crate::time::{OVERTONE_EPOCH_MS, SNOWFLAKE_EPOCH_MS};

/// The default width of the sequence field.
pub const DEFAULT_SEQUENCE_BITS: u32 = 16;

/// Narrowest supported sequence field.
pub const MIN_SEQUENCE_BITS: u32 = 12;

/// Widest supported sequence field; anything wider truncates the timestamp
/// unacceptably.
pub const MAX_SEQUENCE_BITS: u32 = 22;

/// Sequence width of the 53-bit-MSB variant.
pub const SEQUENCE_BITS_53: u32 = 12;

/// `2^53 - 1`: the largest integer that survives a round trip through an
/// IEEE-754 double mantissa. The 53-bit variant masks the upper word with
/// this, bounding the delta to 41 bits (~127 years from the Overtone epoch).
pub const MSB_MASK_53: u64 = 0x001F_FFFF_FFFF_FFFF;

/// The length, in bytes, of a Twitter-style snowflake ID.
pub const TWITTER_ID_LEN: usize = 8;

const TWITTER_SEQUENCE_BITS: u32 = 12;
const TWITTER_NODE_BITS: u32 = 5;
const TWITTER_NODE_MASK: u64 = (1 << TWITTER_NODE_BITS) - 1;

/// A pure, stateless writer of ID bytes: one variant per wire layout the
/// service can be configured to mint.
///
/// A synthesizer owns everything about an ID except its timestamp and
/// sequence number, which the [`Allocator`](crate::Allocator) supplies per
/// call.
#[derive(Debug, Clone)]
pub enum Synthesizer {
    /// The 128-bit overt-flake layout: 48-bit delta, N-bit sequence,
    /// 48-bit hardware id, 16-bit process id.
    OvertFlake {
        epoch: i64,
        sequence_bits: u32,
        sequence_mask: u64,
        /// Mask applied to the upper word before writing; `u64::MAX` except
        /// in the 53-bit variant.
        upper_mask: u64,
        hardware_id: HardwareId,
        process_id: u16,
        machine_id: u64,
    },
    /// The classic 64-bit layout:
    /// `delta << 22 | data_center_id << 17 | machine_id << 12 | sequence`.
    Twitter {
        epoch: i64,
        machine_id: u64,
        data_center_id: u64,
    },
}

impl Synthesizer {
    /// An overt-flake synthesizer with a configurable epoch and sequence
    /// width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequenceBits`] when `sequence_bits` is
    /// outside `12..=22`.
    pub fn overt_flake(
        epoch: i64,
        sequence_bits: u32,
        hardware_id: HardwareId,
        process_id: u16,
    ) -> Result<Self> {
        if !(MIN_SEQUENCE_BITS..=MAX_SEQUENCE_BITS).contains(&sequence_bits) {
            return Err(Error::InvalidSequenceBits { bits: sequence_bits });
        }

        Ok(Self::OvertFlake {
            epoch,
            sequence_bits,
            sequence_mask: (1 << sequence_bits) - 1,
            upper_mask: u64::MAX,
            hardware_id,
            process_id,
            machine_id: pack_machine_id(hardware_id, process_id),
        })
    }

    /// The 53-bit-MSB overt-flake variant, for platforms where the upper
    /// half of the ID must survive conversion through a double mantissa.
    ///
    /// The epoch is pinned to the Overtone epoch to maximise the range of
    /// the 41 remaining delta bits, and the sequence is pinned to 12 bits.
    pub fn overt_flake_53(hardware_id: HardwareId, process_id: u16) -> Self {
        Self::OvertFlake {
            epoch: OVERTONE_EPOCH_MS,
            sequence_bits: SEQUENCE_BITS_53,
            sequence_mask: (1 << SEQUENCE_BITS_53) - 1,
            upper_mask: MSB_MASK_53,
            hardware_id,
            process_id,
            machine_id: pack_machine_id(hardware_id, process_id),
        }
    }

    /// A Twitter-style synthesizer. Machine and data-center ids are masked
    /// to their 5-bit fields.
    pub fn twitter(machine_id: u64, data_center_id: u64) -> Self {
        Self::Twitter {
            epoch: SNOWFLAKE_EPOCH_MS,
            machine_id: machine_id & TWITTER_NODE_MASK,
            data_center_id: data_center_id & TWITTER_NODE_MASK,
        }
    }

    /// Writes one ID into `buf` at `offset` and returns the number of bytes
    /// written ([`Synthesizer::id_size`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockOutOfEpoch`] when `time_ms` predates the
    /// configured epoch.
    ///
    /// # Panics
    ///
    /// Panics if `buf` cannot hold `id_size` bytes at `offset`; callers own
    /// the buffer arithmetic.
    pub fn synthesize(
        &self,
        buf: &mut [u8],
        offset: usize,
        time_ms: i64,
        sequence: u64,
    ) -> Result<usize> {
        match self {
            Self::OvertFlake {
                epoch,
                sequence_bits,
                sequence_mask,
                upper_mask,
                machine_id,
                ..
            } => {
                let delta = checked_delta(time_ms, *epoch)?;
                let upper = ((delta << sequence_bits) | (sequence & sequence_mask)) & upper_mask;

                buf[offset..offset + 8].copy_from_slice(&upper.to_be_bytes());
                buf[offset + 8..offset + 16].copy_from_slice(&machine_id.to_be_bytes());
                Ok(OVERT_FLAKE_ID_LEN)
            }
            Self::Twitter {
                epoch,
                machine_id,
                data_center_id,
            } => {
                let delta = checked_delta(time_ms, *epoch)?;
                let id = (delta << (TWITTER_SEQUENCE_BITS + 2 * TWITTER_NODE_BITS))
                    | (data_center_id << (TWITTER_SEQUENCE_BITS + TWITTER_NODE_BITS))
                    | (machine_id << TWITTER_SEQUENCE_BITS)
                    | (sequence & ((1 << TWITTER_SEQUENCE_BITS) - 1));

                buf[offset..offset + 8].copy_from_slice(&id.to_be_bytes());
                Ok(TWITTER_ID_LEN)
            }
        }
    }

    /// The serialized size of one ID, in bytes.
    pub fn id_size(&self) -> usize {
        match self {
            Self::OvertFlake { .. } => OVERT_FLAKE_ID_LEN,
            Self::Twitter { .. } => TWITTER_ID_LEN,
        }
    }

    pub fn sequence_bits(&self) -> u32 {
        match self {
            Self::OvertFlake { sequence_bits, .. } => *sequence_bits,
            Self::Twitter { .. } => TWITTER_SEQUENCE_BITS,
        }
    }

    pub fn sequence_mask(&self) -> u64 {
        (1 << self.sequence_bits()) - 1
    }

    /// The largest sequence number one tick can hold.
    pub fn max_sequence(&self) -> u64 {
        self.sequence_mask()
    }

    pub fn epoch(&self) -> i64 {
        match self {
            Self::OvertFlake { epoch, .. } | Self::Twitter { epoch, .. } => *epoch,
        }
    }

    /// The hardware id baked into overt-flake IDs; `None` for the Twitter
    /// layout, which has no such field.
    pub fn hardware_id(&self) -> Option<HardwareId> {
        match self {
            Self::OvertFlake { hardware_id, .. } => Some(*hardware_id),
            Self::Twitter { .. } => None,
        }
    }

    /// The process id baked into overt-flake IDs; `None` for the Twitter
    /// layout.
    pub fn process_id(&self) -> Option<u16> {
        match self {
            Self::OvertFlake { process_id, .. } => Some(*process_id),
            Self::Twitter { .. } => None,
        }
    }

    pub fn machine_id(&self) -> u64 {
        match self {
            Self::OvertFlake { machine_id, .. } | Self::Twitter { machine_id, .. } => *machine_id,
        }
    }
}

/// Packs the 6-byte hardware id into the high 48 bits and the process id
/// into the low 16.
fn pack_machine_id(hardware_id: HardwareId, process_id: u16) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..6].copy_from_slice(hardware_id.as_bytes());
    u64::from_be_bytes(bytes) | u64::from(process_id)
}

fn checked_delta(time_ms: i64, epoch: i64) -> Result<u64> {
    let delta = time_ms - epoch;
    if delta < 0 {
        return Err(Error::ClockOutOfEpoch {
            now: time_ms,
            epoch,
        });
    }
    Ok(delta as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::OvertFlakeId;

    fn test_hardware_id() -> HardwareId {
        HardwareId::from_bytes([0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    }

    #[test]
    fn default_layout_is_bit_exact() {
        let synth =
            Synthesizer::overt_flake(OVERTONE_EPOCH_MS, 16, test_hardware_id(), 0x1234).unwrap();

        let now = 1_500_000_000_000;
        let mut buf = [0u8; OVERT_FLAKE_ID_LEN];
        let written = synth.synthesize(&mut buf, 0, now, 0).unwrap();
        assert_eq!(written, OVERT_FLAKE_ID_LEN);

        let id = OvertFlakeId::from_bytes(buf);
        assert_eq!(id.upper(), ((now - OVERTONE_EPOCH_MS) as u64) << 16);
        assert_eq!(id.lower(), 0x1122_3344_5566_1234);
    }

    #[test]
    fn sequence_lands_in_the_low_bits_of_the_upper_word() {
        let synth =
            Synthesizer::overt_flake(OVERTONE_EPOCH_MS, 16, test_hardware_id(), 1).unwrap();

        let mut buf = [0u8; OVERT_FLAKE_ID_LEN];
        synth
            .synthesize(&mut buf, 0, OVERTONE_EPOCH_MS + 42, 0xBEEF)
            .unwrap();

        let id = OvertFlakeId::from_bytes(buf);
        assert_eq!(id.timestamp(), 42);
        assert_eq!(id.sequence(), 0xBEEF);
    }

    #[test]
    fn synthesize_honors_the_offset() {
        let synth =
            Synthesizer::overt_flake(OVERTONE_EPOCH_MS, 16, test_hardware_id(), 7).unwrap();

        let mut buf = [0u8; OVERT_FLAKE_ID_LEN * 2];
        synth
            .synthesize(&mut buf, OVERT_FLAKE_ID_LEN, OVERTONE_EPOCH_MS + 1, 3)
            .unwrap();

        assert_eq!(&buf[..OVERT_FLAKE_ID_LEN], &[0u8; OVERT_FLAKE_ID_LEN]);
        let id = OvertFlakeId::from_slice(&buf[OVERT_FLAKE_ID_LEN..]).unwrap();
        assert_eq!(id.timestamp(), 1);
        assert_eq!(id.sequence(), 3);
    }

    #[test]
    fn msb53_variant_fits_a_double_mantissa() {
        let synth = Synthesizer::overt_flake_53(test_hardware_id(), 0xFFFF);

        // Far enough in the future that an unmasked delta would overflow 41
        // bits of headroom is impractical to construct; instead check the
        // mask keeps the upper word within 2^53 - 1.
        let mut buf = [0u8; OVERT_FLAKE_ID_LEN];
        synth
            .synthesize(&mut buf, 0, OVERTONE_EPOCH_MS + (1 << 42), 0xFFF)
            .unwrap();

        let id = OvertFlakeId::from_bytes(buf);
        assert_eq!(id.upper(), id.upper() & MSB_MASK_53);
        assert_eq!(id.to_u128(), id.to_u128() & ((u128::from(MSB_MASK_53) << 64) | 0xFFFF_FFFF_FFFF_FFFF));
        assert_eq!(id.sequence_with_bits(SEQUENCE_BITS_53), 0xFFF);
    }

    #[test]
    fn twitter_layout_packs_all_four_fields() {
        let synth = Synthesizer::twitter(0b10101, 0b01010);
        assert_eq!(synth.id_size(), TWITTER_ID_LEN);

        let mut buf = [0u8; TWITTER_ID_LEN];
        let written = synth
            .synthesize(&mut buf, 0, SNOWFLAKE_EPOCH_MS + 99, 0x123)
            .unwrap();
        assert_eq!(written, TWITTER_ID_LEN);

        let id = u64::from_be_bytes(buf);
        assert_eq!(id, (99 << 22) | (0b01010 << 17) | (0b10101 << 12) | 0x123);
    }

    #[test]
    fn twitter_node_ids_are_masked_to_five_bits() {
        let synth = Synthesizer::twitter(0xFF, 0xFF);
        match synth {
            Synthesizer::Twitter {
                machine_id,
                data_center_id,
                ..
            } => {
                assert_eq!(machine_id, 0x1F);
                assert_eq!(data_center_id, 0x1F);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn pre_epoch_time_is_rejected() {
        let synth =
            Synthesizer::overt_flake(OVERTONE_EPOCH_MS, 16, test_hardware_id(), 0).unwrap();

        let mut buf = [0u8; OVERT_FLAKE_ID_LEN];
        let err = synth
            .synthesize(&mut buf, 0, OVERTONE_EPOCH_MS - 1, 0)
            .unwrap_err();
        assert_eq!(
            err,
            Error::ClockOutOfEpoch {
                now: OVERTONE_EPOCH_MS - 1,
                epoch: OVERTONE_EPOCH_MS,
            }
        );
    }

    #[test]
    fn sequence_bits_are_range_checked() {
        for bits in [0, 11, 23, 64] {
            assert_eq!(
                Synthesizer::overt_flake(0, bits, test_hardware_id(), 0).unwrap_err(),
                Error::InvalidSequenceBits { bits },
            );
        }
        for bits in [12, 16, 22] {
            assert!(Synthesizer::overt_flake(0, bits, test_hardware_id(), 0).is_ok());
        }
    }

    #[test]
    fn machine_id_packs_hardware_then_process() {
        let synth =
            Synthesizer::overt_flake(OVERTONE_EPOCH_MS, 16, test_hardware_id(), 0xABCD).unwrap();
        assert_eq!(synth.machine_id(), 0x1122_3344_5566_ABCD);
        assert_eq!(synth.hardware_id(), Some(test_hardware_id()));
        assert_eq!(synth.process_id(), Some(0xABCD));
    }
}
