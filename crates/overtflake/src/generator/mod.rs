use crate::allocator::{Allocation, Allocator};
use crate::error::{Error, Result};
use crate::hardware::HardwareId;
use crate::synthesizer::{Synthesizer, DEFAULT_SEQUENCE_BITS};
use crate::time::{TimeSource, OVERTONE_EPOCH_MS};


/// Mints overt-flake IDs by pairing a [`Synthesizer`] (the bit layout) with
/// an [`Allocator`] (the time/sequence state machine).
///
/// One generator exists per process; it is shared by reference across
/// connection handlers and is safe for concurrent use. Allocations are
/// linearised by the allocator's mutex, so every ID produced by one
/// generator is unique and IDs within a single call are ordered.
#[derive(Debug)]
pub struct Generator<T> {
    synthesizer: Synthesizer,
    allocator: Allocator<T>,
}

impl<T: TimeSource> Generator<T> {
    /// Builds a generator from an explicit synthesizer and watermark.
    ///
    /// `wait_for_time` is the inclusive lower bound for the first
    /// successful allocation: a restarted process passes the last persisted
    /// tick here and refuses to mint IDs until the clock surpasses it.
    /// Pass zero when unused.
    pub fn new(synthesizer: Synthesizer, wait_for_time: i64, clock: T) -> Self {
        let max_sequence = synthesizer.max_sequence();
        Self {
            synthesizer,
            allocator: Allocator::new(max_sequence, wait_for_time, clock),
        }
    }

    /// A generator for the default 128-bit overt-flake layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequenceBits`] for widths outside `12..=22`.
    pub fn overt_flake(
        epoch: i64,
        sequence_bits: u32,
        hardware_id: HardwareId,
        process_id: u16,
        wait_for_time: i64,
        clock: T,
    ) -> Result<Self> {
        let synthesizer =
            Synthesizer::overt_flake(epoch, sequence_bits, hardware_id, process_id)?;
        Ok(Self::new(synthesizer, wait_for_time, clock))
    }

    /// A generator for the 53-bit-MSB variant.
    pub fn overt_flake_53(
        hardware_id: HardwareId,
        process_id: u16,
        wait_for_time: i64,
        clock: T,
    ) -> Self {
        Self::new(
            Synthesizer::overt_flake_53(hardware_id, process_id),
            wait_for_time,
            clock,
        )
    }

    /// A generator for the 64-bit Twitter-style layout.
    pub fn twitter(machine_id: u64, data_center_id: u64, wait_for_time: i64, clock: T) -> Self {
        Self::new(
            Synthesizer::twitter(machine_id, data_center_id),
            wait_for_time,
            clock,
        )
    }

    /// A default-layout generator on the Overtone epoch, stamped with this
    /// process's pid.
    pub fn overtone(hardware_id: HardwareId, clock: T) -> Self {
        let process_id = (std::process::id() & 0xFFFF) as u16;
        match Self::overt_flake(
            OVERTONE_EPOCH_MS,
            DEFAULT_SEQUENCE_BITS,
            hardware_id,
            process_id,
            0,
            clock,
        ) {
            Ok(generator) => generator,
            Err(_) => unreachable!("the default sequence width is in range"),
        }
    }

    /// Generates exactly `count` IDs into a freshly allocated buffer of
    /// `count * id_size` bytes.
    ///
    /// All-or-nothing: on any error the in-progress buffer is discarded and
    /// only the error is returned.
    pub fn generate(&self, count: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; count as usize * self.id_size()];
        if count == 0 {
            return Ok(buf);
        }

        // The buffer holds the whole batch, so the chunk callback has
        // nothing to deliver; the ids accumulate in place.
        self.generate_stream(count, &mut buf, |_, _| Ok(()))?;
        Ok(buf)
    }

    /// Generates one ID.
    pub fn generate_one(&self) -> Result<Vec<u8>> {
        self.generate(1)
    }

    /// Generates `count` IDs through `scratch`, invoking `on_chunk` with
    /// `(ids_in_chunk, bytes)` every time the buffer fills and once more
    /// for a final partial chunk. Returns the total number of IDs
    /// delivered.
    ///
    /// # Errors
    ///
    /// - [`Error::BufferTooSmall`] when `scratch` cannot hold one ID.
    /// - Any allocator or synthesizer error, or an error returned by
    ///   `on_chunk`, aborts the stream; IDs already delivered stay
    ///   delivered, anything in the scratch buffer is abandoned.
    pub fn generate_stream(
        &self,
        count: u32,
        scratch: &mut [u8],
        mut on_chunk: impl FnMut(usize, &[u8]) -> Result<()>,
    ) -> Result<u64> {
        let id_size = self.id_size();
        if scratch.len() < id_size {
            return Err(Error::BufferTooSmall {
                len: scratch.len(),
                required: id_size,
            });
        }

        // Flush on whole-ID boundaries only.
        let usable = scratch.len() - scratch.len() % id_size;

        let mut remaining = u64::from(count);
        let mut delivered = 0u64;
        let mut cursor = 0usize;

        while remaining > 0 {
            let run = self.allocate(remaining)?;

            for index in 0..run.granted {
                self.synthesizer.synthesize(
                    scratch,
                    cursor,
                    run.tick,
                    run.sequence_start + index,
                )?;
                cursor += id_size;

                if cursor == usable {
                    on_chunk(cursor / id_size, &scratch[..cursor])?;
                    delivered += (cursor / id_size) as u64;
                    cursor = 0;
                }
            }

            remaining -= run.granted;
        }

        if cursor > 0 {
            on_chunk(cursor / id_size, &scratch[..cursor])?;
            delivered += (cursor / id_size) as u64;
        }

        Ok(delivered)
    }

    /// Allocates up to `requested` sequence numbers, clamped to the largest
    /// single-tick run so that bulk requests span ticks instead of
    /// erroring.
    ///
    /// Exposed so callers that interleave generation with I/O (the server's
    /// streaming writer) can drive the same chunk loop as
    /// [`Generator::generate_stream`].
    pub fn allocate(&self, requested: u64) -> Result<Allocation> {
        self.allocator
            .allocate(requested.min(self.allocator.max_sequence()))
    }

    /// Writes the ID for `(tick, sequence)` into `buf` at `offset`. See
    /// [`Synthesizer::synthesize`].
    pub fn synthesize_at(
        &self,
        buf: &mut [u8],
        offset: usize,
        tick: i64,
        sequence: u64,
    ) -> Result<usize> {
        self.synthesizer.synthesize(buf, offset, tick, sequence)
    }

    /// The serialized size of one ID, in bytes.
    pub fn id_size(&self) -> usize {
        self.synthesizer.id_size()
    }

    pub fn epoch(&self) -> i64 {
        self.synthesizer.epoch()
    }

    pub fn max_sequence(&self) -> u64 {
        self.synthesizer.max_sequence()
    }

    pub fn hardware_id(&self) -> Option<HardwareId> {
        self.synthesizer.hardware_id()
    }

    pub fn process_id(&self) -> Option<u16> {
        self.synthesizer.process_id()
    }

    pub fn machine_id(&self) -> u64 {
        self.synthesizer.machine_id()
    }

    /// The most recent tick at which one or more IDs were allocated, read
    /// lock-free. Operators persist this and feed it back as
    /// `wait_for_time` on restart.
    pub fn last_allocated_time(&self) -> i64 {
        self.allocator.last_allocated_time()
    }
}
