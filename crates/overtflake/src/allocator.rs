use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::time::TimeSource;

/// How many spin iterations to burn before hinting the scheduler while
/// waiting out an exhausted tick.
const SPINS_PER_YIELD: u32 = 64;

/// A contiguous run of sequence numbers granted within a single tick.
///
/// The caller owns sequence numbers
/// `[sequence_start, sequence_start + granted)` for millisecond `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub granted: u64,
    pub sequence_start: u64,
    pub tick: i64,
}

#[derive(Debug)]
struct AllocatorState {
    /// The most recent wall-clock millisecond at which the allocator
    /// advanced. Monotonically non-decreasing.
    last_time: i64,
    /// The next sequence number to hand out within `last_time`. A value of
    /// zero on a repeated tick means the tick is exhausted.
    sequence: u64,
}

/// Guards the time/sequence state behind a single mutex and hands out runs
/// of sequence numbers within the current millisecond.
///
/// The critical section contains only arithmetic and clock reads; when a
/// tick's sequence space is exhausted the allocator busy-spins for the next
/// millisecond rather than sleeping, since at millisecond resolution the
/// wait is bounded below the latency of a scheduler round trip.
///
/// `last_time` starts at the operator-supplied watermark so a restarted
/// process refuses to mint IDs until the clock passes the last persisted
/// value.
#[derive(Debug)]
pub struct Allocator<T> {
    state: Mutex<AllocatorState>,
    /// Published copy of `last_time` for lock-free readers. Never ahead of
    /// the committed value.
    last_allocated_time: AtomicI64,
    max_sequence: u64,
    clock: T,
}

impl<T: TimeSource> Allocator<T> {
    /// Creates an allocator for ticks holding `max_sequence + 1` ids each,
    /// refusing to allocate until the clock reaches `wait_for_time`.
    pub fn new(max_sequence: u64, wait_for_time: i64, clock: T) -> Self {
        Self {
            state: Mutex::new(AllocatorState {
                last_time: wait_for_time,
                sequence: 0,
            }),
            last_allocated_time: AtomicI64::new(0),
            max_sequence,
            clock,
        }
    }

    /// Allocates up to `requested` sequence numbers within the current
    /// millisecond.
    ///
    /// Grants the smaller of `requested` and what remains of the current
    /// tick; callers loop for multi-tick batches. When the current tick is
    /// exhausted, spins until the clock advances.
    ///
    /// # Errors
    ///
    /// - [`Error::TooManyRequested`] when `requested` exceeds the largest
    ///   possible sequence number. No state is touched.
    /// - [`Error::TimeMovingBackwards`] when the clock reads earlier than
    ///   the last observed tick. No state is touched; the caller may retry
    ///   once time catches up.
    pub fn allocate(&self, requested: u64) -> Result<Allocation> {
        if requested > self.max_sequence {
            return Err(Error::TooManyRequested {
                requested,
                max: self.max_sequence,
            });
        }

        let mut state = self.state.lock();

        let mut current = self.clock.current_millis();
        if current < state.last_time {
            return Err(Error::TimeMovingBackwards);
        }

        // A repeated tick with sequence zero means the previous allocation
        // consumed the whole tick; wait out the remainder of the millisecond.
        if current == state.last_time && state.sequence == 0 {
            current = self.spin_past(state.last_time);
        }

        if current != state.last_time {
            state.last_time = current;
            state.sequence = 0;
        }

        let remaining = if state.sequence == 0 {
            self.max_sequence + 1
        } else {
            self.max_sequence - state.sequence + 1
        };
        let granted = requested.min(remaining);
        let sequence_start = state.sequence;

        // Wraps to zero exactly when the tick is fully consumed, arming the
        // spin path for the next call.
        state.sequence = (state.sequence + granted) & self.max_sequence;

        self.last_allocated_time
            .store(state.last_time, Ordering::Release);

        Ok(Allocation {
            granted,
            sequence_start,
            tick: state.last_time,
        })
    }

    /// The most recent committed tick, readable without the lock. Readers
    /// observe either the latest committed value or an earlier one, never a
    /// future one.
    pub fn last_allocated_time(&self) -> i64 {
        self.last_allocated_time.load(Ordering::Acquire)
    }

    /// The largest sequence number one tick can hold.
    pub fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    #[cold]
    #[inline(never)]
    fn spin_past(&self, last_time: i64) -> i64 {
        let mut spins = 0u32;
        loop {
            let current = self.clock.current_millis();
            if current > last_time {
                return current;
            }
            spins = spins.wrapping_add(1);
            if spins % SPINS_PER_YIELD == 0 {
                std::thread::yield_now();
            } else {
                core::hint::spin_loop();
            }
        }
    }
}
