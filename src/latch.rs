//! Latch delay timing
//!
//! WS2812 strips latch the shifted-in data once the line has been idle for a
//! while. After each completed transfer a channel gets a one-shot deadline;
//! its buffer is handed back only once that deadline has passed.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};

use crate::config::{LATCH_DELAY_US, NUM_CHANNELS};
use crate::gate::ChannelSync;
use crate::types::ChannelIndex;

pub const LATCH_DELAY: Duration = Duration::from_micros(LATCH_DELAY_US);

/// At most one pending deadline per channel.
pub struct LatchSchedule {
    deadlines: Mutex<CriticalSectionRawMutex, RefCell<[Option<Instant>; NUM_CHANNELS]>>,
    rearmed: Signal<CriticalSectionRawMutex, ()>,
}

impl LatchSchedule {
    pub const fn new() -> Self {
        Self {
            deadlines: Mutex::new(RefCell::new([None; NUM_CHANNELS])),
            rearmed: Signal::new(),
        }
    }

    /// Start the latch delay for `channel` at `now`, replacing any pending
    /// one. Returns `true` if a pending deadline was cancelled.
    pub fn arm(&self, channel: ChannelIndex, now: Instant) -> bool {
        let replaced = self.deadlines.lock(|deadlines| {
            deadlines.borrow_mut()[channel.as_usize()]
                .replace(now + LATCH_DELAY)
                .is_some()
        });
        self.rearmed.signal(());
        replaced
    }

    /// Returns `true` if a deadline was pending.
    pub fn cancel(&self, channel: ChannelIndex) -> bool {
        self.deadlines
            .lock(|deadlines| deadlines.borrow_mut()[channel.as_usize()].take().is_some())
    }

    pub fn deadline(&self, channel: ChannelIndex) -> Option<Instant> {
        self.deadlines
            .lock(|deadlines| deadlines.borrow()[channel.as_usize()])
    }

    pub fn is_pending(&self, channel: ChannelIndex) -> bool {
        self.deadline(channel).is_some()
    }

    /// Earliest pending deadline across all channels.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines
            .lock(|deadlines| deadlines.borrow().iter().flatten().min().copied())
    }

    /// Clear every deadline at or before `now` and return their channels as a mask.
    pub fn take_expired(&self, now: Instant) -> u32 {
        self.deadlines.lock(|deadlines| {
            let mut deadlines = deadlines.borrow_mut();
            let mut expired = 0;
            for channel in ChannelIndex::all() {
                let slot = &mut deadlines[channel.as_usize()];
                if slot.is_some_and(|deadline| deadline <= now) {
                    *slot = None;
                    expired |= channel.mask();
                }
            }
            expired
        })
    }

    /// Resolves once a deadline has been armed since the last call.
    pub async fn wait_rearmed(&self) {
        self.rearmed.wait().await;
    }
}

impl Default for LatchSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSync {
    /// Release every channel whose latch delay has elapsed by `now`.
    pub fn release_expired(&self, now: Instant) -> u32 {
        let expired = self.latch().take_expired(now);
        for channel in ChannelIndex::iter_mask(expired) {
            self.gate(channel).release();
        }
        expired
    }
}

#[cfg(feature = "rp2040")]
#[embassy_executor::task]
pub async fn latch_task(sync: &'static ChannelSync) -> ! {
    use defmt::{info, trace};
    use embassy_futures::select::select;
    use embassy_time::Timer;

    info!("Latch timer task started ({} us)", LATCH_DELAY_US);

    loop {
        match sync.latch().next_deadline() {
            Some(deadline) => {
                select(sync.latch().wait_rearmed(), Timer::at(deadline)).await;
            }
            None => sync.latch().wait_rearmed().await,
        }

        let released = sync.release_expired(Instant::now());
        if released != 0 {
            trace!("Latched channels {=u32:b}", released);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: u8) -> ChannelIndex {
        ChannelIndex::new(index).unwrap()
    }

    fn at(micros: u64) -> Instant {
        Instant::from_micros(micros)
    }

    #[test]
    fn deadline_is_latch_delay_after_arming() {
        let latch = LatchSchedule::new();
        assert!(!latch.arm(ch(3), at(1_000)));
        assert_eq!(latch.deadline(ch(3)), Some(at(1_320)));

        assert_eq!(latch.take_expired(at(1_319)), 0);
        assert_eq!(latch.take_expired(at(1_320)), ch(3).mask());
        assert!(!latch.is_pending(ch(3)));
    }

    #[test]
    fn rearming_replaces_the_pending_deadline() {
        let latch = LatchSchedule::new();
        latch.arm(ch(0), at(0));
        assert!(latch.arm(ch(0), at(200)));

        assert_eq!(latch.take_expired(at(320)), 0);
        assert_eq!(latch.take_expired(at(520)), ch(0).mask());
    }

    #[test]
    fn next_deadline_is_the_earliest() {
        let latch = LatchSchedule::new();
        assert_eq!(latch.next_deadline(), None);
        latch.arm(ch(6), at(500));
        latch.arm(ch(1), at(100));
        assert_eq!(latch.next_deadline(), Some(at(420)));

        assert!(latch.cancel(ch(1)));
        assert!(!latch.cancel(ch(1)));
        assert_eq!(latch.next_deadline(), Some(at(820)));
    }

    #[test]
    fn release_expired_opens_the_gate() {
        let sync = ChannelSync::new();
        sync.latch().arm(ch(2), at(10));

        assert_eq!(sync.release_expired(at(329)), 0);
        assert!(!sync.gate(ch(2)).is_available());

        assert_eq!(sync.release_expired(at(330)), ch(2).mask());
        assert!(sync.gate(ch(2)).is_available());
        assert_eq!(sync.gate(ch(2)).latched_frames(), 1);
    }
}
