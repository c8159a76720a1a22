//! Cross-context channel state
//!
//! Everything here is touched from more than one execution context: the
//! stream loop (thread mode), the DMA completion interrupt and the latch
//! timer task. Only signals, atomics and critical-section mutexes live here;
//! bindings and frame buffers stay with the registry.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use crate::config::NUM_CHANNELS;
use crate::latch::LatchSchedule;
use crate::types::{ChannelIndex, StreamPhase};

/// Binary gate guarding one channel's frame buffer.
///
/// Taken by frame ingest before the buffer is written, given back when the
/// latch delay after the resulting transfer has elapsed.
pub struct ChannelGate {
    ready: Signal<CriticalSectionRawMutex, ()>,
    phase: AtomicU8,
    latched_frames: AtomicU32,
}

impl ChannelGate {
    pub const fn new() -> Self {
        Self {
            ready: Signal::new(),
            phase: AtomicU8::new(StreamPhase::Idle as u8),
            latched_frames: AtomicU32::new(0),
        }
    }

    /// Back to `Idle` with the gate available. Used when a channel is
    /// (re)configured.
    pub fn reset(&self) {
        self.set_phase(StreamPhase::Idle);
        self.ready.signal(());
    }

    /// Wait until the buffer may be written, and take the gate.
    pub async fn acquire(&self) {
        self.ready.wait().await;
    }

    pub fn try_acquire(&self) -> bool {
        self.ready.try_take().is_some()
    }

    pub fn is_available(&self) -> bool {
        self.ready.signaled()
    }

    /// Latch delay elapsed: the strip has shown the frame.
    pub fn release(&self) {
        self.set_phase(StreamPhase::Idle);
        self.latched_frames.fetch_add(1, Ordering::Relaxed);
        self.ready.signal(());
    }

    pub fn phase(&self) -> StreamPhase {
        StreamPhase::from_raw(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: StreamPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Frames shown since boot.
    pub fn latched_frames(&self) -> u32 {
        self.latched_frames.load(Ordering::Relaxed)
    }
}

impl Default for ChannelGate {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the registry and the interrupt-side handlers.
pub struct ChannelSync {
    gates: [ChannelGate; NUM_CHANNELS],
    configured: AtomicU32,
    latch: LatchSchedule,
    rejected_frames: AtomicU32,
    cancelled_latches: AtomicU32,
}

impl ChannelSync {
    pub const fn new() -> Self {
        Self {
            gates: [const { ChannelGate::new() }; NUM_CHANNELS],
            configured: AtomicU32::new(0),
            latch: LatchSchedule::new(),
            rejected_frames: AtomicU32::new(0),
            cancelled_latches: AtomicU32::new(0),
        }
    }

    pub fn gate(&self, channel: ChannelIndex) -> &ChannelGate {
        &self.gates[channel.as_usize()]
    }

    pub fn latch(&self) -> &LatchSchedule {
        &self.latch
    }

    /// Channels whose completions are acted upon.
    pub fn configured_mask(&self) -> u32 {
        self.configured.load(Ordering::Acquire)
    }

    pub fn is_configured(&self, channel: ChannelIndex) -> bool {
        self.configured_mask() & channel.mask() != 0
    }

    pub(crate) fn mark_configured(&self, channel: ChannelIndex) {
        self.configured.fetch_or(channel.mask(), Ordering::AcqRel);
    }

    pub(crate) fn mark_unconfigured(&self, channel: ChannelIndex) {
        self.configured.fetch_and(!channel.mask(), Ordering::AcqRel);
    }

    pub fn note_rejected_frame(&self) {
        self.rejected_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_frames(&self) -> u32 {
        self.rejected_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn note_cancelled_latch(&self) {
        self.cancelled_latches.fetch_add(1, Ordering::Relaxed);
    }

    /// Latch delays restarted because a completion arrived while one was
    /// still pending.
    pub fn cancelled_latches(&self) -> u32 {
        self.cancelled_latches.load(Ordering::Relaxed)
    }
}

impl Default for ChannelSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::{block_on, poll_once};
    use core::pin::pin;
    use core::task::Poll;

    fn ch(index: u8) -> ChannelIndex {
        ChannelIndex::new(index).unwrap()
    }

    #[test]
    fn gate_is_closed_until_reset() {
        let gate = ChannelGate::new();
        assert!(!gate.is_available());
        assert!(!gate.try_acquire());

        gate.reset();
        assert!(gate.is_available());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn acquire_waits_for_release() {
        let gate = ChannelGate::new();
        gate.reset();
        block_on(gate.acquire());
        gate.set_phase(StreamPhase::Transferring);

        let mut waiting = pin!(gate.acquire());
        assert_eq!(poll_once(waiting.as_mut()), Poll::Pending);

        gate.release();
        assert_eq!(gate.phase(), StreamPhase::Idle);
        assert_eq!(gate.latched_frames(), 1);
        assert_eq!(poll_once(waiting.as_mut()), Poll::Ready(()));
    }

    #[test]
    fn configured_mask_tracks_channels() {
        let sync = ChannelSync::new();
        sync.mark_configured(ch(2));
        sync.mark_configured(ch(7));
        assert_eq!(sync.configured_mask(), 0b1000_0100);

        sync.mark_unconfigured(ch(2));
        assert!(!sync.is_configured(ch(2)));
        assert!(sync.is_configured(ch(7)));
    }
}
