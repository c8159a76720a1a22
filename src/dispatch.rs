//! Transfer completion dispatch
//!
//! Runs in interrupt context. Turns the DMA completion bitmask into per-channel
//! latch deadlines. Allocation-free and non-blocking.

use embassy_time::Instant;

use crate::gate::ChannelSync;
use crate::types::{ChannelIndex, StreamPhase};

impl ChannelSync {
    /// Handle the completion flags in `pending`, observed at `now`.
    ///
    /// Flags of channels that are not configured are ignored. Returns the mask
    /// of channels that were handled. Acknowledging the hardware flags is left
    /// to the caller.
    pub fn on_transfer_complete(&self, pending: u32, now: Instant) -> u32 {
        let handled = pending & self.configured_mask();
        for channel in ChannelIndex::iter_mask(handled) {
            self.gate(channel).set_phase(StreamPhase::LatchPending);
            if self.latch().arm(channel, now) {
                self.note_cancelled_latch();
            }
        }
        handled
    }
}
