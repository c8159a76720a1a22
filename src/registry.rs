//! Channel registry
//!
//! Owns the eight channel records and every lifecycle transition:
//! configuration, reconfiguration and frame ingest. Interrupt-side code never
//! sees the registry; it works on the shared [`ChannelSync`] only.
//!
//! The registry must stay at a fixed address (a `StaticCell` on target) while
//! transfers are in flight, since the hardware reads frames straight out of
//! its buffers.

use crate::binder::{GeneratorGuard, ResourceBinder};
use crate::channel::{Channel, ChannelState};
use crate::config::{MAX_PAYLOAD_LEN, NUM_CHANNELS};
use crate::error::{ConfigError, IngestError};
use crate::gate::ChannelSync;
use crate::types::{ChannelConfig, ChannelIndex, PixelFormat, StreamPhase};

pub struct ChannelRegistry<'a, B: ResourceBinder> {
    binder: B,
    channels: [Channel<B::Generator, B::Mover>; NUM_CHANNELS],
    sync: &'a ChannelSync,
    irq_enabled: bool,
}

impl<'a, B: ResourceBinder> ChannelRegistry<'a, B> {
    pub fn new(binder: B, sync: &'a ChannelSync) -> Self {
        Self {
            binder,
            channels: core::array::from_fn(|_| Channel::new()),
            sync,
            irq_enabled: false,
        }
    }

    pub fn binder(&self) -> &B {
        &self.binder
    }

    /// Direct access to the binder. Claims made through it bypass the registry.
    pub fn binder_mut(&mut self) -> &mut B {
        &mut self.binder
    }

    pub fn sync(&self) -> &'a ChannelSync {
        self.sync
    }

    pub fn channel(&self, channel: ChannelIndex) -> &Channel<B::Generator, B::Mover> {
        &self.channels[channel.as_usize()]
    }

    // ===================================================================
    // Configuration
    // ===================================================================

    /// Configure channel `index` for the wire-encoded pixel `format`.
    ///
    /// Index and format are checked before anything changes. A configured
    /// channel is torn down first, so its hardware is free for the new claim.
    pub fn configure(&mut self, index: u8, format: u8) -> Result<(), ConfigError> {
        let channel = ChannelIndex::new(index).ok_or(ConfigError::InvalidIndex(index))?;
        let format = PixelFormat::from_wire(format).ok_or(ConfigError::InvalidFormat(format))?;
        self.apply(ChannelConfig::new(channel, format))
    }

    /// Apply an already validated configuration.
    pub fn apply(&mut self, config: ChannelConfig) -> Result<(), ConfigError> {
        let channel = config.channel;
        if self.deconfigure(channel) {
            #[cfg(feature = "defmt")]
            defmt::debug!("Channel {}: released for reconfiguration", channel.get());
        }

        let claimed = GeneratorGuard::claim(&mut self.binder, channel, config.format)
            .and_then(|guard| guard.bind_transfer(channel));
        let bindings = match claimed {
            Ok(bindings) => bindings,
            Err(err) => {
                #[cfg(feature = "defmt")]
                defmt::error!("Channel {}: claim failed: {}", channel.get(), err);
                return Err(err);
            }
        };

        self.channels[channel.as_usize()].state = ChannelState::Configured { config, bindings };
        self.sync.gate(channel).reset();
        self.sync.mark_configured(channel);

        if !self.irq_enabled {
            self.binder.enable_completion_irq();
            self.irq_enabled = true;
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Channel {}: {} on GPIO{}",
            channel.get(),
            config.format,
            channel.gpio_pin()
        );
        Ok(())
    }

    /// Return a channel to `Unconfigured`, quiescing anything in flight.
    /// Returns `false` if it was not configured.
    pub fn deconfigure(&mut self, channel: ChannelIndex) -> bool {
        let Some(bindings) = self.channels[channel.as_usize()].take_bindings() else {
            return false;
        };

        self.sync.mark_unconfigured(channel);
        if self.sync.latch().cancel(channel) {
            #[cfg(feature = "defmt")]
            defmt::debug!("Channel {}: pending latch dropped", channel.get());
        }
        bindings.release(&mut self.binder);
        self.sync.gate(channel).reset();
        true
    }

    // ===================================================================
    // Frame Ingest
    // ===================================================================

    /// Queue the frame in `payload` (`[channel, bytes...]`) for output.
    ///
    /// Waits while the channel's previous frame is still being sent or
    /// latched. Returns the number of frame bytes handed to the hardware.
    pub async fn ingest(&mut self, payload: &[u8]) -> Result<usize, IngestError> {
        let (channel, frame) = self
            .check_payload(payload)
            .inspect_err(|_| self.sync.note_rejected_frame())?;

        let gate = self.sync.gate(channel);
        gate.acquire().await;

        let slot = &mut self.channels[channel.as_usize()];
        let ChannelState::Configured { config, bindings } = &mut slot.state else {
            gate.reset();
            return Err(IngestError::ChannelNotConfigured(channel.get()));
        };

        if let Some(expected) = config.expected_frame_len() {
            if expected != frame.len() {
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "Channel {}: {} bytes for a {} byte strip",
                    channel.get(),
                    frame.len(),
                    expected
                );
            }
        }

        let len = frame.len();
        slot.buffer[..len].copy_from_slice(frame);
        gate.set_phase(StreamPhase::Transferring);

        // SAFETY: the gate stays taken until the latch after this transfer has
        // expired or the channel is deconfigured (which aborts the transfer),
        // so the buffer is neither written nor released while it is read.
        unsafe {
            self.binder
                .start_transfer(bindings.mover_mut(), &slot.buffer[..len]);
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("Channel {}: {} bytes queued", channel.get(), len);
        Ok(len)
    }

    /// Validate a payload without touching any channel.
    pub fn check_payload<'p>(
        &self,
        payload: &'p [u8],
    ) -> Result<(ChannelIndex, &'p [u8]), IngestError> {
        let (&index, frame) = payload.split_first().ok_or(IngestError::EmptyPayload)?;
        let channel = ChannelIndex::new(index).ok_or(IngestError::InvalidChannel(index))?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(IngestError::PayloadTooLarge { len: payload.len() });
        }
        if !self.channels[channel.as_usize()].is_configured() {
            return Err(IngestError::ChannelNotConfigured(index));
        }
        // A zero-length DMA transfer may never raise its completion, which
        // would leave the gate taken.
        if frame.is_empty() {
            return Err(IngestError::EmptyFrame(index));
        }
        Ok((channel, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_FRAME_LEN, PIXEL_BUFFER_SIZE};
    use crate::recording::{BinderEvent, RecordingBinder};
    use embassy_futures::block_on;

    fn ch(index: u8) -> ChannelIndex {
        ChannelIndex::new(index).unwrap()
    }

    #[test]
    fn configure_rejects_bad_index_without_changes() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);

        assert_eq!(registry.configure(8, 0x01), Err(ConfigError::InvalidIndex(8)));
        assert_eq!(registry.configure(255, 0x02), Err(ConfigError::InvalidIndex(255)));
        assert!(registry.binder().events().is_empty());
        assert_eq!(sync.configured_mask(), 0);
    }

    #[test]
    fn configure_rejects_bad_format_without_changes() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);
        registry.configure(3, 0x01).unwrap();
        let events_before = registry.binder().events().len();

        assert_eq!(registry.configure(3, 0x00), Err(ConfigError::InvalidFormat(0x00)));
        assert_eq!(registry.configure(3, 0x07), Err(ConfigError::InvalidFormat(0x07)));

        assert_eq!(registry.binder().events().len(), events_before);
        assert_eq!(registry.channel(ch(3)).format(), Some(PixelFormat::Rgb));
        assert!(sync.is_configured(ch(3)));
    }

    #[test]
    fn configure_twice_keeps_a_single_claim() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);

        registry.configure(0, 0x01).unwrap();
        registry.configure(0, 0x01).unwrap();

        assert_eq!(registry.binder().live_generators(), 1);
        let irq_enables = registry
            .binder()
            .events()
            .iter()
            .filter(|event| **event == BinderEvent::EnableCompletionIrq)
            .count();
        assert_eq!(irq_enables, 1);
    }

    #[test]
    fn failed_claim_leaves_channel_unconfigured() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::with_slots(1), &sync);
        registry.configure(0, 0x01).unwrap();

        assert_eq!(
            registry.configure(1, 0x01),
            Err(ConfigError::ResourceUnavailable { channel: 1 })
        );
        assert!(!registry.channel(ch(1)).is_configured());
        assert!(!sync.is_configured(ch(1)));
        assert_eq!(registry.binder().live_generators(), 1);
    }

    #[test]
    fn ingest_checks_run_in_order() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);
        let oversized = [9u8; MAX_PAYLOAD_LEN + 1];

        assert_eq!(block_on(registry.ingest(&[])), Err(IngestError::EmptyPayload));
        assert_eq!(
            block_on(registry.ingest(&[8, 1, 2, 3])),
            Err(IngestError::InvalidChannel(8))
        );
        // Out-of-range index wins over size.
        assert_eq!(
            block_on(registry.ingest(&oversized)),
            Err(IngestError::InvalidChannel(9))
        );
        assert_eq!(
            block_on(registry.ingest(&[2, 0xFF, 0, 0])),
            Err(IngestError::ChannelNotConfigured(2))
        );

        registry.configure(2, 0x01).unwrap();
        assert_eq!(block_on(registry.ingest(&[2])), Err(IngestError::EmptyFrame(2)));
        assert!(registry.binder().transfers().is_empty());
        assert_eq!(sync.rejected_frames(), 5);
    }

    #[test]
    fn largest_frame_fits_and_one_more_byte_does_not() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);
        registry.configure(1, 0x01).unwrap();

        let mut payload = [0xA5u8; MAX_PAYLOAD_LEN + 1];
        payload[0] = 1;

        assert_eq!(
            block_on(registry.ingest(&payload)),
            Err(IngestError::PayloadTooLarge { len: MAX_PAYLOAD_LEN + 1 })
        );
        assert!(registry.channel(ch(1)).buffer().iter().all(|byte| *byte == 0));

        assert_eq!(
            block_on(registry.ingest(&payload[..MAX_PAYLOAD_LEN])),
            Ok(MAX_FRAME_LEN)
        );
        let transfer = &registry.binder().transfers()[0];
        assert_eq!(transfer.bytes.len(), MAX_FRAME_LEN);
        assert_eq!(registry.channel(ch(1)).buffer()[PIXEL_BUFFER_SIZE - 1], 0);
    }

    #[test]
    fn ingest_takes_the_gate_until_latch_expiry() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);
        registry.configure(6, 0x02).unwrap();

        assert_eq!(block_on(registry.ingest(&[6, 1, 2, 3, 4])), Ok(4));
        assert_eq!(sync.gate(ch(6)).phase(), StreamPhase::Transferring);
        assert!(!sync.gate(ch(6)).is_available());
    }

    #[test]
    fn deconfigure_drops_pending_latch_and_reopens_gate() {
        let sync = ChannelSync::new();
        let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);
        registry.configure(5, 0x01).unwrap();
        block_on(registry.ingest(&[5, 10, 20, 30])).unwrap();
        sync.on_transfer_complete(ch(5).mask(), embassy_time::Instant::from_micros(0));

        assert!(registry.deconfigure(ch(5)));
        assert!(!registry.deconfigure(ch(5)));

        assert!(!sync.latch().is_pending(ch(5)));
        assert!(sync.gate(ch(5)).is_available());
        assert_eq!(registry.binder().live_generators(), 0);
    }
}
