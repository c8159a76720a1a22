//! Host-side [`ResourceBinder`] that records every hardware interaction.
//!
//! Generators come from a bounded slot pool so tests can observe leaks and
//! claim ordering the same way a full PIO block would surface them.

use std::vec::Vec;

use crate::binder::ResourceBinder;
use crate::config::NUM_CHANNELS;
use crate::error::ConfigError;
use crate::types::{ChannelIndex, PixelFormat};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BinderEvent {
    Claim { channel: u8, slot: usize },
    BindTransfer { channel: u8, slot: usize },
    StartTransfer { channel: u8, len: usize },
    ReleaseMover { channel: u8 },
    ReleaseGenerator { slot: usize },
    EnableCompletionIrq,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RecordedGenerator {
    pub slot: usize,
    pub pin: u8,
    pub format: PixelFormat,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RecordedMover {
    pub channel: u8,
    pub slot: usize,
}

/// Bytes handed to a mover, copied at trigger time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub channel: u8,
    pub bytes: Vec<u8>,
}

pub struct RecordingBinder {
    slots: Vec<bool>,
    // Bytes pushed through each slot since it was last stopped.
    queued: Vec<usize>,
    failing_movers: u32,
    events: Vec<BinderEvent>,
    transfers: Vec<RecordedTransfer>,
}

impl RecordingBinder {
    /// One generator slot per channel.
    pub fn new() -> Self {
        Self::with_slots(NUM_CHANNELS)
    }

    pub fn with_slots(slots: usize) -> Self {
        Self {
            slots: vec![false; slots],
            queued: vec![0; slots],
            failing_movers: 0,
            events: Vec::new(),
            transfers: Vec::new(),
        }
    }

    /// Make every later `bind_transfer` for `channel` fail.
    pub fn fail_bind_transfer(&mut self, channel: ChannelIndex) {
        self.failing_movers |= channel.mask();
    }

    pub fn events(&self) -> &[BinderEvent] {
        &self.events
    }

    pub fn transfers(&self) -> &[RecordedTransfer] {
        &self.transfers
    }

    /// Output still sitting in generator `slot`. Stopping a generator discards it.
    pub fn queued_bytes(&self, slot: usize) -> usize {
        self.queued[slot]
    }

    pub fn live_generators(&self) -> usize {
        self.slots.iter().filter(|claimed| **claimed).count()
    }

    pub fn clear_log(&mut self) {
        self.events.clear();
        self.transfers.clear();
    }
}

impl Default for RecordingBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceBinder for RecordingBinder {
    type Generator = RecordedGenerator;
    type Mover = RecordedMover;

    fn claim(
        &mut self,
        channel: ChannelIndex,
        format: PixelFormat,
    ) -> Result<Self::Generator, ConfigError> {
        let slot = self
            .slots
            .iter()
            .position(|claimed| !claimed)
            .ok_or(ConfigError::ResourceUnavailable {
                channel: channel.get(),
            })?;
        self.slots[slot] = true;
        self.events.push(BinderEvent::Claim {
            channel: channel.get(),
            slot,
        });
        Ok(RecordedGenerator {
            slot,
            pin: channel.gpio_pin(),
            format,
        })
    }

    fn bind_transfer(
        &mut self,
        channel: ChannelIndex,
        generator: &Self::Generator,
    ) -> Result<Self::Mover, ConfigError> {
        if self.failing_movers & channel.mask() != 0 {
            return Err(ConfigError::ResourceUnavailable {
                channel: channel.get(),
            });
        }
        self.events.push(BinderEvent::BindTransfer {
            channel: channel.get(),
            slot: generator.slot,
        });
        Ok(RecordedMover {
            channel: channel.get(),
            slot: generator.slot,
        })
    }

    unsafe fn start_transfer(&mut self, mover: &mut Self::Mover, frame: &[u8]) {
        self.events.push(BinderEvent::StartTransfer {
            channel: mover.channel,
            len: frame.len(),
        });
        self.queued[mover.slot] += frame.len();
        self.transfers.push(RecordedTransfer {
            channel: mover.channel,
            bytes: frame.to_vec(),
        });
    }

    fn release_mover(&mut self, mover: Self::Mover) {
        self.events.push(BinderEvent::ReleaseMover {
            channel: mover.channel,
        });
    }

    fn release_generator(&mut self, generator: Self::Generator) {
        self.slots[generator.slot] = false;
        self.queued[generator.slot] = 0;
        self.events.push(BinderEvent::ReleaseGenerator {
            slot: generator.slot,
        });
    }

    fn enable_completion_irq(&mut self) {
        self.events.push(BinderEvent::EnableCompletionIrq);
    }
}
