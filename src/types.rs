//! Common types and data structures used across the PixelPusher application
//!
//! This module contains the small value types that flow between the USB
//! handlers, the channel registry and the interrupt-side bookkeeping.

use crate::config::{GPIO_PIN_OFFSET, NUM_CHANNELS};

/// Byte layout of one pixel on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PixelFormat {
    /// 3 bytes per pixel
    Rgb,
    /// 4 bytes per pixel
    Rgbw,
}

impl PixelFormat {
    pub const WIRE_RGB: u8 = 0x01;
    pub const WIRE_RGBW: u8 = 0x02;

    /// Decode the format byte of a configuration request. `0x00` (unset) and
    /// anything unknown is rejected.
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            Self::WIRE_RGB => Some(Self::Rgb),
            Self::WIRE_RGBW => Some(Self::Rgbw),
            _ => None,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgbw => 4,
        }
    }
}

/// Index of an output channel, always below [`NUM_CHANNELS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < NUM_CHANNELS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Every channel, lowest first.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_CHANNELS as u8).map(Self)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Bit for this channel in completion and configuration masks.
    pub const fn mask(self) -> u32 {
        1 << self.0
    }

    /// GPIO driven by this channel.
    pub const fn gpio_pin(self) -> u8 {
        self.0 + GPIO_PIN_OFFSET
    }

    /// Channels whose bit is set in `mask`, lowest first.
    pub fn iter_mask(mask: u32) -> impl Iterator<Item = Self> {
        Self::all().filter(move |channel| mask & channel.mask() != 0)
    }
}

/// A validated channel configuration, as staged by the vendor control request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    pub channel: ChannelIndex,
    pub format: PixelFormat,
    /// Strip length announced by the host. Informational only.
    pub pixel_count: Option<u16>,
}

impl ChannelConfig {
    pub const fn new(channel: ChannelIndex, format: PixelFormat) -> Self {
        Self {
            channel,
            format,
            pixel_count: None,
        }
    }

    pub const fn with_pixel_count(mut self, pixel_count: u16) -> Self {
        self.pixel_count = Some(pixel_count);
        self
    }

    /// Frame length matching the announced strip, if the host sent one.
    pub fn expected_frame_len(&self) -> Option<usize> {
        self.pixel_count
            .map(|pixels| usize::from(pixels) * self.format.bytes_per_pixel())
    }
}

/// Where a configured channel is in its stream cycle.
///
/// `Idle -> Transferring -> LatchPending -> Idle`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StreamPhase {
    Idle = 0,
    Transferring = 1,
    LatchPending = 2,
}

impl StreamPhase {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Transferring,
            2 => Self::LatchPending,
            _ => Self::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_rejects_unset_and_unknown() {
        assert_eq!(PixelFormat::from_wire(0x00), None);
        assert_eq!(PixelFormat::from_wire(0x03), None);
        assert_eq!(PixelFormat::from_wire(0x02), Some(PixelFormat::Rgbw));
        assert_eq!(PixelFormat::Rgb.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgbw.bytes_per_pixel(), 4);
    }

    #[test]
    fn channel_index_maps_to_pins_from_gpio3() {
        assert_eq!(ChannelIndex::new(0).map(ChannelIndex::gpio_pin), Some(3));
        assert_eq!(ChannelIndex::new(7).map(ChannelIndex::gpio_pin), Some(10));
        assert!(ChannelIndex::new(8).is_none());
    }

    #[test]
    fn iter_mask_visits_set_bits_in_order() {
        let visited: Vec<u8> = ChannelIndex::iter_mask(0b1010_0101 | 1 << 12)
            .map(ChannelIndex::get)
            .collect();
        assert_eq!(visited, [0u8, 2, 5, 7]);
    }

    #[test]
    fn expected_frame_len_follows_format() {
        let channel = ChannelIndex::new(1).unwrap();
        let config = ChannelConfig::new(channel, PixelFormat::Rgbw).with_pixel_count(30);
        assert_eq!(config.expected_frame_len(), Some(120));
        assert_eq!(ChannelConfig::new(channel, PixelFormat::Rgb).expected_frame_len(), None);
    }
}
