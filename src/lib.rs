//! PixelPusher - USB-controlled WS2812 strip driver for RP2040
//!
//! Drives up to eight LED strips from one Raspberry Pi Pico using the
//! Embassy async framework.
//!
//! ## Protocol
//! - **Configure**: vendor control request `0x01` with `[channel, format]`
//!   (`0x01` RGB, `0x02` RGBW), optionally followed by the strip length
//! - **Stream**: bulk OUT transfers of `[channel, pixel bytes...]`
//!
//! ## Architecture
//! - **Registry**: owns channel state, frame buffers and hardware bindings
//! - **PIO + DMA**: one state machine and one DMA channel per configured output
//! - **Interrupts**: DMA completions start a per-channel latch delay; the
//!   channel accepts its next frame once it expires
//! - **Host builds**: everything but the RP2040 glue builds and tests on the
//!   host with `--no-default-features --features host`

#![cfg_attr(not(any(test, feature = "host")), no_std)]

pub mod assembler;
pub mod binder;
pub mod channel;
pub mod channels;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod latch;
pub mod registry;
pub mod types;
pub mod waveform;

#[cfg(any(test, feature = "host"))]
pub mod recording;

#[cfg(feature = "rp2040")]
pub mod hardware;
#[cfg(feature = "rp2040")]
pub mod supervisor;
#[cfg(feature = "rp2040")]
pub mod usb;

pub use error::{ConfigError, Error, IngestError, Result};

// USB and PIO interrupt bindings
#[cfg(feature = "rp2040")]
embassy_rp::bind_interrupts!(pub struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<embassy_rp::peripherals::USB>;
    PIO0_IRQ_0 => embassy_rp::pio::InterruptHandler<embassy_rp::peripherals::PIO0>;
    PIO1_IRQ_0 => embassy_rp::pio::InterruptHandler<embassy_rp::peripherals::PIO1>;
});
