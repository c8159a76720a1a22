//! Inter-task communication channels
//!
//! Statics shared between the USB handlers, the stream loop, the latch timer
//! task and the DMA completion interrupt.

use crate::gate::ChannelSync;

/// Gates, configured mask and latch deadlines for all output channels.
pub static CHANNEL_SYNC: ChannelSync = ChannelSync::new();

/// Acknowledged configuration requests from the control handler to the stream loop
#[cfg(feature = "rp2040")]
pub static CONFIG_COMMANDS: embassy_sync::channel::Channel<
    embassy_sync::blocking_mutex::raw::ThreadModeRawMutex,
    crate::types::ChannelConfig,
    { crate::config::CONFIG_QUEUE_DEPTH },
> = embassy_sync::channel::Channel::new();
