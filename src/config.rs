//! Hardware configuration for PixelPusher
//! RP2040-based eight channel WS2812 strip driver

// ===================================================================
// USB Configuration - host tooling matches on these
// ===================================================================

pub const USB_VID: u16 = 0xCAFE;
pub const USB_PID: u16 = 0x4001;
pub const USB_MANUFACTURER: &str = "Raspberry Pi";
pub const USB_PRODUCT: &str = "Pico (2)";
pub const USB_SERIAL: &str = "PIXELPUSHER1";
pub const USB_BCD_DEVICE: u16 = 0x0100;
pub const USB_MAX_POWER_MA: u16 = 100;

/// Host software locates the streaming interface by this string.
pub const USB_INTERFACE_STRING: &str = "WIPPv1";

pub const USB_VENDOR_CLASS: u8 = 0xFF;
pub const USB_CONTROL_PACKET_SIZE: u8 = 64;
pub const USB_BULK_PACKET_SIZE: u16 = 64;

// ===================================================================
// Vendor Control Requests
// ===================================================================

/// `bRequest` that (re)configures one output channel.
pub const VENDOR_REQUEST_CONFIGURE_CHANNEL: u8 = 0x01;

/// Data stage: channel index, pixel format.
pub const CONFIGURE_PAYLOAD_MIN_LEN: usize = 2;

// ===================================================================
// Channel Layout
// ===================================================================

pub const NUM_CHANNELS: usize = 8;

/// Channel `i` drives GPIO `i + GPIO_PIN_OFFSET`.
pub const GPIO_PIN_OFFSET: u8 = 3;

/// Per-channel frame buffer.
pub const PIXEL_BUFFER_SIZE: usize = 4096;
/// Largest bulk payload accepted, channel prefix included.
pub const MAX_PAYLOAD_LEN: usize = PIXEL_BUFFER_SIZE;
/// Largest frame, in bytes, that fits behind the channel prefix.
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN - 1;

// ===================================================================
// WS2812 Timing
// ===================================================================

pub const WS2812_BIT_RATE_HZ: u32 = 800_000;

// Cycle split of one bit inside the PIO program
pub const WS2812_T1: u8 = 2; // start bit, always high
pub const WS2812_T2: u8 = 5; // data bit
pub const WS2812_T3: u8 = 3; // stop bit, always low
pub const WS2812_CYCLES_PER_BIT: u32 = (WS2812_T1 + WS2812_T2 + WS2812_T3) as u32;

/// Line must stay idle this long after a frame before the strip latches.
pub const LATCH_DELAY_US: u64 = 320;

// ===================================================================
// RP2040 Resources
// ===================================================================

pub const PIO_BLOCKS: usize = 2;
pub const STATE_MACHINES_PER_PIO: usize = 4;

/// DMA_IRQ_1 carries frame completions; embassy-rp owns DMA_IRQ_0.
pub const COMPLETION_IRQ_INDEX: usize = 1;

// ===================================================================
// Task Configuration
// ===================================================================

/// Pending configuration commands between the USB handler and the stream loop.
pub const CONFIG_QUEUE_DEPTH: usize = 4;

pub const SUPERVISOR_TICK_SECS: u64 = 10;
pub const STATUS_INTERVAL_SECS: u32 = 60;
