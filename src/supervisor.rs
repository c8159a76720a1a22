//! Application supervisor and monitoring
//!
//! Startup banner and a periodic status line built from the shared channel
//! counters.

use defmt::*;
use embassy_time::{Duration, Timer};

use crate::config::{
    GPIO_PIN_OFFSET, LATCH_DELAY_US, MAX_FRAME_LEN, NUM_CHANNELS, STATUS_INTERVAL_SECS,
    SUPERVISOR_TICK_SECS, USB_INTERFACE_STRING, USB_PID, USB_VID, WS2812_BIT_RATE_HZ,
};
use crate::gate::ChannelSync;
use crate::types::ChannelIndex;

/// Application supervisor responsible for monitoring
pub struct AppSupervisor {
    sync: &'static ChannelSync,
    uptime_seconds: u32,
    last_heartbeat: u32,
}

impl AppSupervisor {
    pub fn new(sync: &'static ChannelSync) -> Self {
        Self {
            sync,
            uptime_seconds: 0,
            last_heartbeat: 0,
        }
    }

    /// Print application startup banner
    pub fn print_startup_banner(&self) {
        info!("========================================");
        info!("PixelPusher v{}", env!("CARGO_PKG_VERSION"));
        info!("USB WS2812 strip driver");
        info!("========================================");
        info!("Hardware: RP2040 (Raspberry Pi Pico)");
        info!("USB: VID=0x{:04X} PID=0x{:04X} interface {}", USB_VID, USB_PID, USB_INTERFACE_STRING);
        info!(
            "Channels: {} on GPIO{}..GPIO{}",
            NUM_CHANNELS,
            GPIO_PIN_OFFSET,
            GPIO_PIN_OFFSET as usize + NUM_CHANNELS - 1
        );
        info!(
            "Timing: {} Hz, {} us latch, {} byte frames max",
            WS2812_BIT_RATE_HZ, LATCH_DELAY_US, MAX_FRAME_LEN
        );
        info!("========================================");
    }

    pub fn print_init_success(&self) {
        info!("PixelPusher initialized successfully");
        info!("Waiting for USB connection...");
    }

    /// Run the main supervisor loop
    pub async fn run(&mut self) -> ! {
        info!("Application supervisor started");

        loop {
            Timer::after(Duration::from_secs(SUPERVISOR_TICK_SECS)).await;
            self.uptime_seconds += SUPERVISOR_TICK_SECS as u32;

            if self.uptime_seconds - self.last_heartbeat >= STATUS_INTERVAL_SECS {
                self.print_status();
                self.last_heartbeat = self.uptime_seconds;
            }
        }
    }

    fn print_status(&self) {
        let minutes = self.uptime_seconds / 60;
        let hours = minutes / 60;
        let remaining_minutes = minutes % 60;

        if hours > 0 {
            info!("Status: Uptime {}h{}m", hours, remaining_minutes);
        } else {
            info!("Status: Uptime {}m", minutes);
        }

        let configured = self.sync.configured_mask();
        info!(
            "Status: configured {=u32:b}, rejected {}, latch restarts {}",
            configured,
            self.sync.rejected_frames(),
            self.sync.cancelled_latches()
        );
        for channel in ChannelIndex::iter_mask(configured) {
            let gate = self.sync.gate(channel);
            info!(
                "  channel {}: {} frames, {}",
                channel.get(),
                gate.latched_frames(),
                gate.phase()
            );
        }
    }
}
