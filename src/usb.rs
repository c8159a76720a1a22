//! USB vendor interface for PixelPusher
//!
//! One vendor-class interface ("WIPPv1") with a bulk OUT endpoint for frames.
//! Channel configuration arrives as a vendor control request on endpoint 0.
//!
//! embassy-usb hands `control_out` the setup packet and the complete data
//! stage together and sends the status stage from our return value. There is
//! no hook after the status stage, so setup, data and ack all run inside that
//! one call and the configuration is queued before the host sees its ACK.

use defmt::*;
use embassy_futures::join::join;
use embassy_futures::select::{select, Either};
use embassy_rp::peripherals;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Sender;
use embassy_usb::control::{OutResponse, Recipient, Request, RequestType};
use embassy_usb::driver::{Endpoint, EndpointError, EndpointOut};
use embassy_usb::types::{InterfaceNumber, StringIndex};
use embassy_usb::{Builder, Config, Handler};
use static_cell::StaticCell;

use crate::assembler::{Assembly, FrameAssembler};
use crate::channels::CONFIG_COMMANDS;
use crate::config::*;
use crate::control::VendorControl;
use crate::error::ConfigError;
use crate::hardware::Rp2040Binder;
use crate::registry::ChannelRegistry;
use crate::types::ChannelConfig;

pub type Registry = ChannelRegistry<'static, Rp2040Binder>;

// ===================================================================
// USB Configuration
// ===================================================================

fn create_usb_config() -> Config<'static> {
    let mut config = Config::new(USB_VID, USB_PID);
    config.manufacturer = Some(USB_MANUFACTURER);
    config.product = Some(USB_PRODUCT);
    config.serial_number = Some(USB_SERIAL);
    config.max_power = USB_MAX_POWER_MA;
    config.max_packet_size_0 = USB_CONTROL_PACKET_SIZE;
    config.device_class = 0x00; // Interface-defined
    config.device_sub_class = 0x00;
    config.device_protocol = 0x00;
    config.composite_with_iads = false;
    config.device_release = USB_BCD_DEVICE;
    config
}

// ===================================================================
// Vendor Request Handler
// ===================================================================

struct VendorHandler {
    control: VendorControl,
    interface: InterfaceNumber,
    interface_string: StringIndex,
    commands: Sender<'static, ThreadModeRawMutex, ChannelConfig, CONFIG_QUEUE_DEPTH>,
}

impl VendorHandler {
    fn is_ours(&self, req: &Request) -> bool {
        if req.request_type != RequestType::Vendor {
            return false;
        }
        match req.recipient {
            Recipient::Device => true,
            Recipient::Interface => req.index == u16::from(self.interface.0),
            _ => false,
        }
    }

    /// Drive all three stages of a configure request and queue the result.
    fn configure(&mut self, req: &Request, data: &[u8]) -> Result<ChannelConfig, ConfigError> {
        self.control.setup(req)?;
        self.control.data(data)?;
        let config = self.control.ack()?;
        if self.commands.try_send(config).is_err() {
            warn!("Configuration queue full, channel {} dropped", config.channel.get());
            return Err(ConfigError::ResourceUnavailable {
                channel: config.channel.get(),
            });
        }
        Ok(config)
    }
}

impl Handler for VendorHandler {
    fn configured(&mut self, configured: bool) {
        if configured {
            info!("USB configured");
        } else {
            info!("USB unconfigured");
        }
    }

    fn reset(&mut self) {
        self.control.abort();
    }

    fn control_out(&mut self, req: Request, data: &[u8]) -> Option<OutResponse> {
        if !self.is_ours(&req) {
            return None;
        }

        Some(match self.configure(&req, data) {
            Ok(config) => {
                debug!("Configure request: {}", config);
                OutResponse::Accepted
            }
            Err(err) => {
                warn!("Vendor request 0x{:02x} rejected: {}", req.request, err);
                self.control.abort();
                OutResponse::Rejected
            }
        })
    }

    fn get_string(&mut self, index: StringIndex, _lang_id: u16) -> Option<&str> {
        (index == self.interface_string).then_some(USB_INTERFACE_STRING)
    }
}

// ===================================================================
// USB Task Implementation
// ===================================================================

#[embassy_executor::task]
pub async fn usb_task(driver: Driver<'static, peripherals::USB>, registry: &'static mut Registry) {
    info!("USB task started");

    static CONFIG_DESC_BUF: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESC_BUF: StaticCell<[u8; 256]> = StaticCell::new();
    static MSOS_DESC_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static HANDLER: StaticCell<VendorHandler> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        create_usb_config(),
        CONFIG_DESC_BUF.init([0; 256]),
        BOS_DESC_BUF.init([0; 256]),
        MSOS_DESC_BUF.init([0; 64]),
        CONTROL_BUF.init([0; 64]),
    );

    let interface_string = builder.string();
    let mut function = builder.function(USB_VENDOR_CLASS, 0, 0);
    let mut interface = function.interface();
    let interface_number = interface.interface_number();
    let mut alt = interface.alt_setting(USB_VENDOR_CLASS, 0, 0, Some(interface_string));
    let mut read_ep = alt.endpoint_bulk_out(None, USB_BULK_PACKET_SIZE);
    drop(function);

    let handler = HANDLER.init(VendorHandler {
        control: VendorControl::new(),
        interface: interface_number,
        interface_string,
        commands: CONFIG_COMMANDS.sender(),
    });
    builder.handler(handler);

    let mut usb = builder.build();
    let usb_fut = usb.run();

    let stream_fut = async {
        let commands = CONFIG_COMMANDS.receiver();
        let mut assembler = FrameAssembler::new(usize::from(USB_BULK_PACKET_SIZE));
        let mut packet = [0u8; USB_BULK_PACKET_SIZE as usize];

        loop {
            read_ep.wait_enabled().await;
            info!("Bulk OUT endpoint enabled");
            assembler.reset();

            loop {
                match select(commands.receive(), read_ep.read(&mut packet)).await {
                    Either::First(config) => {
                        if let Err(err) = registry.apply(config) {
                            warn!("Channel {} not configured: {}", config.channel.get(), err);
                        }
                    }
                    Either::Second(Ok(len)) => match assembler.push(&packet[..len]) {
                        Assembly::Pending => {}
                        Assembly::Complete => {
                            if let Err(err) = registry.ingest(assembler.payload()).await {
                                warn!("Frame dropped: {}", err);
                            }
                        }
                        Assembly::Overflow { channel, len } => {
                            registry.sync().note_rejected_frame();
                            warn!("Frame for channel {} dropped: {} bytes", channel, len);
                        }
                    },
                    Either::Second(Err(EndpointError::BufferOverflow)) => {
                        warn!("Bulk packet larger than {} bytes", USB_BULK_PACKET_SIZE);
                    }
                    Either::Second(Err(EndpointError::Disabled)) => {
                        info!("Bulk OUT endpoint disabled");
                        break;
                    }
                }
            }
        }
    };

    join(usb_fut, stream_fut).await;
}
