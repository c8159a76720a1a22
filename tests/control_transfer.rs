//! Vendor configure requests, from setup packet to registry.

use embassy_usb::control::Request;
use pixelpusher::control::{ControlStage, VendorControl};
use pixelpusher::gate::ChannelSync;
use pixelpusher::recording::RecordingBinder;
use pixelpusher::registry::ChannelRegistry;
use pixelpusher::types::{ChannelConfig, ChannelIndex, PixelFormat};
use pixelpusher::ConfigError;

const VENDOR_INTERFACE_OUT: u8 = 0x41;
const CLASS_INTERFACE_OUT: u8 = 0x21;

fn setup_packet(request_type: u8, request: u8, length: u16) -> Request {
    let [len_lo, len_hi] = length.to_le_bytes();
    Request::parse(&[request_type, request, 0, 0, 0, 0, len_lo, len_hi])
}

fn ch(index: u8) -> ChannelIndex {
    ChannelIndex::new(index).unwrap()
}

#[test]
fn configure_request_is_staged_then_handed_over_on_ack() {
    let mut control = VendorControl::new();

    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 4)).unwrap();
    assert_eq!(control.stage(), ControlStage::Setup);

    let staged = *control.data(&[2, 0x02, 0x2C, 0x01]).unwrap();
    assert_eq!(
        staged,
        ChannelConfig::new(ch(2), PixelFormat::Rgbw).with_pixel_count(300)
    );
    assert_eq!(control.stage(), ControlStage::Data);

    assert_eq!(control.ack(), Ok(staged));
    assert_eq!(control.stage(), ControlStage::Idle);
    assert_eq!(control.ack(), Err(ConfigError::NothingStaged));
}

#[test]
fn unknown_request_code_is_refused() {
    let mut control = VendorControl::new();
    assert_eq!(
        control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x02, 2)),
        Err(ConfigError::UnsupportedRequest(0x02))
    );
    assert_eq!(control.stage(), ControlStage::Idle);
}

#[test]
fn non_vendor_request_is_refused() {
    let mut control = VendorControl::new();
    assert_eq!(
        control.setup(&setup_packet(CLASS_INTERFACE_OUT, 0x01, 2)),
        Err(ConfigError::UnsupportedRequest(0x01))
    );
}

#[test]
fn short_data_stage_is_refused() {
    let mut control = VendorControl::new();
    assert_eq!(
        control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 1)),
        Err(ConfigError::ShortPayload { len: 1 })
    );

    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 2)).unwrap();
    assert_eq!(control.data(&[4]).err(), Some(ConfigError::ShortPayload { len: 1 }));
    assert_eq!(control.stage(), ControlStage::Idle);
}

#[test]
fn invalid_payload_is_not_staged() {
    let mut control = VendorControl::new();
    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 2)).unwrap();

    assert_eq!(control.data(&[9, 0x01]).err(), Some(ConfigError::InvalidIndex(9)));
    assert!(control.staged().is_none());
    assert_eq!(control.ack(), Err(ConfigError::NothingStaged));
}

#[test]
fn repeated_data_stage_keeps_the_last_payload() {
    let mut control = VendorControl::new();
    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 2)).unwrap();

    control.data(&[1, 0x01]).unwrap();
    control.data(&[6, 0x02]).unwrap();

    assert_eq!(control.ack(), Ok(ChannelConfig::new(ch(6), PixelFormat::Rgbw)));
}

#[test]
fn abort_discards_the_staged_payload() {
    let mut control = VendorControl::new();
    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 2)).unwrap();
    control.data(&[1, 0x01]).unwrap();

    control.abort();

    assert!(control.staged().is_none());
    assert_eq!(control.ack(), Err(ConfigError::NothingStaged));
}

#[test]
fn new_setup_replaces_an_unfinished_transfer() {
    let mut control = VendorControl::new();
    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 2)).unwrap();
    control.data(&[1, 0x01]).unwrap();

    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 2)).unwrap();
    assert!(control.staged().is_none());
}

#[test]
fn acknowledged_request_configures_the_channel() {
    let sync = ChannelSync::new();
    let mut registry = ChannelRegistry::new(RecordingBinder::new(), &sync);
    let mut control = VendorControl::new();

    control.setup(&setup_packet(VENDOR_INTERFACE_OUT, 0x01, 2)).unwrap();
    control.data(&[7, 0x01]).unwrap();
    registry.apply(control.ack().unwrap()).unwrap();

    assert_eq!(registry.channel(ch(7)).format(), Some(PixelFormat::Rgb));
    assert!(sync.is_configured(ch(7)));
    assert!(sync.gate(ch(7)).is_available());
    assert_eq!(registry.channel(ch(7)).bindings().unwrap().generator().pin, 10);
}
