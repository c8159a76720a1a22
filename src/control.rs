//! Vendor control transfer staging
//!
//! The configuration request arrives as a control OUT transfer: setup packet,
//! data stage, status stage. The payload is checked and staged as soon as the
//! data stage is seen, so malformed requests can be stalled; it is handed to
//! the registry only once the transfer is acknowledged. The data stage may be
//! driven again before that (the last payload wins), and an aborted transfer
//! discards whatever was staged.
//!
//! On the device all three stages are driven back to back from one
//! `control_out` call. Repeated data stages and aborts come from bus resets
//! and from callers that drive the stages themselves.
//!
//! Data stage layout: `[index, format]`, optionally followed by the strip
//! length in pixels as a little-endian `u16`.

use embassy_usb::control::{Request, RequestType};

use crate::config::{CONFIGURE_PAYLOAD_MIN_LEN, VENDOR_REQUEST_CONFIGURE_CHANNEL};
use crate::error::ConfigError;
use crate::types::{ChannelConfig, ChannelIndex, PixelFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlStage {
    Idle,
    Setup,
    Data,
}

pub struct VendorControl {
    stage: ControlStage,
    staged: Option<ChannelConfig>,
}

impl VendorControl {
    pub const fn new() -> Self {
        Self {
            stage: ControlStage::Idle,
            staged: None,
        }
    }

    pub fn stage(&self) -> ControlStage {
        self.stage
    }

    pub fn staged(&self) -> Option<&ChannelConfig> {
        self.staged.as_ref()
    }

    /// Setup stage. Anything but a vendor configure request is refused.
    pub fn setup(&mut self, request: &Request) -> Result<(), ConfigError> {
        self.abort();
        if request.request_type != RequestType::Vendor
            || request.request != VENDOR_REQUEST_CONFIGURE_CHANNEL
        {
            return Err(ConfigError::UnsupportedRequest(request.request));
        }
        let len = usize::from(request.length);
        if len < CONFIGURE_PAYLOAD_MIN_LEN {
            return Err(ConfigError::ShortPayload { len });
        }
        self.stage = ControlStage::Setup;
        Ok(())
    }

    /// Data stage. Decodes and stages the configuration.
    pub fn data(&mut self, data: &[u8]) -> Result<&ChannelConfig, ConfigError> {
        if self.stage == ControlStage::Idle {
            return Err(ConfigError::NothingStaged);
        }
        let config = match decode_payload(data) {
            Ok(config) => config,
            Err(err) => {
                self.abort();
                return Err(err);
            }
        };
        self.stage = ControlStage::Data;
        Ok(&*self.staged.insert(config))
    }

    /// Status stage acknowledged: hand the staged configuration over.
    pub fn ack(&mut self) -> Result<ChannelConfig, ConfigError> {
        let staged = self.staged.take();
        self.stage = ControlStage::Idle;
        staged.ok_or(ConfigError::NothingStaged)
    }

    pub fn abort(&mut self) {
        self.stage = ControlStage::Idle;
        self.staged = None;
    }
}

impl Default for VendorControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the configure request's data stage.
pub fn decode_payload(data: &[u8]) -> Result<ChannelConfig, ConfigError> {
    let [index, format, rest @ ..] = data else {
        return Err(ConfigError::ShortPayload { len: data.len() });
    };
    let channel = ChannelIndex::new(*index).ok_or(ConfigError::InvalidIndex(*index))?;
    let format = PixelFormat::from_wire(*format).ok_or(ConfigError::InvalidFormat(*format))?;

    let config = ChannelConfig::new(channel, format);
    match rest {
        [lo, hi, ..] => Ok(config.with_pixel_count(u16::from_le_bytes([*lo, *hi]))),
        _ => Ok(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: u8) -> ChannelIndex {
        ChannelIndex::new(index).unwrap()
    }

    #[test]
    fn payload_with_pixel_count() {
        assert_eq!(
            decode_payload(&[4, 0x02, 0x2C, 0x01]),
            Ok(ChannelConfig::new(ch(4), PixelFormat::Rgbw).with_pixel_count(300))
        );
    }

    #[test]
    fn payload_without_pixel_count() {
        assert_eq!(
            decode_payload(&[0, 0x01]),
            Ok(ChannelConfig::new(ch(0), PixelFormat::Rgb))
        );
        // A lone trailing byte is not a pixel count.
        assert_eq!(
            decode_payload(&[0, 0x01, 0x10]),
            Ok(ChannelConfig::new(ch(0), PixelFormat::Rgb))
        );
    }

    #[test]
    fn payload_errors() {
        assert_eq!(decode_payload(&[3]), Err(ConfigError::ShortPayload { len: 1 }));
        assert_eq!(decode_payload(&[8, 0x01]), Err(ConfigError::InvalidIndex(8)));
        assert_eq!(decode_payload(&[1, 0x00]), Err(ConfigError::InvalidFormat(0)));
    }

    #[test]
    fn data_before_setup_is_refused() {
        let mut control = VendorControl::new();
        assert_eq!(control.data(&[1, 0x01]).err(), Some(ConfigError::NothingStaged));
        assert_eq!(control.ack(), Err(ConfigError::NothingStaged));
    }
}
