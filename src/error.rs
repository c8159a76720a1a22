use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Rejections of a channel (re)configuration, including malformed control transfers.
#[derive(Clone, Copy, Debug, Display, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[display("channel index {_0} out of range")]
    InvalidIndex(#[error(not(source))] u8),

    #[display("pixel format 0x{_0:02x} not supported")]
    InvalidFormat(#[error(not(source))] u8),

    #[display("no free hardware for channel {channel}")]
    ResourceUnavailable { channel: u8 },

    #[display("vendor request 0x{_0:02x} not supported")]
    UnsupportedRequest(#[error(not(source))] u8),

    #[display("configuration payload too short ({len} bytes)")]
    ShortPayload { len: usize },

    #[display("no configuration staged")]
    NothingStaged,
}

/// Rejections of an inbound frame. None of them touch the channel's buffer.
#[derive(Clone, Copy, Debug, Display, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IngestError {
    #[display("empty payload")]
    EmptyPayload,

    #[display("channel {_0} out of range")]
    InvalidChannel(#[error(not(source))] u8),

    #[display("payload of {len} bytes exceeds the frame buffer")]
    PayloadTooLarge { len: usize },

    #[display("channel {_0} is not configured")]
    ChannelNotConfigured(#[error(not(source))] u8),

    #[display("frame for channel {_0} carries no pixel data")]
    EmptyFrame(#[error(not(source))] u8),
}

/// Define a unified error type for this crate.
#[derive(Debug, Display, Error)]
pub enum Error {
    #[display("{_0}")]
    Config(ConfigError),

    #[display("{_0}")]
    Ingest(IngestError),

    // `SpawnError` does not implement `core::error::Error`.
    #[cfg(feature = "rp2040")]
    #[display("{_0:?}")]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<IngestError> for Error {
    fn from(err: IngestError) -> Self {
        Self::Ingest(err)
    }
}

#[cfg(feature = "rp2040")]
impl From<embassy_executor::SpawnError> for Error {
    fn from(err: embassy_executor::SpawnError) -> Self {
        Self::TaskSpawn(err)
    }
}
