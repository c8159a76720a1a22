//! Per-channel record owned by the registry

use crate::binder::ChannelBindings;
use crate::config::PIXEL_BUFFER_SIZE;
use crate::types::{ChannelConfig, PixelFormat};

/// Lifecycle of one output channel. Bindings exist only while configured.
pub enum ChannelState<G, M> {
    Unconfigured,
    Configured {
        config: ChannelConfig,
        bindings: ChannelBindings<G, M>,
    },
}

/// One output channel: its state and the buffer its transfers read from.
pub struct Channel<G, M> {
    pub(crate) state: ChannelState<G, M>,
    pub(crate) buffer: [u8; PIXEL_BUFFER_SIZE],
}

impl<G, M> Channel<G, M> {
    pub const fn new() -> Self {
        Self {
            state: ChannelState::Unconfigured,
            buffer: [0; PIXEL_BUFFER_SIZE],
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, ChannelState::Configured { .. })
    }

    pub fn config(&self) -> Option<&ChannelConfig> {
        match &self.state {
            ChannelState::Configured { config, .. } => Some(config),
            ChannelState::Unconfigured => None,
        }
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.config().map(|config| config.format)
    }

    pub fn bindings(&self) -> Option<&ChannelBindings<G, M>> {
        match &self.state {
            ChannelState::Configured { bindings, .. } => Some(bindings),
            ChannelState::Unconfigured => None,
        }
    }

    /// Leave the configured state, handing the bindings back for release.
    pub(crate) fn take_bindings(&mut self) -> Option<ChannelBindings<G, M>> {
        match core::mem::replace(&mut self.state, ChannelState::Unconfigured) {
            ChannelState::Configured { bindings, .. } => Some(bindings),
            ChannelState::Unconfigured => None,
        }
    }

    /// Contents of the frame buffer, including bytes past the last frame.
    pub fn buffer(&self) -> &[u8; PIXEL_BUFFER_SIZE] {
        &self.buffer
    }
}

impl<G, M> Default for Channel<G, M> {
    fn default() -> Self {
        Self::new()
    }
}
