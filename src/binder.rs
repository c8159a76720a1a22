//! Hardware resource claiming for output channels
//!
//! A configured channel owns two bindings: a waveform generator (PIO state
//! machine running the WS2812 program on the channel's pin) and a data mover
//! (the DMA channel with the same index, feeding the generator's TX FIFO).
//! Bindings are move-only tokens. Releasing consumes them, so a binding cannot
//! be released twice and a never-claimed binding cannot be released at all.

use crate::error::ConfigError;
use crate::types::{ChannelIndex, PixelFormat};

/// Claims and releases the hardware behind a channel.
pub trait ResourceBinder {
    /// Waveform generator binding owned by a configured channel.
    type Generator;
    /// Data mover binding owned by a configured channel.
    type Mover;

    /// Claim a generator able to drive `channel`'s pin. Leaves no partial
    /// state behind on failure.
    fn claim(
        &mut self,
        channel: ChannelIndex,
        format: PixelFormat,
    ) -> Result<Self::Generator, ConfigError>;

    /// Claim the data mover for `channel` and point it at `generator`.
    fn bind_transfer(
        &mut self,
        channel: ChannelIndex,
        generator: &Self::Generator,
    ) -> Result<Self::Mover, ConfigError>;

    /// Start moving `frame` into the generator, one byte per transfer.
    ///
    /// # Safety
    ///
    /// The hardware keeps reading `frame` after this returns. The caller must
    /// keep it alive, in place and unmodified until the completion for this
    /// mover has been dispatched, or until the mover is released.
    unsafe fn start_transfer(&mut self, mover: &mut Self::Mover, frame: &[u8]);

    /// Abort anything in flight and give the mover back.
    fn release_mover(&mut self, mover: Self::Mover);

    /// Stop the generator, discard output it still has queued, and give its
    /// slot back.
    fn release_generator(&mut self, generator: Self::Generator);

    /// Unmask the shared completion interrupt.
    fn enable_completion_irq(&mut self);
}

/// Both hardware bindings of a configured channel.
pub struct ChannelBindings<G, M> {
    generator: G,
    mover: M,
}

impl<G, M> ChannelBindings<G, M> {
    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn mover(&self) -> &M {
        &self.mover
    }

    pub(crate) fn mover_mut(&mut self) -> &mut M {
        &mut self.mover
    }

    /// Release in reverse claim order: the mover stops reading before its
    /// generator goes away.
    pub fn release<B>(self, binder: &mut B)
    where
        B: ResourceBinder<Generator = G, Mover = M>,
    {
        binder.release_mover(self.mover);
        binder.release_generator(self.generator);
    }
}

/// Holds a freshly claimed generator until the mover claim succeeds. Dropping
/// the guard releases the generator.
pub struct GeneratorGuard<'b, B: ResourceBinder> {
    binder: &'b mut B,
    generator: Option<B::Generator>,
}

impl<'b, B: ResourceBinder> GeneratorGuard<'b, B> {
    pub fn claim(
        binder: &'b mut B,
        channel: ChannelIndex,
        format: PixelFormat,
    ) -> Result<Self, ConfigError> {
        let generator = binder.claim(channel, format)?;
        Ok(Self {
            binder,
            generator: Some(generator),
        })
    }

    /// Claim the mover and hand both bindings out, disarming the guard.
    pub fn bind_transfer(
        mut self,
        channel: ChannelIndex,
    ) -> Result<ChannelBindings<B::Generator, B::Mover>, ConfigError> {
        let Some(generator) = self.generator.take() else {
            return Err(ConfigError::ResourceUnavailable {
                channel: channel.get(),
            });
        };
        match self.binder.bind_transfer(channel, &generator) {
            Ok(mover) => Ok(ChannelBindings { generator, mover }),
            Err(err) => {
                self.generator = Some(generator);
                Err(err)
            }
        }
    }
}

impl<B: ResourceBinder> Drop for GeneratorGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(generator) = self.generator.take() {
            self.binder.release_generator(generator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{BinderEvent, RecordingBinder};

    fn ch(index: u8) -> ChannelIndex {
        ChannelIndex::new(index).unwrap()
    }

    #[test]
    fn guard_releases_generator_when_mover_claim_fails() {
        let mut binder = RecordingBinder::new();
        binder.fail_bind_transfer(ch(4));

        let err = GeneratorGuard::claim(&mut binder, ch(4), PixelFormat::Rgb)
            .and_then(|guard| guard.bind_transfer(ch(4)))
            .err();

        assert_eq!(err, Some(ConfigError::ResourceUnavailable { channel: 4 }));
        assert_eq!(binder.live_generators(), 0);
        assert_eq!(
            binder.events(),
            &[
                BinderEvent::Claim { channel: 4, slot: 0 },
                BinderEvent::ReleaseGenerator { slot: 0 },
            ]
        );
    }

    #[test]
    fn bindings_release_mover_before_generator() {
        let mut binder = RecordingBinder::new();
        let bindings = GeneratorGuard::claim(&mut binder, ch(1), PixelFormat::Rgbw)
            .and_then(|guard| guard.bind_transfer(ch(1)))
            .unwrap();
        assert_eq!(binder.live_generators(), 1);

        bindings.release(&mut binder);

        assert_eq!(
            &binder.events()[2..],
            &[
                BinderEvent::ReleaseMover { channel: 1 },
                BinderEvent::ReleaseGenerator { slot: 0 },
            ]
        );
        assert_eq!(binder.live_generators(), 0);
    }
}
