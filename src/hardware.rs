//! RP2040 resource binder
//!
//! Waveform generators are PIO state machines driven through `embassy_rp::pio`.
//! Pins are muxed to a block once at startup (GPIO3..GPIO6 on PIO0,
//! GPIO7..GPIO10 on PIO1), so channel `i` always runs on state machine `i % 4`
//! of block `i / 4`. A block gets the waveform program the first time one of
//! its state machines is claimed.
//!
//! Data movers are DMA channels 0..8, channel `i` serving output `i`, paced by
//! its state machine's TX DREQ. They are programmed through the PAC: a frame
//! keeps streaming after the call that starts it returns, and its completion
//! must arrive on DMA_IRQ_1. `embassy_rp::dma::Transfer` is a future that
//! aborts on drop and completes through embassy-rp's own DMA_IRQ_0 handler.

use core::sync::atomic::{compiler_fence, Ordering};

use defmt::*;
use embassy_rp::dma::AnyChannel;
use embassy_rp::interrupt::{self, InterruptExt, Priority};
use embassy_rp::pac;
use embassy_rp::pac::dma::regs::CtrlTrig;
use embassy_rp::pac::dma::vals::{DataSize, TreqSel};
use embassy_rp::peripherals::{PIO0, PIO1};
use embassy_rp::pio::{
    Common, Config, FifoJoin, Instance, LoadedProgram, Pin, Pio, ShiftConfig, ShiftDirection,
    StateMachine,
};
use embassy_rp::Peri;
use embassy_time::Instant;
use fixed::types::U24F8;

use crate::binder::ResourceBinder;
use crate::config::{COMPLETION_IRQ_INDEX, NUM_CHANNELS, PIO_BLOCKS, STATE_MACHINES_PER_PIO};
use crate::error::ConfigError;
use crate::gate::ChannelSync;
use crate::types::{ChannelIndex, PixelFormat};
use crate::waveform::{self, PULL_THRESHOLD};

// ===================================================================
// PIO
// ===================================================================

// Every channel has its own state machine.
const _: () = core::assert!(PIO_BLOCKS * STATE_MACHINES_PER_PIO == NUM_CHANNELS);

/// Run `$body` with `$sm` bound to state machine `$index` of `$block`.
macro_rules! with_state_machine {
    ($block:expr, $index:expr, $sm:ident => $body:expr) => {
        match $index {
            0 => {
                let $sm = &mut $block.sm0;
                $body
            }
            1 => {
                let $sm = &mut $block.sm1;
                $body
            }
            2 => {
                let $sm = &mut $block.sm2;
                $body
            }
            _ => {
                let $sm = &mut $block.sm3;
                $body
            }
        }
    };
}

/// One PIO block with its four state machines and the pins muxed to it.
pub struct PioBlock<P: Instance + 'static> {
    common: Common<'static, P>,
    sm0: StateMachine<'static, P, 0>,
    sm1: StateMachine<'static, P, 1>,
    sm2: StateMachine<'static, P, 2>,
    sm3: StateMachine<'static, P, 3>,
    pins: [Pin<'static, P>; STATE_MACHINES_PER_PIO],
    program: Option<LoadedProgram<'static, P>>,
    claimed: u8,
}

impl<P: Instance + 'static> PioBlock<P> {
    /// `pins` makes the pin for each state machine, in state machine order.
    pub fn new(
        pio: Pio<'static, P>,
        pins: impl FnOnce(&mut Common<'static, P>) -> [Pin<'static, P>; STATE_MACHINES_PER_PIO],
    ) -> Self {
        let Pio {
            mut common,
            sm0,
            sm1,
            sm2,
            sm3,
            ..
        } = pio;
        let pins = pins(&mut common);
        Self {
            common,
            sm0,
            sm1,
            sm2,
            sm3,
            pins,
            program: None,
            claimed: 0,
        }
    }

    fn start(&mut self, channel: ChannelIndex, sm: u8, divider: U24F8) -> Result<(), ConfigError> {
        let unavailable = ConfigError::ResourceUnavailable {
            channel: channel.get(),
        };
        let bit = 1 << sm;
        if self.claimed & bit != 0 {
            return Err(unavailable);
        }

        if self.program.is_none() {
            let program = self
                .common
                .try_load_program(&waveform::ws2812_program())
                .map_err(|_| unavailable)?;
            self.program = Some(program);
            debug!("Waveform program loaded for channel {}", channel.get());
        }
        let Some(program) = self.program.as_ref() else {
            return Err(unavailable);
        };

        let pin = &self.pins[usize::from(sm)];
        let mut cfg = Config::default();
        cfg.set_set_pins(&[pin]);
        cfg.use_program(program, &[pin]);
        cfg.clock_divider = divider;
        cfg.fifo_join = FifoJoin::TxOnly;
        cfg.shift_out = ShiftConfig {
            auto_fill: true,
            threshold: PULL_THRESHOLD,
            direction: ShiftDirection::Left,
        };

        with_state_machine!(self, sm, machine => {
            machine.set_enable(false);
            machine.set_config(&cfg);
            machine.clear_fifos();
            machine.restart();
            machine.set_enable(true);
        });
        self.claimed |= bit;
        Ok(())
    }

    /// Stop the state machine and drop whatever an aborted frame left queued.
    fn stop(&mut self, sm: u8) {
        with_state_machine!(self, sm, machine => {
            machine.set_enable(false);
            machine.clear_fifos();
        });
        self.claimed &= !(1 << sm);
    }
}

/// Generator binding: one PIO state machine driving one pin.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PioSlot {
    block: u8,
    sm: u8,
    pin: u8,
}

impl PioSlot {
    fn for_channel(channel: ChannelIndex) -> Self {
        let per_block = STATE_MACHINES_PER_PIO as u8;
        Self {
            block: channel.get() / per_block,
            sm: channel.get() % per_block,
            pin: channel.gpio_pin(),
        }
    }

    fn tx_dreq(&self) -> u8 {
        self.block * 8 + self.sm
    }

    fn tx_fifo(&self) -> *mut u32 {
        let regs = if self.block == 0 { pac::PIO0 } else { pac::PIO1 };
        regs.txf(usize::from(self.sm)).as_ptr()
    }
}

// ===================================================================
// DMA
// ===================================================================

/// Mover binding: a DMA channel wired to a [`PioSlot`]'s TX FIFO.
pub struct DmaLane {
    channel: u8,
    ctrl: CtrlTrig,
}

impl DmaLane {
    fn regs(&self) -> pac::dma::Channel {
        pac::DMA.ch(usize::from(self.channel))
    }

    fn bit(&self) -> u32 {
        1 << self.channel
    }
}

// ===================================================================
// Binder
// ===================================================================

pub struct Rp2040Binder {
    pio0: PioBlock<PIO0>,
    pio1: PioBlock<PIO1>,
    divider: U24F8,
    dma_claimed: u32,
    // Held so nothing else can take them.
    _dma: [Peri<'static, AnyChannel>; NUM_CHANNELS],
}

impl Rp2040Binder {
    pub fn new(
        pio0: PioBlock<PIO0>,
        pio1: PioBlock<PIO1>,
        dma: [Peri<'static, AnyChannel>; NUM_CHANNELS],
    ) -> Self {
        let divider = waveform::clock_divider(embassy_rp::clocks::clk_sys_freq());
        debug!("PIO clock divider {}", divider.to_bits());
        Self {
            pio0,
            pio1,
            divider,
            dma_claimed: 0,
            _dma: dma,
        }
    }
}

impl ResourceBinder for Rp2040Binder {
    type Generator = PioSlot;
    type Mover = DmaLane;

    fn claim(&mut self, channel: ChannelIndex, format: PixelFormat) -> Result<PioSlot, ConfigError> {
        let slot = PioSlot::for_channel(channel);
        match slot.block {
            0 => self.pio0.start(channel, slot.sm, self.divider)?,
            _ => self.pio1.start(channel, slot.sm, self.divider)?,
        }

        debug!(
            "Channel {}: PIO{} SM{} on GPIO{} ({})",
            channel.get(),
            slot.block,
            slot.sm,
            slot.pin,
            format
        );
        Ok(slot)
    }

    fn bind_transfer(
        &mut self,
        channel: ChannelIndex,
        generator: &PioSlot,
    ) -> Result<DmaLane, ConfigError> {
        let bit = channel.mask();
        if self.dma_claimed & bit != 0 {
            return Err(ConfigError::ResourceUnavailable {
                channel: channel.get(),
            });
        }

        let mut ctrl = CtrlTrig(0);
        ctrl.set_treq_sel(TreqSel::from(generator.tx_dreq()));
        ctrl.set_data_size(DataSize::SIZE_BYTE);
        ctrl.set_incr_read(true);
        ctrl.set_incr_write(false);
        ctrl.set_chain_to(channel.get());
        ctrl.set_en(true);

        let lane = DmaLane {
            channel: channel.get(),
            ctrl,
        };
        lane.regs().write_addr().write_value(generator.tx_fifo() as u32);

        // embassy-rp enables every channel on DMA_IRQ_0 and acknowledges what it
        // sees there, which would swallow our flags.
        pac::DMA.inte(0).modify(|v| *v &= !bit);
        pac::DMA.ints(COMPLETION_IRQ_INDEX).write_value(bit);
        pac::DMA.inte(COMPLETION_IRQ_INDEX).modify(|v| *v |= bit);

        self.dma_claimed |= bit;
        Ok(lane)
    }

    unsafe fn start_transfer(&mut self, mover: &mut DmaLane, frame: &[u8]) {
        let regs = mover.regs();
        regs.read_addr().write_value(frame.as_ptr() as u32);
        regs.trans_count().write_value(frame.len() as u32);
        compiler_fence(Ordering::SeqCst);
        regs.ctrl_trig().write_value(mover.ctrl);
    }

    fn release_mover(&mut self, mover: DmaLane) {
        let bit = mover.bit();
        pac::DMA.inte(COMPLETION_IRQ_INDEX).modify(|v| *v &= !bit);
        pac::DMA.chan_abort().modify(|w| w.set_chan_abort(bit as u16));
        while mover.regs().ctrl_trig().read().busy() {}
        pac::DMA.ints(COMPLETION_IRQ_INDEX).write_value(bit);
        self.dma_claimed &= !bit;
    }

    fn release_generator(&mut self, generator: PioSlot) {
        match generator.block {
            0 => self.pio0.stop(generator.sm),
            _ => self.pio1.stop(generator.sm),
        }
    }

    fn enable_completion_irq(&mut self) {
        interrupt::DMA_IRQ_1.unpend();
        interrupt::DMA_IRQ_1.set_priority(Priority::P1);
        unsafe { interrupt::DMA_IRQ_1.enable() };
        info!("DMA completion interrupt enabled");
    }
}

/// Body of the DMA_IRQ_1 handler.
pub fn on_completion_irq(sync: &ChannelSync) {
    let pending = pac::DMA.ints(COMPLETION_IRQ_INDEX).read();
    pac::DMA.ints(COMPLETION_IRQ_INDEX).write_value(pending);
    sync.on_transfer_complete(pending, Instant::now());
}
