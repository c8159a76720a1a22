//! PixelPusher firmware for the Raspberry Pi Pico
//!
//! Eight WS2812 outputs on GPIO3..GPIO10, fed over USB.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::interrupt;
use embassy_rp::pio::Pio;
use embassy_rp::usb::Driver;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_halt as _};

use pixelpusher::channels::CHANNEL_SYNC;
use pixelpusher::hardware::{self, PioBlock, Rp2040Binder};
use pixelpusher::latch::latch_task;
use pixelpusher::registry::ChannelRegistry;
use pixelpusher::supervisor::AppSupervisor;
use pixelpusher::usb::{usb_task, Registry};
use pixelpusher::Irqs;

static REGISTRY: StaticCell<Registry> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let mut supervisor = AppSupervisor::new(&CHANNEL_SYNC);
    supervisor.print_startup_banner();

    let pio0 = PioBlock::new(Pio::new(p.PIO0, Irqs), |common| {
        [
            common.make_pio_pin(p.PIN_3),
            common.make_pio_pin(p.PIN_4),
            common.make_pio_pin(p.PIN_5),
            common.make_pio_pin(p.PIN_6),
        ]
    });
    let pio1 = PioBlock::new(Pio::new(p.PIO1, Irqs), |common| {
        [
            common.make_pio_pin(p.PIN_7),
            common.make_pio_pin(p.PIN_8),
            common.make_pio_pin(p.PIN_9),
            common.make_pio_pin(p.PIN_10),
        ]
    });
    let binder = Rp2040Binder::new(
        pio0,
        pio1,
        [
            p.DMA_CH0.into(),
            p.DMA_CH1.into(),
            p.DMA_CH2.into(),
            p.DMA_CH3.into(),
            p.DMA_CH4.into(),
            p.DMA_CH5.into(),
            p.DMA_CH6.into(),
            p.DMA_CH7.into(),
        ],
    );
    let registry = REGISTRY.init(ChannelRegistry::new(binder, &CHANNEL_SYNC));
    let driver = Driver::new(p.USB, Irqs);

    if let Err(err) = spawn_tasks(&spawner, driver, registry) {
        error!("Task spawn failed: {}", Display2Format(&err));
        return;
    }

    supervisor.print_init_success();
    supervisor.run().await;
}

fn spawn_tasks(
    spawner: &Spawner,
    driver: Driver<'static, embassy_rp::peripherals::USB>,
    registry: &'static mut Registry,
) -> pixelpusher::Result<()> {
    spawner.spawn(latch_task(&CHANNEL_SYNC))?;
    spawner.spawn(usb_task(driver, registry))?;
    Ok(())
}

#[interrupt]
unsafe fn DMA_IRQ_1() {
    hardware::on_completion_irq(&CHANNEL_SYNC);
}
