//! WS2812 waveform program
//!
//! Each data bit is `T1` cycles high, then `T2` cycles at the bit's level,
//! then `T3` cycles low. The state machine autopulls one byte at a time and
//! shifts it out MSB first, so frame bytes go to the FIFO unchanged.
//!
//! The program is the one embassy-rp's `PioWs2812Program` loads; it is built
//! here so the state machine can be configured for byte-wide autopull.

use fixed::types::U24F8;
use pio::{Assembler, JmpCondition, OutDestination, Program, SetDestination, SideSet};

use crate::config::{WS2812_BIT_RATE_HZ, WS2812_CYCLES_PER_BIT, WS2812_T1, WS2812_T2, WS2812_T3};

pub const PROGRAM_CAPACITY: usize = 32;

/// Bits autopulled per FIFO word.
pub const PULL_THRESHOLD: u8 = 8;

/// Assemble the program. The first instruction makes the side-set pin an
/// output and runs once; the loop wraps back past it.
pub fn ws2812_program() -> Program<PROGRAM_CAPACITY> {
    let side_set = SideSet::new(false, 1, false);
    let mut a: Assembler<PROGRAM_CAPACITY> = Assembler::new_with_side_set(side_set);

    let mut wrap_target = a.label();
    let mut wrap_source = a.label();
    let mut do_zero = a.label();

    a.set_with_side_set(SetDestination::PINDIRS, 1, 0);
    a.bind(&mut wrap_target);
    // Stop bit
    a.out_with_delay_and_side_set(OutDestination::X, 1, WS2812_T3 - 1, 0);
    // Start bit
    a.jmp_with_delay_and_side_set(JmpCondition::XIsZero, &mut do_zero, WS2812_T1 - 1, 1);
    // Data bit = 1
    a.jmp_with_delay_and_side_set(JmpCondition::Always, &mut wrap_target, WS2812_T2 - 1, 1);
    a.bind(&mut do_zero);
    // Data bit = 0
    a.nop_with_delay_and_side_set(WS2812_T2 - 1, 0);
    a.bind(&mut wrap_source);

    a.assemble_with_wrap(wrap_source, wrap_target)
}

/// State machine clock divider that runs the program at the WS2812 bit rate
/// from a system clock of `sys_hz`.
pub fn clock_divider(sys_hz: u32) -> U24F8 {
    let clock_khz = U24F8::from_num(sys_hz / 1000);
    let bit_khz = U24F8::from_num(WS2812_BIT_RATE_HZ / 1000);
    clock_khz / (bit_khz * U24F8::from_num(WS2812_CYCLES_PER_BIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_fits_and_wraps_past_the_pindirs_setup() {
        let program = ws2812_program();
        assert_eq!(program.code.len(), 5);
        assert_eq!(program.wrap.target, 1);
        assert_eq!(program.origin, None);
    }

    #[test]
    fn divider_for_default_pico_clock() {
        // 125 MHz / (800 kHz * 10) = 15.625
        assert_eq!(clock_divider(125_000_000), U24F8::from_num(15.625));
    }

    #[test]
    fn divider_for_overclocked_pico() {
        // 200 MHz / 8 MHz = 25
        assert_eq!(clock_divider(200_000_000), U24F8::from_num(25));
    }
}
