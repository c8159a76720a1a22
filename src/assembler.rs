//! Bulk OUT frame reassembly
//!
//! The host writes one payload per bulk transfer. On the wire that arrives as
//! max-size packets ending with a short one (zero-length when the payload is a
//! multiple of the packet size). Transfers larger than a payload can be are
//! drained to their end and reported once.

use heapless::Vec;

use crate::config::MAX_PAYLOAD_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Assembly {
    /// More packets to come.
    Pending,
    /// A payload is ready in [`FrameAssembler::payload`].
    Complete,
    /// The transfer did not fit. `channel` is its first byte.
    Overflow { channel: u8, len: usize },
}

pub struct FrameAssembler {
    packet_size: usize,
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
    overflow: Option<(u8, usize)>,
    complete: bool,
}

impl FrameAssembler {
    pub const fn new(packet_size: usize) -> Self {
        Self {
            packet_size,
            payload: Vec::new(),
            overflow: None,
            complete: false,
        }
    }

    /// Feed one received packet.
    pub fn push(&mut self, packet: &[u8]) -> Assembly {
        if self.complete {
            self.reset();
        }

        if let Some((_, len)) = self.overflow.as_mut() {
            *len += packet.len();
        } else if self.payload.extend_from_slice(packet).is_err() {
            let channel = self.payload.first().or(packet.first()).copied().unwrap_or(0);
            self.overflow = Some((channel, self.payload.len() + packet.len()));
            self.payload.clear();
        }

        if packet.len() == self.packet_size {
            return Assembly::Pending;
        }

        match self.overflow.take() {
            Some((channel, len)) => Assembly::Overflow { channel, len },
            // A stray zero-length packet between transfers.
            None if self.payload.is_empty() => Assembly::Pending,
            None => {
                self.complete = true;
                Assembly::Complete
            }
        }
    }

    /// The last completed payload. Empty while a transfer is in progress.
    pub fn payload(&self) -> &[u8] {
        if self.complete {
            &self.payload
        } else {
            &[]
        }
    }

    pub fn reset(&mut self) {
        self.payload.clear();
        self.overflow = None;
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: usize = 64;

    fn feed(assembler: &mut FrameAssembler, payload: &[u8]) -> Assembly {
        let mut last = Assembly::Pending;
        for packet in payload.chunks(PACKET) {
            last = assembler.push(packet);
        }
        if payload.len() % PACKET == 0 {
            last = assembler.push(&[]);
        }
        last
    }

    #[test]
    fn short_packet_completes_a_payload() {
        let mut assembler = FrameAssembler::new(PACKET);
        let payload: std::vec::Vec<u8> = (0..100u8).collect();

        assert_eq!(feed(&mut assembler, &payload), Assembly::Complete);
        assert_eq!(assembler.payload(), &payload[..]);
    }

    #[test]
    fn full_size_payload_needs_zero_length_packet() {
        let mut assembler = FrameAssembler::new(PACKET);
        let payload = [7u8; MAX_PAYLOAD_LEN];

        for packet in payload.chunks(PACKET) {
            assert_eq!(assembler.push(packet), Assembly::Pending);
        }
        assert!(assembler.payload().is_empty());
        assert_eq!(assembler.push(&[]), Assembly::Complete);
        assert_eq!(assembler.payload().len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn oversized_transfer_is_drained_and_reported() {
        let mut assembler = FrameAssembler::new(PACKET);
        let mut payload = [0u8; MAX_PAYLOAD_LEN + 1];
        payload[0] = 3;

        assert_eq!(
            feed(&mut assembler, &payload),
            Assembly::Overflow {
                channel: 3,
                len: MAX_PAYLOAD_LEN + 1
            }
        );

        // The next transfer starts clean.
        assert_eq!(assembler.push(&[1, 0xFF, 0x00, 0x00]), Assembly::Complete);
        assert_eq!(assembler.payload(), &[1u8, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn completed_payload_is_replaced_by_the_next_transfer() {
        let mut assembler = FrameAssembler::new(PACKET);
        assert_eq!(assembler.push(&[0, 1, 2]), Assembly::Complete);
        assert_eq!(assembler.push(&[]), Assembly::Pending);
        assert!(assembler.payload().is_empty());
    }
}
