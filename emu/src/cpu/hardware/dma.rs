//! DMA engine.
//!
//! Four priority-ordered channels (0 highest) that copy 16- or 32-bit units
//! between arbitrary source/destination addresses without CPU involvement.
//! A channel is latched the moment its enable bit transitions 0->1: source,
//! destination and count are captured into internal working registers so
//! that subsequent writes to the raw registers (or the channel completing
//! and rearming via Repeat) don't disturb an in-flight transfer.
//!
//! # Register Map (per channel, channel N at base + N * 0xC)
//!
//! | Offset | Register   | Description                  |
//! |--------|------------|-------------------------------|
//! | +0x0   | DMAxSAD    | Source address                |
//! | +0x4   | DMAxDAD    | Destination address            |
//! | +0x8   | DMAxCNT_L  | Word count                     |
//! | +0xA   | DMAxCNT_H  | Control                        |
//!
//! Control bits: 5-6 dest addr control, 7-8 source addr control, 9 repeat,
//! 10 transfer type (0=16bit/1=32bit), 11 game pak DRQ (channel 3 only),
//! 12-13 timing (0=immediate, 1=vblank, 2=hblank, 3=special), 14 IRQ enable,
//! 15 DMA enable.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AddrControl {
    Increment,
    Decrement,
    Fixed,
    IncrementReload,
}

impl From<u16> for AddrControl {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            3 => Self::IncrementReload,
            _ => unreachable!("2-bit field"),
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Registers {
    pub source_address: u32,
    pub destination_address: u32,
    pub word_count: u16,
    pub control: u16,

    /// Working source pointer, latched on enable and advanced per unit.
    pub(crate) internal_source: u32,
    /// Working destination pointer, latched on enable and advanced per unit.
    pub(crate) internal_dest: u32,
    /// Remaining units in the current transfer.
    internal_count: u32,
    /// Tracks the enable bit to detect the 0->1 latching edge.
    was_enabled: bool,
}

impl Registers {
    fn dest_control(&self) -> AddrControl {
        self.control.get_bits(5..=6).into()
    }

    fn source_control(&self) -> AddrControl {
        match self.control.get_bits(7..=8) {
            3 => AddrControl::Fixed, // reserved pattern, treat as fixed rather than UB
            other => other.into(),
        }
    }

    fn repeat(&self) -> bool {
        self.control.get_bit(9)
    }

    pub fn is_32bit(&self) -> bool {
        self.control.get_bit(10)
    }

    pub fn timing(&self) -> Timing {
        match self.control.get_bits(12..=13) {
            0 => Timing::Immediate,
            1 => Timing::VBlank,
            2 => Timing::HBlank,
            3 => Timing::Special,
            _ => unreachable!("2-bit field"),
        }
    }

    fn irq_enable(&self) -> bool {
        self.control.get_bit(14)
    }

    fn enabled(&self) -> bool {
        self.control.get_bit(15)
    }

    fn unit_size(&self) -> u32 {
        if self.is_32bit() { 4 } else { 2 }
    }

    fn latch(&mut self) {
        let unit = self.unit_size();
        let align = !(unit - 1);

        self.internal_source = self.source_address & align;
        self.internal_dest = self.destination_address & align;
        self.internal_count = if self.word_count == 0 {
            0x1_0000
        } else {
            u32::from(self.word_count)
        };
    }

    fn advance_pointer(pointer: &mut u32, control: AddrControl, unit: u32) {
        match control {
            AddrControl::Increment | AddrControl::IncrementReload => *pointer += unit,
            AddrControl::Decrement => *pointer -= unit,
            AddrControl::Fixed => {}
        }
    }
}

#[derive(Default)]
pub struct DmaStepResult {
    /// Whether this channel still has units left to copy in the current burst.
    pub more_remaining: bool,
    /// Whether completing this transfer should raise the channel's IRQ.
    pub raise_irq: bool,
}

#[derive(Default, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [Registers; 4],
}

impl Dma {
    /// Call after any write to a channel's control register. Detects the
    /// enable bit's 0->1 edge, latches the channel, and returns its index
    /// if the channel is configured to start immediately.
    pub fn on_control_write(&mut self, channel: usize) -> Option<usize> {
        let was_enabled = self.channels[channel].was_enabled;
        let now_enabled = self.channels[channel].enabled();
        self.channels[channel].was_enabled = now_enabled;

        if !was_enabled && now_enabled {
            self.channels[channel].latch();

            if self.channels[channel].timing() == Timing::Immediate {
                return Some(channel);
            }
        }

        None
    }

    /// Channels currently enabled, latched, and configured for `timing`, in
    /// priority order (0 first).
    pub fn channels_for_timing(&self, timing: Timing) -> Vec<usize> {
        (0..4)
            .filter(|&i| self.channels[i].enabled() && self.channels[i].timing() == timing)
            .collect()
    }

    pub fn internal_source(&self, channel: usize) -> u32 {
        self.channels[channel].internal_source
    }

    pub fn internal_dest(&self, channel: usize) -> u32 {
        self.channels[channel].internal_dest
    }

    pub fn is_32bit(&self, channel: usize) -> bool {
        self.channels[channel].is_32bit()
    }

    /// Advance one unit of the given channel's transfer: move both pointers
    /// per their increment mode and decrement the remaining count. Does not
    /// perform the actual memory copy; the caller reads/writes at
    /// `internal_source`/`internal_dest` before calling this.
    pub fn step_transfer(&mut self, channel: usize) -> DmaStepResult {
        let unit = self.channels[channel].unit_size();
        let source_control = self.channels[channel].source_control();
        let dest_control = self.channels[channel].dest_control();

        Registers::advance_pointer(
            &mut self.channels[channel].internal_source,
            source_control,
            unit,
        );
        Registers::advance_pointer(
            &mut self.channels[channel].internal_dest,
            dest_control,
            unit,
        );

        self.channels[channel].internal_count -= 1;

        if self.channels[channel].internal_count > 0 {
            return DmaStepResult {
                more_remaining: true,
                raise_irq: false,
            };
        }

        let raise_irq = self.channels[channel].irq_enable();

        if self.channels[channel].repeat() {
            self.channels[channel].internal_count = if self.channels[channel].word_count == 0 {
                0x1_0000
            } else {
                u32::from(self.channels[channel].word_count)
            };

            if self.channels[channel].dest_control() == AddrControl::IncrementReload {
                self.channels[channel].internal_dest =
                    self.channels[channel].destination_address & !(unit - 1);
            }
        } else {
            self.channels[channel].control.set_bit(15, false);
            self.channels[channel].was_enabled = false;
        }

        DmaStepResult {
            more_remaining: false,
            raise_irq,
        }
    }

    /// Run a FIFO-sound refill: four 32-bit words from the latched source to
    /// the FIFO register, advancing only the source pointer. Count and
    /// destination are untouched per the FIFO DMA contract.
    pub fn fifo_refill_source(&mut self, channel: usize) -> [u32; 4] {
        let mut sources = [0u32; 4];
        let source_control = self.channels[channel].source_control();

        for source in &mut sources {
            *source = self.channels[channel].internal_source;
            Registers::advance_pointer(&mut self.channels[channel].internal_source, source_control, 4);
        }

        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enable_channel(dma: &mut Dma, channel: usize, control: u16) -> Option<usize> {
        dma.channels[channel].control = control;
        dma.on_control_write(channel)
    }

    #[test]
    fn immediate_transfer_latches_and_fires() {
        let mut dma = Dma::default();
        dma.channels[0].source_address = 0x0200_0000;
        dma.channels[0].destination_address = 0x0600_0000;
        dma.channels[0].word_count = 4;

        // enable bit + 32-bit transfer + immediate timing
        let triggered = enable_channel(&mut dma, 0, 0x8400);
        assert_eq!(triggered, Some(0));
        assert_eq!(dma.internal_source(0), 0x0200_0000);
        assert_eq!(dma.internal_dest(0), 0x0600_0000);
    }

    #[test]
    fn step_transfer_advances_and_completes() {
        let mut dma = Dma::default();
        dma.channels[0].source_address = 0x0200_0000;
        dma.channels[0].destination_address = 0x0600_0000;
        dma.channels[0].word_count = 2;
        dma.channels[0].control = 0x8400; // enable, 32-bit, immediate
        dma.on_control_write(0);

        let r1 = dma.step_transfer(0);
        assert!(r1.more_remaining);
        assert_eq!(dma.internal_source(0), 0x0200_0004);

        let r2 = dma.step_transfer(0);
        assert!(!r2.more_remaining);
        assert!(!dma.channels[0].enabled());
    }

    #[test]
    fn repeat_rearms_count_without_clearing_enable() {
        let mut dma = Dma::default();
        dma.channels[0].word_count = 1;
        dma.channels[0].control = 0x8200; // enable, repeat, immediate, 16-bit
        dma.on_control_write(0);

        let result = dma.step_transfer(0);
        assert!(!result.more_remaining);
        assert!(dma.channels[0].enabled());
    }

    #[test]
    fn vblank_timing_is_not_returned_as_immediate() {
        let mut dma = Dma::default();
        dma.channels[1].control = 0x9000; // enable, vblank timing
        let triggered = dma.on_control_write(1);
        assert!(triggered.is_none());
        assert_eq!(dma.channels_for_timing(Timing::VBlank), vec![1]);
    }
}
