//! The memory bus.
//!
//! Reads and writes are routed to the first subsystem that claims the
//! address, in a fixed order. Accesses that no subsystem claims are absorbed:
//! reads return 0, writes are dropped, and both are logged.
//!
//! While an OAM DMA transfer is running, the CPU is only supposed to touch
//! high RAM. Out-of-window reads are logged but still served; out-of-window
//! writes are logged and discarded.

pub mod address;

use crate::hardware::Hardware;

fn in_hram(addr: u16) -> bool {
    (address::HRAM_START..=address::HRAM_END).contains(&addr)
}

pub fn read8(hw: &Hardware, addr: u16) -> u8 {
    if hw.dma_blocking && !in_hram(addr) {
        log::warn!("memory read from {addr:04X} outside HRAM during OAM DMA transfer");
    }

    if let Some(value) = hw.cartridge.try_read(addr) {
        return value;
    }
    if let Some(value) = hw.wram.try_read(addr) {
        return value;
    }
    if let Some(value) = hw.video.try_read(addr) {
        return value;
    }
    if let Some(value) = hw.timer.try_read(addr) {
        return value;
    }
    if let Some(value) = hw.joypad.try_read(addr) {
        return value;
    }
    if let Some(value) = hw.sound.try_read(addr) {
        return value;
    }
    if let Some(value) = hw.cpu.try_read(addr) {
        return value;
    }

    log::warn!("read from unmapped address {addr:04X}");
    0
}

pub fn write8(hw: &mut Hardware, addr: u16, value: u8) {
    if hw.dma_blocking && !in_hram(addr) {
        log::warn!(
            "memory write of {value:02X} to {addr:04X} outside HRAM during OAM DMA transfer ignored"
        );
        return;
    }

    if hw.cartridge.try_write(addr, value) {
        return;
    }
    if hw.wram.try_write(addr, value) {
        return;
    }
    if hw.video.try_write(addr, value) {
        return;
    }
    if hw.timer.try_write(addr, value) {
        return;
    }
    if hw.joypad.try_write(addr, value) {
        return;
    }
    if hw.sound.try_write(addr, value) {
        return;
    }
    if hw.cpu.try_write(addr, value) {
        return;
    }

    log::warn!("write of {value:02X} to unmapped address {addr:04X}");
}

/// Reads a little-endian 16-bit value: low byte at `addr`, high at `addr+1`.
pub fn read16(hw: &Hardware, addr: u16) -> u16 {
    let low = read8(hw, addr);
    let high = read8(hw, addr.wrapping_add(1));
    u16::from_le_bytes([low, high])
}

/// Writes a little-endian 16-bit value: low byte at `addr`, high at `addr+1`.
pub fn write16(hw: &mut Hardware, addr: u16, value: u16) {
    let [low, high] = value.to_le_bytes();
    write8(hw, addr, low);
    write8(hw, addr.wrapping_add(1), high);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Hardware;

    #[test]
    fn routes_to_owners() {
        let mut hw = Hardware::for_tests();

        write8(&mut hw, 0xC123, 0x11);
        assert_eq!(0x11, read8(&hw, 0xC123));
        assert_eq!(0x11, read8(&hw, 0xE123));

        write8(&mut hw, 0x8001, 0x22);
        assert_eq!(0x22, read8(&hw, 0x8001));

        write8(&mut hw, 0xFF06, 0x33);
        assert_eq!(0x33, read8(&hw, 0xFF06));

        write8(&mut hw, 0xFF11, 0x44);
        assert_eq!(0x44, read8(&hw, 0xFF11));

        write8(&mut hw, 0xFF81, 0x55);
        assert_eq!(0x55, read8(&hw, 0xFF81));
    }

    #[test]
    fn unmapped_reads_return_zero() {
        let mut hw = Hardware::for_tests();

        // Serial and undocumented I/O addresses have no owner
        assert_eq!(0x00, read8(&hw, 0xFF01));
        assert_eq!(0x00, read8(&hw, 0xFF03));
        assert_eq!(0x00, read8(&hw, 0xFF7C));

        // The unusable region above OAM as well
        write8(&mut hw, 0xFEA5, 0x99);
        assert_eq!(0x00, read8(&hw, 0xFEA5));
    }

    #[test]
    fn sixteen_bit_accesses_are_little_endian() {
        let mut hw = Hardware::for_tests();

        write16(&mut hw, 0xC000, 0xBEEF);
        assert_eq!(0xEF, read8(&hw, 0xC000));
        assert_eq!(0xBE, read8(&hw, 0xC001));
        assert_eq!(0xBEEF, read16(&hw, 0xC000));
    }

    #[test]
    fn dma_gate_drops_writes_outside_hram() {
        let mut hw = Hardware::for_tests();

        write8(&mut hw, 0xC200, 0x77);
        hw.dma_blocking = true;

        write8(&mut hw, 0xC200, 0x88);
        assert_eq!(0x77, read8(&hw, 0xC200));

        // HRAM stays accessible
        write8(&mut hw, 0xFF90, 0x99);
        assert_eq!(0x99, read8(&hw, 0xFF90));

        hw.dma_blocking = false;
        write8(&mut hw, 0xC200, 0x88);
        assert_eq!(0x88, read8(&hw, 0xC200));
    }
}
