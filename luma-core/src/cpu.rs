pub(crate) mod opcodes;
mod registers;

#[cfg(test)]
mod tests;

use crate::hardware::Hardware;
use crate::memory::{self, address};
use opcodes::{Opcode, CB_OPCODES, OPCODES};

pub use registers::{CpuRegister, CpuRegisterPair, CpuRegisters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptType {
    VBlank,
    LcdStatus,
    Timer,
    Serial,
    Joypad,
}

impl InterruptType {
    // Bit 0 is the highest priority
    pub fn bit(self) -> u8 {
        match self {
            Self::VBlank => 1 << 0,
            Self::LcdStatus => 1 << 1,
            Self::Timer => 1 << 2,
            Self::Serial => 1 << 3,
            Self::Joypad => 1 << 4,
        }
    }

    pub fn handler_address(self) -> u16 {
        match self {
            Self::VBlank => 0x0040,
            Self::LcdStatus => 0x0048,
            Self::Timer => 0x0050,
            Self::Serial => 0x0058,
            Self::Joypad => 0x0060,
        }
    }
}

/// CPU state beyond the register file: interrupt master enable, HALT, the
/// CGB speed switch, and the scratch state an opcode descriptor carries
/// between its fetch-decode-execute, read, and write phases.
pub struct Cpu {
    pub registers: CpuRegisters,
    pub(crate) ime: bool,
    pub(crate) halted: bool,
    double_speed: bool,
    speed_switch_pending: bool,
    pub(crate) value8: u8,
    pub(crate) value16: u16,
    pub(crate) temp: u8,
    pub(crate) jumped: bool,
    opcode: Option<&'static Opcode>,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            registers: CpuRegisters::new(),
            ime: false,
            halted: false,
            double_speed: false,
            speed_switch_pending: false,
            value8: 0xFF,
            value16: 0xFFFF,
            temp: 0,
            jumped: false,
            opcode: None,
        }
    }

    pub fn double_speed(&self) -> bool {
        self.double_speed
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    // KEY1 lives on the CPU: bit 7 reports the current speed, bit 0 arms the
    // switch performed by STOP
    pub(crate) fn try_read(&self, addr: u16) -> Option<u8> {
        (addr == address::KEY1)
            .then(|| u8::from(self.double_speed) << 7 | u8::from(self.speed_switch_pending))
    }

    pub(crate) fn try_write(&mut self, addr: u16, value: u8) -> bool {
        if addr == address::KEY1 {
            self.speed_switch_pending = value & 0x01 != 0;
            true
        } else {
            false
        }
    }
}

// One base cycle is 1 / 2^22 s, or 2 ticks; double speed halves it
fn cycle_ticks(cpu: &Cpu) -> u64 {
    if cpu.double_speed {
        1
    } else {
        2
    }
}

/// First sub-phase of an instruction: poll interrupts, fetch and decode the
/// opcode (plus its 0, 1 or 2 immediate bytes), and run the base action.
/// Returns the elapsed simulated time in ticks.
pub fn fetch_decode_execute(hw: &mut Hardware) -> u64 {
    debug_assert!(hw.cpu.opcode.is_none());

    service_interrupts(hw);

    if hw.cpu.halted {
        return 4 * cycle_ticks(&hw.cpu);
    }

    let mut pc = hw.cpu.registers.pc;
    let first = memory::read8(hw, pc);
    pc = pc.wrapping_add(1);
    let opcode: &'static Opcode = if first == 0xCB {
        let second = memory::read8(hw, pc);
        pc = pc.wrapping_add(1);
        &CB_OPCODES[usize::from(second)]
    } else {
        &OPCODES[usize::from(first)]
    };

    match opcode.extra_bytes {
        0 => {}
        1 => {
            hw.cpu.value8 = memory::read8(hw, pc);
            pc = pc.wrapping_add(1);
        }
        2 => {
            let lsb = memory::read8(hw, pc);
            let msb = memory::read8(hw, pc.wrapping_add(1));
            pc = pc.wrapping_add(2);
            hw.cpu.value16 = u16::from_le_bytes([lsb, msb]);
        }
        _ => unreachable!("extra_bytes is validated at table construction"),
    }
    hw.cpu.registers.pc = pc;
    hw.cpu.opcode = Some(opcode);

    log::trace!("executing {} at {:04X}", opcode.mnemonic, pc);

    let cycle = cycle_ticks(&hw.cpu);
    let mut time = u64::from(opcode.cycles) * cycle;
    (opcode.base)(hw);
    if hw.cpu.jumped {
        hw.cpu.jumped = false;
        time += u64::from(opcode.jump_cycles) * cycle;
    }

    time
}

/// Second sub-phase: the memory read of opcodes that declare one. Costs one
/// base cycle when taken, nothing otherwise.
pub fn read_phase(hw: &mut Hardware) -> u64 {
    let Some(opcode) = hw.cpu.opcode else {
        return 0;
    };
    if hw.cpu.halted {
        return 0;
    }
    let Some(read) = &opcode.read else {
        return 0;
    };

    read(hw);
    cycle_ticks(&hw.cpu)
}

/// Third sub-phase: the memory write of opcodes that declare one. Always
/// retires the current opcode.
pub fn write_phase(hw: &mut Hardware) -> u64 {
    let Some(opcode) = hw.cpu.opcode else {
        return 0;
    };
    hw.cpu.opcode = None;
    if hw.cpu.halted {
        return 0;
    }
    let Some(write) = &opcode.write else {
        return 0;
    };

    write(hw);
    cycle_ticks(&hw.cpu)
}

// Dispatch precondition: IME set and some interrupt both requested and
// enabled. A pending enabled interrupt also wakes a halted CPU even when IME
// is clear, without dispatching.
fn service_interrupts(hw: &mut Hardware) {
    let pending = hw.wram.interrupt_flag & hw.wram.interrupt_enable & 0x1F;
    if pending == 0 {
        return;
    }

    hw.cpu.halted = false;

    if !hw.cpu.ime {
        return;
    }

    // Lowest numbered bit wins
    let bit = pending.trailing_zeros() as u8;
    hw.wram.interrupt_flag &= !(1 << bit);
    hw.cpu.ime = false;

    let pc = hw.cpu.registers.pc;
    push_word(hw, pc);
    hw.cpu.registers.pc = 0x0040 + 8 * u16::from(bit);

    log::trace!("dispatched interrupt bit {bit} to {:04X}", hw.cpu.registers.pc);
}

/// Requests an interrupt by setting its IF bit. Wakes a halted CPU when the
/// corresponding IE bit is set, regardless of IME.
pub fn request_interrupt(hw: &mut Hardware, interrupt: InterruptType) {
    hw.wram.interrupt_flag |= interrupt.bit();
    if hw.cpu.halted && hw.wram.interrupt_enable & interrupt.bit() != 0 {
        hw.cpu.halted = false;
    }
}

// STOP: performs the speed switch armed through KEY1, otherwise does nothing
// beyond a warning
pub(crate) fn stop(hw: &mut Hardware) {
    if hw.cpu.speed_switch_pending {
        hw.cpu.double_speed = !hw.cpu.double_speed;
        hw.cpu.speed_switch_pending = false;
        log::debug!(
            "speed switch performed, double speed is now {}",
            hw.cpu.double_speed
        );
    } else {
        log::warn!("STOP executed without a pending speed switch, not modeled");
    }
}

pub(crate) fn push_word(hw: &mut Hardware, value: u16) {
    let sp = hw.cpu.registers.sp.wrapping_sub(2);
    hw.cpu.registers.sp = sp;
    memory::write16(hw, sp, value);
}

pub(crate) fn pop_word(hw: &mut Hardware) -> u16 {
    let sp = hw.cpu.registers.sp;
    let value = memory::read16(hw, sp);
    hw.cpu.registers.sp = sp.wrapping_add(2);
    value
}
