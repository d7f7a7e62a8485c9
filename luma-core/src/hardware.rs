use crate::cartridge::Cartridge;
use crate::cpu::{self, Cpu, InterruptType};
use crate::joypad::{Joypad, Key};
use crate::memory;
use crate::ppu::{self, Video};
use crate::sound::Sound;
use crate::timer::Timer;
use crate::wram::WorkRam;

// I/O register state the boot ROM leaves behind, written through the bus
const POST_BOOT_IO: [(u16, u8); 30] = [
    (0xFF05, 0x00),
    (0xFF06, 0x00),
    (0xFF07, 0x00),
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF14, 0xBF),
    (0xFF16, 0x3F),
    (0xFF17, 0x00),
    (0xFF19, 0xBF),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF1E, 0xBF),
    (0xFF20, 0xFF),
    (0xFF21, 0x00),
    (0xFF22, 0x00),
    (0xFF23, 0xBF),
    (0xFF24, 0x77),
    (0xFF25, 0xF3),
    (0xFF26, 0xF1),
    (0xFF40, 0x91),
    (0xFF42, 0x00),
    (0xFF43, 0x00),
    (0xFF45, 0x00),
    (0xFF47, 0xFC),
    (0xFF48, 0xFF),
    (0xFF49, 0xFF),
    (0xFF4A, 0x00),
    (0xFF4B, 0x00),
];

/// The whole simulated machine. Opcodes, the bus, and the subsystem advance
/// functions all receive this aggregate by mutable reference; no subsystem
/// stores a pointer back to another.
pub struct Hardware {
    pub cartridge: Cartridge,
    pub wram: WorkRam,
    pub video: Video,
    pub timer: Timer,
    pub joypad: Joypad,
    pub sound: Sound,
    pub cpu: Cpu,
    pub(crate) dma_blocking: bool,
}

impl Hardware {
    pub fn new(cartridge: Cartridge) -> Self {
        let mut hardware = Self {
            cartridge,
            wram: WorkRam::new(),
            video: Video::new(),
            timer: Timer::new(),
            joypad: Joypad::new(),
            sound: Sound::new(),
            cpu: Cpu::new(),
            dma_blocking: false,
        };

        for (addr, value) in POST_BOOT_IO {
            memory::write8(&mut hardware, addr, value);
        }
        hardware.wram.interrupt_enable = 0x00;

        hardware
    }

    /// Runs one CPU instruction through its three sub-phases, advancing the
    /// timer between phases and the PPU once over the whole step. Returns the
    /// elapsed simulated time in ticks.
    pub fn tick(&mut self) -> u64 {
        let fde_time = cpu::fetch_decode_execute(self);
        self.advance_timer(fde_time);

        let read_time = cpu::read_phase(self);
        self.advance_timer(read_time);

        let write_time = cpu::write_phase(self);
        self.advance_timer(write_time);

        let time = fde_time + read_time + write_time;
        ppu::tick(self, time);

        time
    }

    fn advance_timer(&mut self, time: u64) {
        if time == 0 {
            return;
        }
        if self.timer.advance(time, self.cpu.double_speed()) {
            cpu::request_interrupt(self, InterruptType::Timer);
        }
    }

    pub fn key_down(&mut self, key: Key) {
        self.joypad.set_pressed(key, true);
        cpu::request_interrupt(self, InterruptType::Joypad);
    }

    pub fn key_up(&mut self, key: Key) {
        self.joypad.set_pressed(key, false);
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::with_test_program(&[])
    }

    /// A machine whose ROM starts with `program` at the entry point,
    /// zero-filled (NOP) afterwards.
    #[cfg(test)]
    pub(crate) fn with_test_program(program: &[u8]) -> Self {
        let mut rom = vec![0; 0x8000];
        rom[0x0147] = 0x00;
        rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
        Self::new(Cartridge::new(rom).expect("test ROM header should be valid"))
    }
}
