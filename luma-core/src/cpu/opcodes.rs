//! The instruction descriptor tables.
//!
//! Both tables (plain and 0xCB-prefixed) hold 256 descriptors built once, by
//! enumerating the parameter axes of the opcode encoding: register index from
//! bits 0-2 / 3-5, ALU operation and jump condition from bits 3-5, bit index
//! for the single-bit instructions, and register vs (HL) operand. The few
//! irregular encodings are filled in explicitly.
//!
//! A descriptor's base function runs during fetch-decode-execute and costs
//! the declared cycle count (plus the surcharge when a conditional jump is
//! taken). Memory-operand instructions carry read and/or write phase
//! functions instead, which the CPU invokes as separate sub-phases so the
//! timer can advance in between.

use crate::cpu::registers::{
    CFlag, CpuRegister, CpuRegisterPair, CpuRegisters, HFlag, NFlag, ZFlag,
};
use crate::hardware::Hardware;
use crate::memory;
use once_cell::sync::Lazy;

pub(crate) type OpcodeFn = Box<dyn Fn(&mut Hardware) + Send + Sync>;

pub(crate) struct Opcode {
    pub mnemonic: String,
    pub extra_bytes: u8,
    pub cycles: u32,
    pub jump_cycles: u32,
    pub base: OpcodeFn,
    pub read: Option<OpcodeFn>,
    pub write: Option<OpcodeFn>,
}

impl Opcode {
    fn new(
        mnemonic: impl Into<String>,
        extra_bytes: u8,
        cycles: u32,
        base: impl Fn(&mut Hardware) + Send + Sync + 'static,
    ) -> Self {
        debug_assert!(extra_bytes <= 2);
        debug_assert!(cycles >= 4 && cycles % 4 == 0);
        Self {
            mnemonic: mnemonic.into(),
            extra_bytes,
            cycles,
            jump_cycles: 0,
            base: Box::new(base),
            read: None,
            write: None,
        }
    }

    fn with_jump(mut self, jump_cycles: u32) -> Self {
        self.jump_cycles = jump_cycles;
        self
    }

    fn with_read(mut self, read: impl Fn(&mut Hardware) + Send + Sync + 'static) -> Self {
        self.read = Some(Box::new(read));
        self
    }

    fn with_write(mut self, write: impl Fn(&mut Hardware) + Send + Sync + 'static) -> Self {
        self.write = Some(Box::new(write));
        self
    }
}

pub(crate) static OPCODES: Lazy<Vec<Opcode>> = Lazy::new(build_base_table);
pub(crate) static CB_OPCODES: Lazy<Vec<Opcode>> = Lazy::new(build_cb_table);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

// In opcode encoding order (bits 3-5 of 0x80-0xBF, and the 0xC6+8n column)
const ALU_OPS: [AluOp; 8] = [
    AluOp::Add,
    AluOp::Adc,
    AluOp::Sub,
    AluOp::Sbc,
    AluOp::And,
    AluOp::Xor,
    AluOp::Or,
    AluOp::Cp,
];

impl AluOp {
    fn from_mid_opcode_bits(bits: u8) -> Self {
        ALU_OPS[usize::from((bits >> 3) & 0x07)]
    }

    fn name(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sub => "SUB",
            Self::Sbc => "SBC",
            Self::And => "AND",
            Self::Xor => "XOR",
            Self::Or => "OR",
            Self::Cp => "CP",
        }
    }

    fn apply(self, registers: &mut CpuRegisters, value: u8) {
        match self {
            Self::Add | Self::Adc => {
                let carry = self == Self::Adc && registers.c_flag();
                let (sum, c_flag, h_flag) = add(registers.accumulator, value, carry);
                registers.accumulator = sum;
                registers.set_flags(ZFlag(sum == 0), NFlag(false), h_flag, c_flag);
            }
            Self::Sub | Self::Sbc => {
                let carry = self == Self::Sbc && registers.c_flag();
                let (difference, c_flag, h_flag) = sub(registers.accumulator, value, carry);
                registers.accumulator = difference;
                registers.set_flags(ZFlag(difference == 0), NFlag(true), h_flag, c_flag);
            }
            Self::And => {
                let result = registers.accumulator & value;
                registers.accumulator = result;
                registers.set_flags(ZFlag(result == 0), NFlag(false), HFlag(true), CFlag(false));
            }
            Self::Xor => {
                let result = registers.accumulator ^ value;
                registers.accumulator = result;
                registers.set_flags(ZFlag(result == 0), NFlag(false), HFlag(false), CFlag(false));
            }
            Self::Or => {
                let result = registers.accumulator | value;
                registers.accumulator = result;
                registers.set_flags(ZFlag(result == 0), NFlag(false), HFlag(false), CFlag(false));
            }
            Self::Cp => {
                // Comparison throws away the subtraction result
                let (difference, c_flag, h_flag) = sub(registers.accumulator, value, false);
                registers.set_flags(ZFlag(difference == 0), NFlag(true), h_flag, c_flag);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

// In CB-prefix encoding order (bits 3-5 of 0x00-0x3F)
const SHIFT_OPS: [ShiftOp; 8] = [
    ShiftOp::Rlc,
    ShiftOp::Rrc,
    ShiftOp::Rl,
    ShiftOp::Rr,
    ShiftOp::Sla,
    ShiftOp::Sra,
    ShiftOp::Swap,
    ShiftOp::Srl,
];

impl ShiftOp {
    fn name(self) -> &'static str {
        match self {
            Self::Rlc => "RLC",
            Self::Rrc => "RRC",
            Self::Rl => "RL",
            Self::Rr => "RR",
            Self::Sla => "SLA",
            Self::Sra => "SRA",
            Self::Swap => "SWAP",
            Self::Srl => "SRL",
        }
    }

    /// Applies the operation and sets Z/N/H/C from the result, the CB-prefix
    /// flag behavior. The A-register rotates reuse this and then force Z off.
    fn apply(self, registers: &mut CpuRegisters, value: u8) -> u8 {
        let (result, c_flag) = match self {
            Self::Rlc => rotate_left(value),
            Self::Rrc => rotate_right(value),
            Self::Rl => rotate_left_thru_carry(value, registers.c_flag()),
            Self::Rr => rotate_right_thru_carry(value, registers.c_flag()),
            Self::Sla => shift_left(value),
            Self::Sra => shift_right_arithmetic(value),
            Self::Swap => (swap_bits(value), CFlag(false)),
            Self::Srl => shift_right_logical(value),
        };
        registers.set_flags(ZFlag(result == 0), NFlag(false), HFlag(false), c_flag);
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpCondition {
    NZ,
    Z,
    NC,
    C,
}

// In opcode encoding order (bits 3-4)
const CONDITIONS: [JumpCondition; 4] = [
    JumpCondition::NZ,
    JumpCondition::Z,
    JumpCondition::NC,
    JumpCondition::C,
];

impl JumpCondition {
    fn name(self) -> &'static str {
        match self {
            Self::NZ => "NZ",
            Self::Z => "Z",
            Self::NC => "NC",
            Self::C => "C",
        }
    }

    fn check(self, registers: &CpuRegisters) -> bool {
        match self {
            Self::NZ => !registers.z_flag(),
            Self::Z => registers.z_flag(),
            Self::NC => !registers.c_flag(),
            Self::C => registers.c_flag(),
        }
    }
}

//
// Flag arithmetic helpers
//

fn add(l_value: u8, r_value: u8, carry: bool) -> (u8, CFlag, HFlag) {
    let carry = u8::from(carry);
    let sum = u16::from(l_value) + u16::from(r_value) + u16::from(carry);
    let h_flag = (l_value & 0x0F) + (r_value & 0x0F) + carry > 0x0F;

    (sum as u8, CFlag(sum > 0xFF), HFlag(h_flag))
}

fn sub(l_value: u8, r_value: u8, carry: bool) -> (u8, CFlag, HFlag) {
    let carry = u8::from(carry);
    let c_flag = u16::from(l_value) < u16::from(r_value) + u16::from(carry);
    let h_flag = u16::from(l_value & 0x0F) < u16::from(r_value & 0x0F) + u16::from(carry);
    let difference = l_value.wrapping_sub(r_value).wrapping_sub(carry);

    (difference, CFlag(c_flag), HFlag(h_flag))
}

fn add_u16(l_value: u16, r_value: u16) -> (u16, CFlag, HFlag) {
    let (sum, carry_flag) = l_value.overflowing_add(r_value);
    let h_flag = (l_value & 0x0FFF) + (r_value & 0x0FFF) > 0x0FFF;

    (sum, CFlag(carry_flag), HFlag(h_flag))
}

// Flags come from the unsigned byte; the sum uses the sign-extended offset
fn add_sp_offset(sp: u16, offset: u8) -> (u16, CFlag, HFlag) {
    let h_flag = (sp & 0x000F) + u16::from(offset & 0x0F) > 0x000F;
    let c_flag = (sp & 0x00FF) + u16::from(offset) > 0x00FF;
    let result = sp.wrapping_add(offset as i8 as u16);

    (result, CFlag(c_flag), HFlag(h_flag))
}

fn rotate_left(value: u8) -> (u8, CFlag) {
    let leftmost_set = value & 0x80 != 0;
    let new_value = (value << 1) | u8::from(leftmost_set);

    (new_value, CFlag(leftmost_set))
}

fn rotate_left_thru_carry(value: u8, carry: bool) -> (u8, CFlag) {
    let leftmost_set = value & 0x80 != 0;
    let new_value = (value << 1) | u8::from(carry);

    (new_value, CFlag(leftmost_set))
}

fn rotate_right(value: u8) -> (u8, CFlag) {
    let rightmost_set = value & 0x01 != 0;
    let new_value = (value >> 1) | (u8::from(rightmost_set) << 7);

    (new_value, CFlag(rightmost_set))
}

fn rotate_right_thru_carry(value: u8, carry: bool) -> (u8, CFlag) {
    let rightmost_set = value & 0x01 != 0;
    let new_value = (value >> 1) | (u8::from(carry) << 7);

    (new_value, CFlag(rightmost_set))
}

fn shift_left(value: u8) -> (u8, CFlag) {
    (value << 1, CFlag(value & 0x80 != 0))
}

fn shift_right_arithmetic(value: u8) -> (u8, CFlag) {
    ((value >> 1) | (value & 0x80), CFlag(value & 0x01 != 0))
}

fn shift_right_logical(value: u8) -> (u8, CFlag) {
    (value >> 1, CFlag(value & 0x01 != 0))
}

fn swap_bits(value: u8) -> u8 {
    (value >> 4) | (value << 4)
}

fn decimal_adjust_accumulator(registers: &mut CpuRegisters) {
    let mut value = u32::from(registers.accumulator);

    if registers.n_flag() {
        // Last op was subtraction
        if registers.h_flag() {
            value = value.wrapping_sub(0x06) & 0xFF;
        }
        if registers.c_flag() {
            value = value.wrapping_sub(0x60);
        }
    } else {
        // Last op was addition
        if value & 0x0F > 0x09 || registers.h_flag() {
            value += 0x06;
        }
        if value > 0x9F || registers.c_flag() {
            value += 0x60;
        }
    }

    // Carry, once set, is never cleared by DAA
    let carry_out = value & 0x100 != 0;
    let value = (value & 0xFF) as u8;
    registers.accumulator = value;
    registers.set_some_flags(
        Some(ZFlag(value == 0)),
        None,
        Some(HFlag(false)),
        carry_out.then_some(CFlag(true)),
    );
}

//
// Descriptor constructors, one per instruction family
//

fn nop() -> Opcode {
    Opcode::new("NOP", 0, 4, |_: &mut Hardware| {})
}

fn hang() -> Opcode {
    Opcode::new("HANG", 0, 4, |hw: &mut Hardware| {
        let opcode_address = hw.cpu.registers.pc.wrapping_sub(1);
        log::warn!("invalid opcode executed at {opcode_address:04X}, hanging CPU");
        hw.cpu.ime = false;
        hw.cpu.registers.pc = opcode_address;
    })
}

fn ld_r_r(dst: CpuRegister, src: CpuRegister) -> Opcode {
    Opcode::new(
        format!("LD {},{}", dst.name(), src.name()),
        0,
        4,
        move |hw: &mut Hardware| {
            let value = hw.cpu.registers.read_register(src);
            hw.cpu.registers.set_register(dst, value);
        },
    )
}

fn ld_r_hl_indirect(dst: CpuRegister) -> Opcode {
    Opcode::new(format!("LD {},(HL)", dst.name()), 0, 8, |_: &mut Hardware| {}).with_read(
        move |hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = memory::read8(hw, address);
            hw.cpu.registers.set_register(dst, value);
        },
    )
}

fn ld_hl_indirect_r(src: CpuRegister) -> Opcode {
    Opcode::new(format!("LD (HL),{}", src.name()), 0, 8, |_: &mut Hardware| {}).with_write(
        move |hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = hw.cpu.registers.read_register(src);
            memory::write8(hw, address, value);
        },
    )
}

fn ld_r_immediate(dst: CpuRegister) -> Opcode {
    Opcode::new(
        format!("LD {},$", dst.name()),
        1,
        8,
        move |hw: &mut Hardware| {
            let value = hw.cpu.value8;
            hw.cpu.registers.set_register(dst, value);
        },
    )
}

fn ld_hl_indirect_immediate() -> Opcode {
    Opcode::new("LD (HL),$", 1, 12, |_: &mut Hardware| {}).with_write(|hw: &mut Hardware| {
        let address = hw.cpu.registers.hl();
        let value = hw.cpu.value8;
        memory::write8(hw, address, value);
    })
}

fn ld_a_indirect(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(format!("LD A,({})", pair.name()), 0, 8, |_: &mut Hardware| {}).with_read(
        move |hw: &mut Hardware| {
            let address = hw.cpu.registers.read_register_pair(pair);
            hw.cpu.registers.accumulator = memory::read8(hw, address);
        },
    )
}

fn ld_indirect_a(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(format!("LD ({}),A", pair.name()), 0, 8, |_: &mut Hardware| {}).with_write(
        move |hw: &mut Hardware| {
            let address = hw.cpu.registers.read_register_pair(pair);
            let value = hw.cpu.registers.accumulator;
            memory::write8(hw, address, value);
        },
    )
}

fn ld_a_direct() -> Opcode {
    Opcode::new("LD A,($)", 2, 16, |_: &mut Hardware| {}).with_read(|hw: &mut Hardware| {
        let address = hw.cpu.value16;
        hw.cpu.registers.accumulator = memory::read8(hw, address);
    })
}

fn ld_direct_a() -> Opcode {
    Opcode::new("LD ($),A", 2, 16, |_: &mut Hardware| {}).with_write(|hw: &mut Hardware| {
        let address = hw.cpu.value16;
        let value = hw.cpu.registers.accumulator;
        memory::write8(hw, address, value);
    })
}

fn ldh_a_immediate() -> Opcode {
    Opcode::new("LD A,(FF00h+$)", 1, 12, |_: &mut Hardware| {}).with_read(|hw: &mut Hardware| {
        let address = 0xFF00 | u16::from(hw.cpu.value8);
        hw.cpu.registers.accumulator = memory::read8(hw, address);
    })
}

fn ldh_immediate_a() -> Opcode {
    Opcode::new("LD (FF00h+$),A", 1, 12, |_: &mut Hardware| {}).with_write(|hw: &mut Hardware| {
        let address = 0xFF00 | u16::from(hw.cpu.value8);
        let value = hw.cpu.registers.accumulator;
        memory::write8(hw, address, value);
    })
}

fn ldh_a_c() -> Opcode {
    Opcode::new("LD A,(FF00h+C)", 0, 8, |_: &mut Hardware| {}).with_read(|hw: &mut Hardware| {
        let address = 0xFF00 | u16::from(hw.cpu.registers.c);
        hw.cpu.registers.accumulator = memory::read8(hw, address);
    })
}

fn ldh_c_a() -> Opcode {
    Opcode::new("LD (FF00h+C),A", 0, 8, |_: &mut Hardware| {}).with_write(|hw: &mut Hardware| {
        let address = 0xFF00 | u16::from(hw.cpu.registers.c);
        let value = hw.cpu.registers.accumulator;
        memory::write8(hw, address, value);
    })
}

fn ld_a_hl_step(decrement: bool) -> Opcode {
    let mnemonic = if decrement { "LDD A,(HL)" } else { "LDI A,(HL)" };
    Opcode::new(mnemonic, 0, 8, |_: &mut Hardware| {}).with_read(move |hw: &mut Hardware| {
        let hl = hw.cpu.registers.hl();
        hw.cpu.registers.accumulator = memory::read8(hw, hl);
        let hl = if decrement {
            hl.wrapping_sub(1)
        } else {
            hl.wrapping_add(1)
        };
        hw.cpu.registers.set_hl(hl);
    })
}

fn ld_hl_step_a(decrement: bool) -> Opcode {
    let mnemonic = if decrement { "LDD (HL),A" } else { "LDI (HL),A" };
    Opcode::new(mnemonic, 0, 8, |_: &mut Hardware| {}).with_write(move |hw: &mut Hardware| {
        let hl = hw.cpu.registers.hl();
        let value = hw.cpu.registers.accumulator;
        memory::write8(hw, hl, value);
        let hl = if decrement {
            hl.wrapping_sub(1)
        } else {
            hl.wrapping_add(1)
        };
        hw.cpu.registers.set_hl(hl);
    })
}

fn ld_rr_immediate(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(
        format!("LD {},$", pair.name()),
        2,
        12,
        move |hw: &mut Hardware| {
            let value = hw.cpu.value16;
            hw.cpu.registers.set_register_pair(pair, value);
        },
    )
}

fn ld_direct_sp() -> Opcode {
    Opcode::new("LD ($),SP", 2, 20, |_: &mut Hardware| {}).with_write(|hw: &mut Hardware| {
        let address = hw.cpu.value16;
        let sp = hw.cpu.registers.sp;
        memory::write16(hw, address, sp);
    })
}

fn ld_sp_hl() -> Opcode {
    Opcode::new("LD SP,HL", 0, 8, |hw: &mut Hardware| {
        hw.cpu.registers.sp = hw.cpu.registers.hl();
    })
}

fn ld_hl_sp_offset() -> Opcode {
    Opcode::new("LD HL,SP+$", 1, 12, |hw: &mut Hardware| {
        let (value, c_flag, h_flag) = add_sp_offset(hw.cpu.registers.sp, hw.cpu.value8);
        hw.cpu.registers.set_hl(value);
        hw.cpu
            .registers
            .set_flags(ZFlag(false), NFlag(false), h_flag, c_flag);
    })
}

fn add_sp_immediate() -> Opcode {
    Opcode::new("ADD SP,$", 1, 16, |hw: &mut Hardware| {
        let (value, c_flag, h_flag) = add_sp_offset(hw.cpu.registers.sp, hw.cpu.value8);
        hw.cpu.registers.sp = value;
        hw.cpu
            .registers
            .set_flags(ZFlag(false), NFlag(false), h_flag, c_flag);
    })
}

fn push(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(
        format!("PUSH {}", pair.name()),
        0,
        16,
        move |hw: &mut Hardware| {
            let value = hw.cpu.registers.read_register_pair(pair);
            super::push_word(hw, value);
        },
    )
}

fn pop(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(
        format!("POP {}", pair.name()),
        0,
        12,
        move |hw: &mut Hardware| {
            let value = super::pop_word(hw);
            hw.cpu.registers.set_register_pair(pair, value);
        },
    )
}

fn alu_register(op: AluOp, src: CpuRegister) -> Opcode {
    Opcode::new(
        format!("{} {}", op.name(), src.name()),
        0,
        4,
        move |hw: &mut Hardware| {
            let value = hw.cpu.registers.read_register(src);
            op.apply(&mut hw.cpu.registers, value);
        },
    )
}

fn alu_hl_indirect(op: AluOp) -> Opcode {
    Opcode::new(format!("{} (HL)", op.name()), 0, 8, |_: &mut Hardware| {}).with_read(
        move |hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = memory::read8(hw, address);
            op.apply(&mut hw.cpu.registers, value);
        },
    )
}

fn alu_immediate(op: AluOp) -> Opcode {
    Opcode::new(format!("{} $", op.name()), 1, 8, move |hw: &mut Hardware| {
        let value = hw.cpu.value8;
        op.apply(&mut hw.cpu.registers, value);
    })
}

fn inc_register(r: CpuRegister) -> Opcode {
    Opcode::new(format!("INC {}", r.name()), 0, 4, move |hw: &mut Hardware| {
        let value = hw.cpu.registers.read_register(r);
        let (sum, _, h_flag) = add(value, 1, false);
        hw.cpu.registers.set_register(r, sum);
        hw.cpu.registers.set_some_flags(
            Some(ZFlag(sum == 0)),
            Some(NFlag(false)),
            Some(h_flag),
            None,
        );
    })
}

fn dec_register(r: CpuRegister) -> Opcode {
    Opcode::new(format!("DEC {}", r.name()), 0, 4, move |hw: &mut Hardware| {
        let value = hw.cpu.registers.read_register(r);
        let (difference, _, h_flag) = sub(value, 1, false);
        hw.cpu.registers.set_register(r, difference);
        hw.cpu.registers.set_some_flags(
            Some(ZFlag(difference == 0)),
            Some(NFlag(true)),
            Some(h_flag),
            None,
        );
    })
}

fn inc_hl_indirect() -> Opcode {
    Opcode::new("INC (HL)", 0, 12, |_: &mut Hardware| {})
        .with_read(|hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = memory::read8(hw, address);
            let (sum, _, h_flag) = add(value, 1, false);
            hw.cpu.registers.set_some_flags(
                Some(ZFlag(sum == 0)),
                Some(NFlag(false)),
                Some(h_flag),
                None,
            );
            hw.cpu.temp = sum;
        })
        .with_write(|hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = hw.cpu.temp;
            memory::write8(hw, address, value);
        })
}

fn dec_hl_indirect() -> Opcode {
    Opcode::new("DEC (HL)", 0, 12, |_: &mut Hardware| {})
        .with_read(|hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = memory::read8(hw, address);
            let (difference, _, h_flag) = sub(value, 1, false);
            hw.cpu.registers.set_some_flags(
                Some(ZFlag(difference == 0)),
                Some(NFlag(true)),
                Some(h_flag),
                None,
            );
            hw.cpu.temp = difference;
        })
        .with_write(|hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = hw.cpu.temp;
            memory::write8(hw, address, value);
        })
}

fn inc_rr(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(
        format!("INC {}", pair.name()),
        0,
        8,
        move |hw: &mut Hardware| {
            let value = hw.cpu.registers.read_register_pair(pair).wrapping_add(1);
            hw.cpu.registers.set_register_pair(pair, value);
        },
    )
}

fn dec_rr(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(
        format!("DEC {}", pair.name()),
        0,
        8,
        move |hw: &mut Hardware| {
            let value = hw.cpu.registers.read_register_pair(pair).wrapping_sub(1);
            hw.cpu.registers.set_register_pair(pair, value);
        },
    )
}

fn add_hl_rr(pair: CpuRegisterPair) -> Opcode {
    Opcode::new(
        format!("ADD HL,{}", pair.name()),
        0,
        8,
        move |hw: &mut Hardware| {
            let r_value = hw.cpu.registers.read_register_pair(pair);
            let (sum, c_flag, h_flag) = add_u16(hw.cpu.registers.hl(), r_value);
            hw.cpu.registers.set_hl(sum);
            hw.cpu
                .registers
                .set_some_flags(None, Some(NFlag(false)), Some(h_flag), Some(c_flag));
        },
    )
}

fn rotate_accumulator(op: ShiftOp) -> Opcode {
    let mnemonic = match op {
        ShiftOp::Rlc => "RLCA",
        ShiftOp::Rrc => "RRCA",
        ShiftOp::Rl => "RLA",
        ShiftOp::Rr => "RRA",
        _ => unreachable!("only rotates exist in accumulator form"),
    };
    Opcode::new(mnemonic, 0, 4, move |hw: &mut Hardware| {
        let value = hw.cpu.registers.accumulator;
        let result = op.apply(&mut hw.cpu.registers, value);
        hw.cpu.registers.accumulator = result;
        // The accumulator rotates clear Z regardless of the result
        hw.cpu
            .registers
            .set_some_flags(Some(ZFlag(false)), None, None, None);
    })
}

fn daa() -> Opcode {
    Opcode::new("DAA", 0, 4, |hw: &mut Hardware| {
        decimal_adjust_accumulator(&mut hw.cpu.registers);
    })
}

fn cpl() -> Opcode {
    Opcode::new("CPL", 0, 4, |hw: &mut Hardware| {
        hw.cpu.registers.accumulator = !hw.cpu.registers.accumulator;
        hw.cpu
            .registers
            .set_some_flags(None, Some(NFlag(true)), Some(HFlag(true)), None);
    })
}

fn scf() -> Opcode {
    Opcode::new("SCF", 0, 4, |hw: &mut Hardware| {
        hw.cpu
            .registers
            .set_some_flags(None, Some(NFlag(false)), Some(HFlag(false)), Some(CFlag(true)));
    })
}

fn ccf() -> Opcode {
    Opcode::new("CCF", 0, 4, |hw: &mut Hardware| {
        let carry = hw.cpu.registers.c_flag();
        hw.cpu.registers.set_some_flags(
            None,
            Some(NFlag(false)),
            Some(HFlag(false)),
            Some(CFlag(!carry)),
        );
    })
}

fn jp_immediate() -> Opcode {
    Opcode::new("JP $", 2, 16, |hw: &mut Hardware| {
        hw.cpu.registers.pc = hw.cpu.value16;
    })
}

fn jp_conditional(cc: JumpCondition) -> Opcode {
    Opcode::new(format!("JP {},$", cc.name()), 2, 12, move |hw: &mut Hardware| {
        if cc.check(&hw.cpu.registers) {
            hw.cpu.registers.pc = hw.cpu.value16;
            hw.cpu.jumped = true;
        }
    })
    .with_jump(4)
}

fn jp_hl() -> Opcode {
    Opcode::new("JP HL", 0, 4, |hw: &mut Hardware| {
        hw.cpu.registers.pc = hw.cpu.registers.hl();
    })
}

fn jr_immediate() -> Opcode {
    Opcode::new("JR $", 1, 12, |hw: &mut Hardware| {
        let offset = hw.cpu.value8 as i8;
        hw.cpu.registers.pc = hw.cpu.registers.pc.wrapping_add(offset as u16);
    })
}

fn jr_conditional(cc: JumpCondition) -> Opcode {
    Opcode::new(format!("JR {},$", cc.name()), 1, 8, move |hw: &mut Hardware| {
        if cc.check(&hw.cpu.registers) {
            let offset = hw.cpu.value8 as i8;
            hw.cpu.registers.pc = hw.cpu.registers.pc.wrapping_add(offset as u16);
            hw.cpu.jumped = true;
        }
    })
    .with_jump(4)
}

fn call_immediate() -> Opcode {
    Opcode::new("CALL $", 2, 24, |hw: &mut Hardware| {
        let pc = hw.cpu.registers.pc;
        super::push_word(hw, pc);
        hw.cpu.registers.pc = hw.cpu.value16;
    })
}

fn call_conditional(cc: JumpCondition) -> Opcode {
    Opcode::new(
        format!("CALL {},$", cc.name()),
        2,
        12,
        move |hw: &mut Hardware| {
            if cc.check(&hw.cpu.registers) {
                let pc = hw.cpu.registers.pc;
                super::push_word(hw, pc);
                hw.cpu.registers.pc = hw.cpu.value16;
                hw.cpu.jumped = true;
            }
        },
    )
    .with_jump(12)
}

fn ret() -> Opcode {
    Opcode::new("RET", 0, 16, |hw: &mut Hardware| {
        hw.cpu.registers.pc = super::pop_word(hw);
    })
}

fn ret_conditional(cc: JumpCondition) -> Opcode {
    Opcode::new(format!("RET {}", cc.name()), 0, 8, move |hw: &mut Hardware| {
        if cc.check(&hw.cpu.registers) {
            hw.cpu.registers.pc = super::pop_word(hw);
            hw.cpu.jumped = true;
        }
    })
    .with_jump(12)
}

fn reti() -> Opcode {
    Opcode::new("RETI", 0, 16, |hw: &mut Hardware| {
        hw.cpu.ime = true;
        hw.cpu.registers.pc = super::pop_word(hw);
    })
}

fn rst(target: u8) -> Opcode {
    Opcode::new(format!("RST {target:02X}h"), 0, 16, move |hw: &mut Hardware| {
        let pc = hw.cpu.registers.pc;
        super::push_word(hw, pc);
        hw.cpu.registers.pc = u16::from(target);
    })
}

fn halt() -> Opcode {
    Opcode::new("HALT", 0, 4, |hw: &mut Hardware| {
        hw.cpu.halted = true;
    })
}

fn stop() -> Opcode {
    Opcode::new("STOP", 0, 4, |hw: &mut Hardware| {
        super::stop(hw);
    })
}

fn di() -> Opcode {
    Opcode::new("DI", 0, 4, |hw: &mut Hardware| {
        hw.cpu.ime = false;
    })
}

fn ei() -> Opcode {
    // Interrupts are enabled immediately; the hardware's one-instruction
    // delay is not modeled
    Opcode::new("EI", 0, 4, |hw: &mut Hardware| {
        hw.cpu.ime = true;
    })
}

fn shift_register(op: ShiftOp, r: CpuRegister) -> Opcode {
    Opcode::new(
        format!("{} {}", op.name(), r.name()),
        0,
        8,
        move |hw: &mut Hardware| {
            let value = hw.cpu.registers.read_register(r);
            let result = op.apply(&mut hw.cpu.registers, value);
            hw.cpu.registers.set_register(r, result);
        },
    )
}

fn shift_hl_indirect(op: ShiftOp) -> Opcode {
    Opcode::new(format!("{} (HL)", op.name()), 0, 16, |_: &mut Hardware| {})
        .with_read(move |hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = memory::read8(hw, address);
            hw.cpu.temp = op.apply(&mut hw.cpu.registers, value);
        })
        .with_write(|hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = hw.cpu.temp;
            memory::write8(hw, address, value);
        })
}

fn test_bit_register(bit: u8, r: CpuRegister) -> Opcode {
    Opcode::new(
        format!("BIT {bit},{}", r.name()),
        0,
        8,
        move |hw: &mut Hardware| {
            let value = hw.cpu.registers.read_register(r);
            let z_flag = ZFlag(value & (1 << bit) == 0);
            hw.cpu
                .registers
                .set_some_flags(Some(z_flag), Some(NFlag(false)), Some(HFlag(true)), None);
        },
    )
}

fn test_bit_hl_indirect(bit: u8) -> Opcode {
    Opcode::new(format!("BIT {bit},(HL)"), 0, 12, |_: &mut Hardware| {}).with_read(
        move |hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = memory::read8(hw, address);
            let z_flag = ZFlag(value & (1 << bit) == 0);
            hw.cpu
                .registers
                .set_some_flags(Some(z_flag), Some(NFlag(false)), Some(HFlag(true)), None);
        },
    )
}

fn set_bit_register(set: bool, bit: u8, r: CpuRegister) -> Opcode {
    let mnemonic = format!("{} {bit},{}", if set { "SET" } else { "RES" }, r.name());
    Opcode::new(mnemonic, 0, 8, move |hw: &mut Hardware| {
        let value = hw.cpu.registers.read_register(r);
        let result = if set {
            value | (1 << bit)
        } else {
            value & !(1 << bit)
        };
        hw.cpu.registers.set_register(r, result);
    })
}

fn set_bit_hl_indirect(set: bool, bit: u8) -> Opcode {
    let mnemonic = format!("{} {bit},(HL)", if set { "SET" } else { "RES" });
    Opcode::new(mnemonic, 0, 16, |_: &mut Hardware| {})
        .with_read(move |hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = memory::read8(hw, address);
            hw.cpu.temp = if set {
                value | (1 << bit)
            } else {
                value & !(1 << bit)
            };
        })
        .with_write(|hw: &mut Hardware| {
            let address = hw.cpu.registers.hl();
            let value = hw.cpu.temp;
            memory::write8(hw, address, value);
        })
}

fn build_base_table() -> Vec<Opcode> {
    let mut table: Vec<Option<Opcode>> = std::iter::repeat_with(|| None).take(256).collect();

    // LD r,r' block; 110 operand bits select (HL), 0x76 would be LD (HL),(HL)
    // and encodes HALT instead
    for byte in 0x40..=0x7F_u8 {
        if byte == 0x76 {
            continue;
        }
        let dst = CpuRegister::from_mid_opcode_bits(byte);
        let src = CpuRegister::from_low_opcode_bits(byte);
        table[usize::from(byte)] = Some(match (dst, src) {
            (Some(dst), Some(src)) => ld_r_r(dst, src),
            (Some(dst), None) => ld_r_hl_indirect(dst),
            (None, Some(src)) => ld_hl_indirect_r(src),
            (None, None) => unreachable!("0x76 is skipped above"),
        });
    }

    // ALU operation axis: register forms, then the immediate column
    for byte in 0x80..=0xBF_u8 {
        let op = AluOp::from_mid_opcode_bits(byte);
        table[usize::from(byte)] = Some(match CpuRegister::from_low_opcode_bits(byte) {
            Some(src) => alu_register(op, src),
            None => alu_hl_indirect(op),
        });
    }
    for (i, &op) in ALU_OPS.iter().enumerate() {
        table[0xC6 + 8 * i] = Some(alu_immediate(op));
    }

    // INC/DEC/LD-immediate over the mid-bits register axis
    for code in 0..8_u8 {
        let row = usize::from(code) << 3;
        match CpuRegister::from_mid_opcode_bits(code << 3) {
            Some(r) => {
                table[row | 0x04] = Some(inc_register(r));
                table[row | 0x05] = Some(dec_register(r));
                table[row | 0x06] = Some(ld_r_immediate(r));
            }
            None => {
                table[0x34] = Some(inc_hl_indirect());
                table[0x35] = Some(dec_hl_indirect());
                table[0x36] = Some(ld_hl_indirect_immediate());
            }
        }
    }

    // 16-bit register pair axis
    use CpuRegisterPair::{AF, BC, DE, HL, SP};
    for (i, &pair) in [BC, DE, HL, SP].iter().enumerate() {
        let row = i << 4;
        table[row | 0x01] = Some(ld_rr_immediate(pair));
        table[row | 0x03] = Some(inc_rr(pair));
        table[row | 0x09] = Some(add_hl_rr(pair));
        table[row | 0x0B] = Some(dec_rr(pair));
    }
    for (i, &pair) in [BC, DE, HL, AF].iter().enumerate() {
        table[0xC1 + (i << 4)] = Some(pop(pair));
        table[0xC5 + (i << 4)] = Some(push(pair));
    }

    // Condition axis
    for (i, &cc) in CONDITIONS.iter().enumerate() {
        table[0x20 + 8 * i] = Some(jr_conditional(cc));
        table[0xC0 + 8 * i] = Some(ret_conditional(cc));
        table[0xC2 + 8 * i] = Some(jp_conditional(cc));
        table[0xC4 + 8 * i] = Some(call_conditional(cc));
    }

    // Restart vector axis
    for i in 0..8_usize {
        table[0xC7 + 8 * i] = Some(rst((8 * i) as u8));
    }

    // Irregular encodings
    table[0x00] = Some(nop());
    table[0x02] = Some(ld_indirect_a(BC));
    table[0x07] = Some(rotate_accumulator(ShiftOp::Rlc));
    table[0x08] = Some(ld_direct_sp());
    table[0x0A] = Some(ld_a_indirect(BC));
    table[0x0F] = Some(rotate_accumulator(ShiftOp::Rrc));
    table[0x10] = Some(stop());
    table[0x12] = Some(ld_indirect_a(DE));
    table[0x17] = Some(rotate_accumulator(ShiftOp::Rl));
    table[0x18] = Some(jr_immediate());
    table[0x1A] = Some(ld_a_indirect(DE));
    table[0x1F] = Some(rotate_accumulator(ShiftOp::Rr));
    table[0x22] = Some(ld_hl_step_a(false));
    table[0x27] = Some(daa());
    table[0x2A] = Some(ld_a_hl_step(false));
    table[0x2F] = Some(cpl());
    table[0x32] = Some(ld_hl_step_a(true));
    table[0x37] = Some(scf());
    table[0x3A] = Some(ld_a_hl_step(true));
    table[0x3F] = Some(ccf());
    table[0x76] = Some(halt());
    table[0xC3] = Some(jp_immediate());
    table[0xC9] = Some(ret());
    table[0xCD] = Some(call_immediate());
    table[0xD9] = Some(reti());
    table[0xE0] = Some(ldh_immediate_a());
    table[0xE2] = Some(ldh_c_a());
    table[0xE8] = Some(add_sp_immediate());
    table[0xE9] = Some(jp_hl());
    table[0xEA] = Some(ld_direct_a());
    table[0xF0] = Some(ldh_a_immediate());
    table[0xF2] = Some(ldh_a_c());
    table[0xF3] = Some(di());
    table[0xF8] = Some(ld_hl_sp_offset());
    table[0xF9] = Some(ld_sp_hl());
    table[0xFA] = Some(ld_a_direct());
    table[0xFB] = Some(ei());

    // Everything left is an invalid encoding that hangs the CPU (0xCB is in
    // this set too; the fetch logic dispatches it to the prefixed table and
    // never executes the placeholder)
    table
        .into_iter()
        .map(|entry| entry.unwrap_or_else(hang))
        .collect()
}

fn build_cb_table() -> Vec<Opcode> {
    let mut table = Vec::with_capacity(256);

    // Shift/rotate axis, then BIT/RES/SET with the bit-index axis
    for byte in 0x00..=0xFF_u8 {
        let operand = CpuRegister::from_low_opcode_bits(byte);
        let bit = (byte >> 3) & 0x07;
        let opcode = match byte >> 6 {
            0 => {
                let op = SHIFT_OPS[usize::from(bit)];
                match operand {
                    Some(r) => shift_register(op, r),
                    None => shift_hl_indirect(op),
                }
            }
            1 => match operand {
                Some(r) => test_bit_register(bit, r),
                None => test_bit_hl_indirect(bit),
            },
            2 | 3 => {
                let set = byte >> 6 == 3;
                match operand {
                    Some(r) => set_bit_register(set, bit, r),
                    None => set_bit_hl_indirect(set, bit),
                }
            }
            _ => unreachable!(),
        };
        table.push(opcode);
    }

    table
}
