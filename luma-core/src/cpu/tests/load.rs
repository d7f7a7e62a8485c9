use super::{hash_map, run_test, set_in_state, ExpectedState, ALL_REGISTERS};

#[test]
fn ld_register_immediate() {
    for r in ALL_REGISTERS {
        let load_opcode = 0x06 | (r.to_opcode_bits() << 3);

        let mut expected = ExpectedState::empty();
        set_in_state(&mut expected, r, 0x42);

        run_test(&format!("{load_opcode:02x}42"), &expected);
    }
}

#[test]
fn ld_register_register() {
    for src in ALL_REGISTERS {
        for dst in ALL_REGISTERS {
            let load_imm = 0x06 | (src.to_opcode_bits() << 3);
            let load_rr = 0x40 | (dst.to_opcode_bits() << 3) | src.to_opcode_bits();

            let mut expected = ExpectedState::empty();
            set_in_state(&mut expected, dst, 0x99);

            run_test(&format!("{load_imm:02x}99{load_rr:02x}"), &expected);
        }
    }
}

#[test]
fn ld_indirect_hl() {
    run_test(
        // LD HL, 0xC000 ; LD (HL), 0x77 ; LD A, (HL)
        "2100C036777E",
        &ExpectedState {
            a: Some(0x77),
            memory: hash_map!(0xC000: 0x77),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC000 ; LD B, 0x3C ; LD (HL), B ; LD D, (HL)
        "2100C0063C7056",
        &ExpectedState {
            d: Some(0x3C),
            memory: hash_map!(0xC000: 0x3C),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ld_with_increment_and_decrement() {
    run_test(
        // LD HL, 0xC000 ; LD A, 0x11 ; LDI (HL), A ; LD (HL), A
        "2100C03E112277",
        &ExpectedState {
            l: Some(0x01),
            memory: hash_map!(0xC000: 0x11, 0xC001: 0x11),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC001 ; LD A, 0x22 ; LDD (HL), A ; LD (HL), A
        "2101C03E223277",
        &ExpectedState {
            l: Some(0x00),
            memory: hash_map!(0xC000: 0x22, 0xC001: 0x22),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC000 ; LD (HL), 0x5A ; LDI A, (HL)
        "2100C0365A2A",
        &ExpectedState {
            a: Some(0x5A),
            l: Some(0x01),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC001 ; LD (HL), 0xA5 ; LDD A, (HL)
        "2101C036A53A",
        &ExpectedState {
            a: Some(0xA5),
            l: Some(0x00),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ld_indirect_bc_de() {
    run_test(
        // LD BC, 0xC010 ; LD A, 0x99 ; LD (BC), A
        "0110C03E9902",
        &ExpectedState {
            memory: hash_map!(0xC010: 0x99),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD DE, 0xC020 ; LD A, 0x5F ; LD (DE), A ; LD A, 0x00 ; LD A, (DE)
        "1120C03E5F123E001A",
        &ExpectedState {
            a: Some(0x5F),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ldh() {
    run_test(
        // LD A, 0x77 ; LDH (0x80), A ; LD A, 0x00 ; LDH A, (0x80)
        "3E77E0803E00F080",
        &ExpectedState {
            a: Some(0x77),
            memory: hash_map!(0xFF80: 0x77),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD C, 0x81 ; LD A, 0x66 ; LD (FF00h+C), A ; LD A, 0x00 ;
        // LD A, (FF00h+C)
        "0E813E66E23E00F2",
        &ExpectedState {
            a: Some(0x66),
            memory: hash_map!(0xFF81: 0x66),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ld_direct() {
    run_test(
        // LD A, 0x42 ; LD (0xC134), A ; LD A, 0x00 ; LD A, (0xC134)
        "3E42EA34C13E00FA34C1",
        &ExpectedState {
            a: Some(0x42),
            memory: hash_map!(0xC134: 0x42),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ld_register_pair_immediate() {
    run_test(
        // LD BC, 0x1234 ; LD DE, 0x5678 ; LD HL, 0x9ABC ; LD SP, 0xDFFE
        "01341211785621BC9A31FEDF",
        &ExpectedState {
            b: Some(0x12),
            c: Some(0x34),
            d: Some(0x56),
            e: Some(0x78),
            h: Some(0x9A),
            l: Some(0xBC),
            sp: Some(0xDFFE),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn push_and_pop() {
    run_test(
        // LD HL, 0xABCD ; PUSH HL ; POP DE
        "21CDABE5D1",
        &ExpectedState {
            d: Some(0xAB),
            e: Some(0xCD),
            sp: Some(0xFFFE),
            memory: hash_map!(0xFFFC: 0xCD, 0xFFFD: 0xAB),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD BC, 0x12FF ; PUSH BC ; POP AF -- F's low nibble cannot be set
        "01FF12C5F1",
        &ExpectedState {
            a: Some(0x12),
            f: Some(0xF0),
            sp: Some(0xFFFE),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ld_direct_stack_pointer() {
    run_test(
        // LD SP, 0xC355 ; LD (0xC160), SP
        "3155C30860C1",
        &ExpectedState {
            sp: Some(0xC355),
            memory: hash_map!(0xC160: 0x55, 0xC161: 0xC3),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ld_stack_pointer_hl() {
    run_test(
        // LD HL, 0xD000 ; LD SP, HL
        "2100D0F9",
        &ExpectedState {
            sp: Some(0xD000),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn ld_hl_stack_pointer_offset() {
    run_test(
        // LD SP, 0xFFF8 ; LD HL, SP+0x08
        "31F8FFF808",
        &ExpectedState {
            h: Some(0x00),
            l: Some(0x00),
            sp: Some(0xFFF8),
            f: Some(0x30),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD SP, 0xD005 ; LD HL, SP-0x05
        "3105D0F8FB",
        &ExpectedState {
            h: Some(0xD0),
            l: Some(0x00),
            f: Some(0x30),
            ..ExpectedState::empty()
        },
    );
}
