use super::{hash_map, run_test, ExpectedState};

#[test]
fn accumulator_rotates() {
    run_test(
        // LD A, 0x85 ; RLCA
        "3E8507",
        &ExpectedState {
            a: Some(0x0B),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD A, 0x95 ; SCF ; RLA -- carry rotates in from the right
        "3E953717",
        &ExpectedState {
            a: Some(0x2B),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD A, 0x3B ; RRCA
        "3E3B0F",
        &ExpectedState {
            a: Some(0x9D),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD A, 0xA1 ; OR A ; RRA -- carry was cleared by OR
        "3EA1B71F",
        &ExpectedState {
            a: Some(0x50),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD A, 0x00 ; RLCA -- unlike the CB rotates, Z stays clear
        "3E0007",
        &ExpectedState {
            a: Some(0x00),
            f: Some(0x00),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn cb_rotates_and_shifts() {
    run_test(
        // LD B, 0x80 ; SLA B -- the only bit shifts out
        "0680CB20",
        &ExpectedState {
            b: Some(0x00),
            f: Some(0x90),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD C, 0x81 ; SRA C -- bit 7 is preserved
        "0E81CB29",
        &ExpectedState {
            c: Some(0xC0),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD D, 0x81 ; SRL D -- bit 7 is not
        "1681CB3A",
        &ExpectedState {
            d: Some(0x40),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD B, 0x85 ; RLC B
        "0685CB00",
        &ExpectedState {
            b: Some(0x0B),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD E, 0x01 ; SCF ; RR E -- carry in at the top, carry out below
        "1E0137CB1B",
        &ExpectedState {
            e: Some(0x80),
            f: Some(0x10),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn swap() {
    run_test(
        // LD E, 0xF0 ; SWAP E
        "1EF0CB33",
        &ExpectedState {
            e: Some(0x0F),
            f: Some(0x00),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD H, 0x00 ; SWAP H -- zero result sets Z, everything else clears
        "2600CB34",
        &ExpectedState {
            h: Some(0x00),
            f: Some(0x80),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn shifts_on_indirect_hl() {
    run_test(
        // LD HL, 0xC123 ; LD (HL), 0x85 ; RLC (HL)
        "2123C13685CB06",
        &ExpectedState {
            f: Some(0x10),
            memory: hash_map!(0xC123: 0x0B),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC123 ; LD (HL), 0x02 ; SRL (HL)
        "2123C13602CB3E",
        &ExpectedState {
            f: Some(0x00),
            memory: hash_map!(0xC123: 0x01),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn test_bit() {
    run_test(
        // LD A, 0x04 ; BIT 3, A -- bit clear sets Z; carry keeps boot value
        "3E04CB5F",
        &ExpectedState {
            a: Some(0x04),
            f: Some(0xB0),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD A, 0x04 ; BIT 2, A
        "3E04CB57",
        &ExpectedState {
            a: Some(0x04),
            f: Some(0x30),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC200 ; LD (HL), 0x80 ; BIT 7, (HL)
        "2100C23680CB7E",
        &ExpectedState {
            f: Some(0x30),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn set_and_reset_bit() {
    run_test(
        // LD B, 0xFF ; RES 0, B -- flags untouched
        "06FFCB80",
        &ExpectedState {
            b: Some(0xFE),
            f: Some(0xB0),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD C, 0x00 ; SET 6, C
        "0E00CBF1",
        &ExpectedState {
            c: Some(0x40),
            f: Some(0xB0),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC300 ; SET 7, (HL) ; RES 7, (HL) on a fresh cell
        "2100C3CBFE",
        &ExpectedState {
            memory: hash_map!(0xC300: 0x80),
            ..ExpectedState::empty()
        },
    );

    run_test(
        // LD HL, 0xC300 ; LD (HL), 0xFF ; RES 4, (HL)
        "2100C336FFCBA6",
        &ExpectedState {
            memory: hash_map!(0xC300: 0xEF),
            ..ExpectedState::empty()
        },
    );
}
