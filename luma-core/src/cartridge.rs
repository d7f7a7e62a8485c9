use crate::memory::address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("ROM image too small: {len} bytes, must be at least 32768")]
    RomTooShort { len: usize },
    #[error("unsupported cartridge type byte in header: {value:#04X}")]
    UnsupportedCartridgeType { value: u8 },
    #[error("invalid ROM size byte in header: {value:#04X}")]
    InvalidRomSize { value: u8 },
    #[error("invalid RAM size byte in header: {value:#04X}")]
    InvalidRamSize { value: u8 },
}

const NINTENDO_LOGO: [u8; 0x30] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

/// Cartridge header fields, parsed once when the cartridge is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    pub title: String,
    pub manufacturer: Option<String>,
    pub licensee: String,
    pub cgb: bool,
    pub sgb: bool,
    pub cartridge_type: u8,
    pub rom_size: usize,
    pub ram_size: usize,
    pub japanese: bool,
    pub version: u8,
    pub header_checksum: u8,
    pub header_checksum_valid: bool,
    pub global_checksum: u16,
    pub global_checksum_valid: bool,
    pub valid_logo: bool,
}

impl RomHeader {
    fn parse(data: &[u8]) -> Result<Self, CartridgeError> {
        let byte = |addr: u16| data[addr as usize];

        let valid_logo = data[address::LOGO_START as usize..][..NINTENDO_LOGO.len()]
            == NINTENDO_LOGO;

        // Cartridges with the "new licensee" marker use a shorter title field
        // because the manufacturer code and CGB flag overlap the old one
        let new_licensee = byte(address::OLD_LICENSEE) == 0x33;
        let title_len = if new_licensee { 11 } else { 15 };
        let title_bytes = &data[address::TITLE_START as usize..][..title_len];
        let title = title_bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| char::from(b))
            .collect();

        let manufacturer = new_licensee.then(|| {
            data[address::MANUFACTURER_START as usize..][..4]
                .iter()
                .take_while(|&&b| b != 0)
                .map(|&b| char::from(b))
                .collect()
        });

        let licensee = if new_licensee {
            data[address::NEW_LICENSEE_START as usize..][..2]
                .iter()
                .map(|&b| char::from(b))
                .collect()
        } else {
            format!("{:02X} (old)", byte(address::OLD_LICENSEE))
        };

        let cgb_flag = byte(address::CGB_SUPPORT);
        let cgb = cgb_flag == 0x80 || cgb_flag == 0xC0;
        let sgb = byte(address::SGB_SUPPORT) == 0x03;

        let rom_size_byte = byte(address::ROM_SIZE);
        let rom_size = match rom_size_byte {
            0..=7 => (32 * 1024) << rom_size_byte,
            0x52 => 16 * 1024 * 72,
            0x53 => 16 * 1024 * 80,
            0x54 => 16 * 1024 * 96,
            value => return Err(CartridgeError::InvalidRomSize { value }),
        };

        let ram_size_byte = byte(address::RAM_SIZE);
        let ram_size = match ram_size_byte {
            0 => 0,
            1 => 2 * 1024,
            2 => 8 * 1024,
            3 => 32 * 1024,
            value => return Err(CartridgeError::InvalidRamSize { value }),
        };

        let header_checksum = byte(address::HEADER_CHECKSUM);
        let computed = (address::TITLE_START..=address::ROM_VERSION)
            .fold(0u8, |sum, addr| sum.wrapping_sub(byte(addr)).wrapping_sub(1));
        let header_checksum_valid = header_checksum == computed;

        let global_checksum = u16::from_be_bytes([
            byte(address::GLOBAL_CHECKSUM),
            byte(address::GLOBAL_CHECKSUM + 1),
        ]);
        let computed: u16 = data
            .iter()
            .enumerate()
            .filter(|&(i, _)| {
                i != address::GLOBAL_CHECKSUM as usize && i != address::GLOBAL_CHECKSUM as usize + 1
            })
            .fold(0u16, |sum, (_, &b)| sum.wrapping_add(u16::from(b)));
        let global_checksum_valid = global_checksum == computed;

        Ok(Self {
            title,
            manufacturer,
            licensee,
            cgb,
            sgb,
            cartridge_type: byte(address::CARTRIDGE_TYPE),
            rom_size,
            ram_size,
            japanese: byte(address::DESTINATION) == 0x00,
            version: byte(address::ROM_VERSION),
            header_checksum,
            header_checksum_valid,
            global_checksum,
            global_checksum_valid,
            valid_logo,
        })
    }
}

/// Memory bank controller state.
///
/// Writes into the 0x0000-0x7FFF ROM window never modify the ROM; they are
/// register writes that reconfigure banking.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mbc {
    RomOnly,
    Mbc1 {
        ram_enabled: bool,
        rom_bank_low: u8,
        ram_rom_bank: u8,
        ram_select_mode: bool,
    },
    Mbc5 {
        ram_enabled: bool,
        rom_bank: u16,
        ram_bank: u8,
    },
}

impl Mbc {
    // External RAM is sized to the full window the controller can address,
    // independent of the header's RAM size field
    fn addressable_ram(&self) -> usize {
        match self {
            Self::RomOnly => 8 * 1024,
            Self::Mbc1 { .. } => 32 * 1024,
            Self::Mbc5 { .. } => 128 * 1024,
        }
    }
}

pub struct Cartridge {
    header: RomHeader,
    rom: Vec<u8>,
    ram: Vec<u8>,
    mbc: Mbc,
}

impl Cartridge {
    /// Parses the header and constructs the cartridge with its bank
    /// controller.
    ///
    /// Fails when the image is shorter than 32 KiB, when a size field is out
    /// of range, or when the cartridge type byte names a controller this
    /// engine does not implement.
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() < 0x8000 {
            return Err(CartridgeError::RomTooShort { len: rom.len() });
        }

        let header = RomHeader::parse(&rom)?;

        let mbc = match header.cartridge_type {
            // ROM only (may still carry a little RAM)
            0x00 => Mbc::RomOnly,
            // MBC1 / MBC1+RAM / MBC1+RAM+BATTERY
            0x01..=0x03 => Mbc::Mbc1 {
                ram_enabled: false,
                rom_bank_low: 0,
                ram_rom_bank: 0,
                ram_select_mode: false,
            },
            // MBC5 / MBC5+RAM / MBC5+RAM+BATTERY
            0x19..=0x1B => Mbc::Mbc5 {
                ram_enabled: false,
                rom_bank: 0,
                ram_bank: 0,
            },
            value => return Err(CartridgeError::UnsupportedCartridgeType { value }),
        };

        log::info!(
            "loaded cartridge '{}' (type {:#04X}, {} bytes ROM, {} bytes RAM declared)",
            header.title,
            header.cartridge_type,
            header.rom_size,
            header.ram_size
        );
        if !header.valid_logo {
            log::warn!("cartridge logo bytes do not match, the ROM may be corrupt");
        }
        if !header.header_checksum_valid {
            log::warn!("cartridge header checksum mismatch");
        }
        if !header.global_checksum_valid {
            log::debug!("cartridge global checksum mismatch");
        }

        let ram = vec![0; mbc.addressable_ram()];

        Ok(Self {
            header,
            rom,
            ram,
            mbc,
        })
    }

    pub fn header(&self) -> &RomHeader {
        &self.header
    }

    fn rom_byte(&self, offset: usize) -> u8 {
        match self.rom.get(offset) {
            Some(&byte) => byte,
            None => {
                log::warn!("read past end of ROM at offset {offset:#X}");
                0
            }
        }
    }

    // Effective switchable bank for reads from 0x4000-0x7FFF
    fn rom_bank(&self) -> usize {
        match self.mbc {
            Mbc::RomOnly => 1,
            Mbc::Mbc1 {
                rom_bank_low,
                ram_rom_bank,
                ram_select_mode,
                ..
            } => {
                let mut bank = usize::from(rom_bank_low);
                if bank == 0 {
                    bank = 1;
                }
                if !ram_select_mode {
                    bank |= usize::from(ram_rom_bank) << 5;
                }
                bank
            }
            // Bank 0 is a legal selection on MBC5
            Mbc::Mbc5 { rom_bank, .. } => usize::from(rom_bank),
        }
    }

    fn ram_offset(&self, addr: u16) -> usize {
        let relative = usize::from(addr - address::EXTERNAL_RAM_START);
        let bank = match self.mbc {
            Mbc::RomOnly => 0,
            Mbc::Mbc1 {
                ram_rom_bank,
                ram_select_mode,
                ..
            } => {
                if ram_select_mode {
                    usize::from(ram_rom_bank)
                } else {
                    0
                }
            }
            Mbc::Mbc5 { ram_bank, .. } => usize::from(ram_bank),
        };
        let offset = relative + bank * usize::from(address::EXTERNAL_RAM_BANK_SIZE);
        debug_assert!(offset < self.ram.len());
        offset
    }

    fn ram_enabled(&self) -> bool {
        match self.mbc {
            Mbc::RomOnly => true,
            Mbc::Mbc1 { ram_enabled, .. } | Mbc::Mbc5 { ram_enabled, .. } => ram_enabled,
        }
    }

    pub(crate) fn try_read(&self, addr: u16) -> Option<u8> {
        match addr {
            address::ROM_START..=0x3FFF => Some(self.rom_byte(usize::from(addr))),
            address::SWITCHABLE_ROM_START..=address::ROM_END => {
                let offset = usize::from(addr - address::SWITCHABLE_ROM_START)
                    + self.rom_bank() * usize::from(address::ROM_BANK_SIZE);
                Some(self.rom_byte(offset))
            }
            address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                if self.ram_enabled() {
                    Some(self.ram[self.ram_offset(addr)])
                } else {
                    log::debug!("cartridge RAM read at {addr:04X} while disabled");
                    Some(0)
                }
            }
            _ => None,
        }
    }

    pub(crate) fn try_write(&mut self, addr: u16, value: u8) -> bool {
        match addr {
            address::ROM_START..=address::ROM_END => {
                self.write_mbc_register(addr, value);
                true
            }
            address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                if self.ram_enabled() {
                    let offset = self.ram_offset(addr);
                    self.ram[offset] = value;
                } else {
                    log::debug!("cartridge RAM write at {addr:04X} while disabled ignored");
                }
                true
            }
            _ => false,
        }
    }

    fn write_mbc_register(&mut self, addr: u16, value: u8) {
        match &mut self.mbc {
            Mbc::RomOnly => {}
            Mbc::Mbc1 {
                ram_enabled,
                rom_bank_low,
                ram_rom_bank,
                ram_select_mode,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = value & 0x0F == 0x0A,
                0x2000..=0x3FFF => *rom_bank_low = value & 0x1F,
                0x4000..=0x5FFF => *ram_rom_bank = value & 0x03,
                _ => *ram_select_mode = value & 0x01 != 0,
            },
            Mbc::Mbc5 {
                ram_enabled,
                rom_bank,
                ram_bank,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = value & 0x0F == 0x0A,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x0100) | u16::from(value),
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0x00FF) | (u16::from(value & 0x01) << 8),
                0x4000..=0x5FFF => *ram_bank = value & 0x0F,
                // 0x6000-0x7FFF is unmapped on MBC5
                _ => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_rom(cartridge_type: u8, rom_size_code: u8) -> Vec<u8> {
        let size = (32 * 1024) << rom_size_code;
        let mut rom = vec![0; size];
        rom[address::CARTRIDGE_TYPE as usize] = cartridge_type;
        rom[address::ROM_SIZE as usize] = rom_size_code;
        rom
    }

    #[test]
    fn rejects_short_rom() {
        assert!(matches!(
            Cartridge::new(vec![0; 0x4000]),
            Err(CartridgeError::RomTooShort { len: 0x4000 })
        ));
    }

    #[test]
    fn rejects_unsupported_cartridge_type() {
        // MBC3 is not implemented
        assert!(matches!(
            Cartridge::new(test_rom(0x13, 0)),
            Err(CartridgeError::UnsupportedCartridgeType { value: 0x13 })
        ));
    }

    #[test]
    fn rejects_invalid_size_fields() {
        let mut rom = test_rom(0x00, 0);
        rom[address::ROM_SIZE as usize] = 0x55;
        assert!(matches!(
            Cartridge::new(rom),
            Err(CartridgeError::InvalidRomSize { value: 0x55 })
        ));

        let mut rom = test_rom(0x00, 0);
        rom[address::RAM_SIZE as usize] = 0x07;
        assert!(matches!(
            Cartridge::new(rom),
            Err(CartridgeError::InvalidRamSize { value: 0x07 })
        ));
    }

    #[test]
    fn parses_header_fields() {
        let mut rom = test_rom(0x00, 0);
        rom[address::OLD_LICENSEE as usize] = 0x33;
        rom[address::TITLE_START as usize..][..4].copy_from_slice(b"LUMA");
        rom[address::CGB_SUPPORT as usize] = 0x80;
        rom[address::SGB_SUPPORT as usize] = 0x03;
        rom[address::ROM_VERSION as usize] = 0x02;

        let cartridge = Cartridge::new(rom).unwrap();
        let header = cartridge.header();
        assert_eq!("LUMA", header.title);
        assert!(header.cgb);
        assert!(header.sgb);
        assert_eq!(0x02, header.version);
        assert_eq!(32 * 1024, header.rom_size);
    }

    #[test]
    fn header_checksum() {
        let mut rom = test_rom(0x00, 0);
        rom[address::TITLE_START as usize] = b'A';
        let computed = (address::TITLE_START..=address::ROM_VERSION)
            .fold(0u8, |sum, a| sum.wrapping_sub(rom[a as usize]).wrapping_sub(1));
        rom[address::HEADER_CHECKSUM as usize] = computed;

        let cartridge = Cartridge::new(rom).unwrap();
        assert!(cartridge.header().header_checksum_valid);
    }

    #[test]
    fn rom_only_reads() {
        let mut rom = test_rom(0x00, 0);
        rom[0x0042] = 0xAB;
        rom[0x5432] = 0xCD;
        let cartridge = Cartridge::new(rom).unwrap();

        assert_eq!(Some(0xAB), cartridge.try_read(0x0042));
        // The switchable window maps to bank 1 on a plain ROM
        assert_eq!(Some(0xCD), cartridge.try_read(0x5432));
        assert_eq!(None, cartridge.try_read(0x8000));
    }

    #[test]
    fn rom_only_ram() {
        let mut cartridge = Cartridge::new(test_rom(0x00, 0)).unwrap();
        assert!(cartridge.try_write(0xA123, 0x56));
        assert_eq!(Some(0x56), cartridge.try_read(0xA123));
    }

    #[test]
    fn mbc1_rom_banking() {
        // 256 KiB ROM, banks stamped with their own number
        let mut rom = test_rom(0x01, 3);
        for bank in 0..16 {
            rom[bank * 0x4000] = bank as u8;
        }
        let mut cartridge = Cartridge::new(rom).unwrap();

        assert_eq!(Some(0x01), cartridge.try_read(0x4000));

        cartridge.try_write(0x2000, 0x05);
        assert_eq!(Some(0x05), cartridge.try_read(0x4000));

        // Bank 0 selects bank 1
        cartridge.try_write(0x2000, 0x00);
        assert_eq!(Some(0x01), cartridge.try_read(0x4000));

        // Fixed bank is unaffected
        assert_eq!(Some(0x00), cartridge.try_read(0x0000));
    }

    #[test]
    fn mbc1_upper_bank_bits() {
        // 2 MiB ROM so the 2-bit upper bank register matters
        let mut rom = test_rom(0x01, 6);
        rom[0x22 * 0x4000] = 0x99;
        let mut cartridge = Cartridge::new(rom).unwrap();

        // Mode 0: upper bits come from the RAM/ROM bank register
        cartridge.try_write(0x2000, 0x02);
        cartridge.try_write(0x4000, 0x01);
        assert_eq!(Some(0x99), cartridge.try_read(0x4000));

        // Mode 1: the upper bits select the RAM bank instead
        cartridge.try_write(0x6000, 0x01);
        assert_eq!(Some(0x00), cartridge.try_read(0x4000));
    }

    #[test]
    fn mbc1_ram_enable_and_banking() {
        let mut cartridge = Cartridge::new(test_rom(0x03, 0)).unwrap();

        // Disabled RAM ignores writes and reads zero
        cartridge.try_write(0xA000, 0x11);
        assert_eq!(Some(0x00), cartridge.try_read(0xA000));

        cartridge.try_write(0x0000, 0x0A);
        cartridge.try_write(0xA000, 0x11);
        assert_eq!(Some(0x11), cartridge.try_read(0xA000));

        // RAM banking needs mode 1
        cartridge.try_write(0x6000, 0x01);
        cartridge.try_write(0x4000, 0x02);
        assert_eq!(Some(0x00), cartridge.try_read(0xA000));
        cartridge.try_write(0xA000, 0x22);

        cartridge.try_write(0x4000, 0x00);
        assert_eq!(Some(0x11), cartridge.try_read(0xA000));
        cartridge.try_write(0x4000, 0x02);
        assert_eq!(Some(0x22), cartridge.try_read(0xA000));

        // 0x00 written to the enable register disables again
        cartridge.try_write(0x0000, 0x00);
        cartridge.try_write(0xA000, 0x33);
        assert_eq!(Some(0x00), cartridge.try_read(0xA000));
    }

    #[test]
    fn mbc5_nine_bit_rom_bank() {
        // 4 MiB ROM, the largest encodable size (256 banks)
        let mut rom = test_rom(0x19, 7);
        rom[0x0000] = 0x55;
        rom[0xFF * 0x4000] = 0x77;
        let mut cartridge = Cartridge::new(rom).unwrap();

        cartridge.try_write(0x2000, 0xFF);
        assert_eq!(Some(0x77), cartridge.try_read(0x4000));

        // Bit 8 is stored; bank 0x100 is past the end of this ROM and reads 0
        cartridge.try_write(0x3000, 0x01);
        cartridge.try_write(0x2000, 0x00);
        assert_eq!(Some(0x00), cartridge.try_read(0x4000));

        cartridge.try_write(0x3000, 0x00);
        assert_eq!(Some(0x55), cartridge.try_read(0x4000));
    }

    #[test]
    fn mbc5_bank_zero_is_selectable() {
        let mut rom = test_rom(0x19, 3);
        rom[0x0000] = 0x11;
        rom[0x4000] = 0x22;
        let mut cartridge = Cartridge::new(rom).unwrap();

        // Construction leaves bank 0 selected, unlike MBC1
        assert_eq!(Some(0x11), cartridge.try_read(0x4000));

        cartridge.try_write(0x2000, 0x01);
        assert_eq!(Some(0x22), cartridge.try_read(0x4000));

        cartridge.try_write(0x2000, 0x00);
        assert_eq!(Some(0x11), cartridge.try_read(0x4000));
    }

    #[test]
    fn mbc5_ram_banks() {
        let mut cartridge = Cartridge::new(test_rom(0x1B, 3)).unwrap();
        cartridge.try_write(0x0000, 0x0A);

        cartridge.try_write(0x4000, 0x00);
        cartridge.try_write(0xA000, 0xAA);
        cartridge.try_write(0x4000, 0x0F);
        cartridge.try_write(0xA000, 0xBB);

        cartridge.try_write(0x4000, 0x00);
        assert_eq!(Some(0xAA), cartridge.try_read(0xA000));
        cartridge.try_write(0x4000, 0x0F);
        assert_eq!(Some(0xBB), cartridge.try_read(0xA000));
    }
}
