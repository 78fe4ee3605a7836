use crate::{
    console::{PortIo, CONSOLE_PORT},
    error::Result,
    simulator::Simulator,
    structs::ByteRegister,
};

pub const VIDEO_SERVICES: u8 = 0x10;
const TELETYPE_OUTPUT: u8 = 0x0e;

// ANSI foreground codes in BIOS color order
const PALETTE: [u8; 8] = [30, 34, 32, 36, 31, 35, 33, 37];

/// Renders a character with a text-mode attribute (low nibble of BL) as an ANSI sequence.
pub fn teletype_sequence(character: u8, attribute: u8) -> Vec<u8> {
    let color = PALETTE[usize::from(attribute & 0x07)];
    let bright = u8::from(attribute & 0x08 != 0);

    let mut out = format!("\x1b[{};{}m", bright, color).into_bytes();
    out.push(character);
    out.extend_from_slice(b"\x1b[0m");
    out
}

impl<P: PortIo> Simulator<P> {
    pub(crate) fn software_interrupt(&mut self, vector: u8) -> Result<()> {
        match vector {
            VIDEO_SERVICES => self.bios_video(),
            _ => {
                tracing::warn!(
                    vector = format_args!("{:#04x}", vector),
                    eip = format_args!("{:#010x}", self.ip()),
                    "unknown interrupt"
                );
                Ok(())
            }
        }
    }

    fn bios_video(&mut self) -> Result<()> {
        let registers = self.registers();
        let function = registers.get8(ByteRegister::Ah);

        match function {
            TELETYPE_OUTPUT => {
                let character = registers.get8(ByteRegister::Al);
                let attribute = registers.get8(ByteRegister::Bl) & 0x0f;

                for byte in teletype_sequence(character, attribute) {
                    self.io_mut().io_out8(CONSOLE_PORT, byte)?;
                }
                Ok(())
            }
            _ => {
                tracing::warn!(
                    function = format_args!("{:#04x}", function),
                    "unknown video function"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_selects_color_and_brightness() {
        assert_eq!(teletype_sequence(b'A', 0x0c), b"\x1b[1;31mA\x1b[0m");
        assert_eq!(teletype_sequence(b'A', 0x04), b"\x1b[0;31mA\x1b[0m");
        assert_eq!(teletype_sequence(b'x', 0x01), b"\x1b[0;34mx\x1b[0m");
        assert_eq!(teletype_sequence(b' ', 0x0f), b"\x1b[1;37m \x1b[0m");
        assert_eq!(teletype_sequence(b'z', 0x00), b"\x1b[0;30mz\x1b[0m");
    }
}
