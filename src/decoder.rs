use crate::error::DecodeError;
use crate::opcodes::{self, GroupOp, Handler};
use crate::structs::*;

/// Decoded ModRM byte together with its displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    pub mode: u8,
    // register operand or secondary opcode
    pub reg: u8,
    pub rm: u8,
    pub displacement: i32,
}

impl ModRm {
    pub fn rm_operand(&self, is_wide: bool) -> Operand {
        match (self.mode, is_wide) {
            (0b11, true) => Operand::Register(Register::from_index(self.rm)),
            (0b11, false) => Operand::ByteRegister(ByteRegister::from_index(self.rm)),
            _ => Operand::Address(Register::from_index(self.rm), self.displacement),
        }
    }

    pub fn reg_operand(&self, is_wide: bool) -> Operand {
        if is_wide {
            Operand::Register(Register::from_index(self.reg))
        } else {
            Operand::ByteRegister(ByteRegister::from_index(self.reg))
        }
    }
}

/// Decodes the ModRM byte at the start of `code` and returns it with the number of bytes it
/// occupies (ModRM plus displacement).
pub fn decode_modrm(code: &[u8]) -> Result<(ModRm, usize), DecodeError> {
    let Some(&first) = code.first() else {
        return Err(DecodeError::Truncated);
    };

    let mode = first >> 6 & 0b11;
    let reg = (first >> 3) & 0b111;
    let rm = first & 0b111;

    // no SIB byte, no absolute disp32
    let unimplemented = match mode {
        0b00 => rm == 0b100 || rm == 0b101,
        0b01 | 0b10 => rm == 0b100,
        _ => false,
    };
    if unimplemented {
        return Err(DecodeError::UnimplementedAddressing { mode, rm });
    }

    let displacement_bytes: usize = match mode {
        0b01 => 1,
        0b10 => 4,
        _ => 0,
    };
    let Some(displacement_slice) = code.get(1..1 + displacement_bytes) else {
        return Err(DecodeError::Truncated);
    };

    let displacement = match displacement_slice {
        [byte] => i32::from(*byte as i8),
        [a, b, c, d] => i32::from_le_bytes([*a, *b, *c, *d]),
        _ => 0,
    };

    Ok((
        ModRm {
            mode,
            reg,
            rm,
            displacement,
        },
        1 + displacement_bytes,
    ))
}

/// Reads instruction bytes starting at `start`, counting how many were consumed.
pub struct CodeCursor<'a> {
    data: &'a [u8],
    start: usize,
    movs: usize,
}

impl<'a> CodeCursor<'a> {
    pub fn new(data: &'a [u8], start: u32) -> CodeCursor<'a> {
        CodeCursor {
            data,
            start: start as usize,
            movs: 0,
        }
    }

    /// Bytes consumed so far, i.e. the instruction length once decoding is done.
    pub fn movs(&self) -> u32 {
        self.movs as u32
    }

    /// The bytes consumed so far, for diagnostics.
    pub fn consumed(&self) -> &'a [u8] {
        let end = (self.start + self.movs).min(self.data.len());
        self.data.get(self.start..end).unwrap_or(&[])
    }

    fn remaining(&self) -> &'a [u8] {
        self.data.get(self.start + self.movs..).unwrap_or(&[])
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut bytes = [0u8; N];
        let Some(slice) = self.remaining().get(..N) else {
            return Err(DecodeError::Truncated);
        };
        bytes.copy_from_slice(slice);
        self.movs += N;

        Ok(bytes)
    }

    pub fn next_u8(&mut self) -> Result<u8, DecodeError> {
        let [byte] = self.take::<1>()?;
        Ok(byte)
    }

    pub fn next_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.next_u8()? as i8)
    }

    pub fn next_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    pub fn next_modrm(&mut self) -> Result<ModRm, DecodeError> {
        match decode_modrm(self.remaining()) {
            Ok((modrm, len)) => {
                self.movs += len;
                Ok(modrm)
            }
            Err(err @ DecodeError::UnimplementedAddressing { .. }) => {
                // the ModRM byte itself is at fault
                self.movs += 1;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

fn wide_flags(is_wide: bool) -> InstructionFlags {
    if is_wide {
        InstructionFlags::Wide
    } else {
        InstructionFlags::empty()
    }
}

fn instruction(op_code: OpCode, is_wide: bool, left: Operand, right: Operand) -> Instruction {
    Instruction {
        op_code,
        flags: wide_flags(is_wide),
        left_operand: left,
        right_operand: right,
    }
}

// rm - stands for Register or Memory
fn rm_to_reg(
    op_code: OpCode,
    cursor: &mut CodeCursor,
    is_wide: bool,
    to_reg: bool,
) -> Result<Instruction, DecodeError> {
    let modrm = cursor.next_modrm()?;
    let address_or_reg = modrm.rm_operand(is_wide);
    let reg_name = modrm.reg_operand(is_wide);

    Ok(if to_reg {
        instruction(op_code, is_wide, reg_name, address_or_reg)
    } else {
        instruction(op_code, is_wide, address_or_reg, reg_name)
    })
}

fn sign_extended_imm8(cursor: &mut CodeCursor) -> Result<Operand, DecodeError> {
    Ok(Operand::Immediate(i32::from(cursor.next_i8()?) as u32))
}

fn group(opcode: u8, cursor: &mut CodeCursor) -> Result<Instruction, DecodeError> {
    let modrm = cursor.next_modrm()?;
    let op = opcodes::group_op(opcode, modrm.reg)?;

    let decoded = match op {
        GroupOp::AddRm32Imm8 => instruction(
            OpCode::Add,
            true,
            modrm.rm_operand(true),
            sign_extended_imm8(cursor)?,
        ),
        GroupOp::SubRm32Imm8 => instruction(
            OpCode::Sub,
            true,
            modrm.rm_operand(true),
            sign_extended_imm8(cursor)?,
        ),
        GroupOp::CmpRm32Imm8 => instruction(
            OpCode::Cmp,
            true,
            modrm.rm_operand(true),
            sign_extended_imm8(cursor)?,
        ),
        GroupOp::MovRm8Imm8 => instruction(
            OpCode::Mov,
            false,
            modrm.rm_operand(false),
            Operand::Immediate(u32::from(cursor.next_u8()?)),
        ),
        GroupOp::MovRm32Imm32 => instruction(
            OpCode::Mov,
            true,
            modrm.rm_operand(true),
            Operand::Immediate(cursor.next_u32()?),
        ),
        GroupOp::IncRm32 => {
            instruction(OpCode::Inc, true, modrm.rm_operand(true), Operand::Empty)
        }
    };

    Ok(decoded)
}

fn parse_jump(op_code: OpCode, displacement: i32) -> Instruction {
    instruction(
        op_code,
        false,
        Operand::JumpDisplacement(displacement),
        Operand::Empty,
    )
}

pub fn decode_instruction(cursor: &mut CodeCursor) -> Result<Instruction, DecodeError> {
    let first = cursor.next_u8()?;
    let handler = opcodes::lookup(first)?;

    // op+r families keep the register in the low 3 bits
    let embedded_reg = || first & 0b111;

    let decoded = match handler {
        Handler::AddRm32R32 => rm_to_reg(OpCode::Add, cursor, true, false)?,
        Handler::SubRm32R32 => rm_to_reg(OpCode::Sub, cursor, true, false)?,
        Handler::CmpRm32R32 => rm_to_reg(OpCode::Cmp, cursor, true, false)?,
        Handler::CmpR32Rm32 => rm_to_reg(OpCode::Cmp, cursor, true, true)?,
        Handler::CmpAlImm8 => instruction(
            OpCode::Cmp,
            false,
            Operand::ByteRegister(ByteRegister::Al),
            Operand::Immediate(u32::from(cursor.next_u8()?)),
        ),
        Handler::CmpEaxImm32 => instruction(
            OpCode::Cmp,
            true,
            Operand::Register(Register::Eax),
            Operand::Immediate(cursor.next_u32()?),
        ),
        Handler::IncR32 => instruction(
            OpCode::Inc,
            true,
            Operand::Register(Register::from_index(embedded_reg())),
            Operand::Empty,
        ),
        Handler::PushR32 => instruction(
            OpCode::Push,
            true,
            Operand::Register(Register::from_index(embedded_reg())),
            Operand::Empty,
        ),
        Handler::PopR32 => instruction(
            OpCode::Pop,
            true,
            Operand::Register(Register::from_index(embedded_reg())),
            Operand::Empty,
        ),
        Handler::PushImm32 => instruction(
            OpCode::Push,
            true,
            Operand::Immediate(cursor.next_u32()?),
            Operand::Empty,
        ),
        Handler::PushImm8 => {
            instruction(OpCode::Push, true, sign_extended_imm8(cursor)?, Operand::Empty)
        }
        Handler::JccRel8(condition) => {
            parse_jump(OpCode::Jcc(condition), i32::from(cursor.next_i8()?))
        }
        Handler::Group83 | Handler::GroupC6 | Handler::GroupC7 | Handler::GroupFf => {
            group(first, cursor)?
        }

        // movs
        Handler::MovRm8R8 => rm_to_reg(OpCode::Mov, cursor, false, false)?,
        Handler::MovRm32R32 => rm_to_reg(OpCode::Mov, cursor, true, false)?,
        Handler::MovR8Rm8 => rm_to_reg(OpCode::Mov, cursor, false, true)?,
        Handler::MovR32Rm32 => rm_to_reg(OpCode::Mov, cursor, true, true)?,
        Handler::MovR8Imm8 => instruction(
            OpCode::Mov,
            false,
            Operand::ByteRegister(ByteRegister::from_index(embedded_reg())),
            Operand::Immediate(u32::from(cursor.next_u8()?)),
        ),
        Handler::MovR32Imm32 => instruction(
            OpCode::Mov,
            true,
            Operand::Register(Register::from_index(embedded_reg())),
            Operand::Immediate(cursor.next_u32()?),
        ),

        Handler::Ret => instruction(OpCode::Ret, true, Operand::Empty, Operand::Empty),
        Handler::Leave => instruction(OpCode::Leave, true, Operand::Empty, Operand::Empty),
        Handler::IntImm8 => instruction(
            OpCode::Int,
            false,
            Operand::Immediate(u32::from(cursor.next_u8()?)),
            Operand::Empty,
        ),
        Handler::CallRel32 => parse_jump(OpCode::Call, cursor.next_u32()? as i32),
        Handler::JmpRel32 => parse_jump(OpCode::Jmp, cursor.next_u32()? as i32),
        Handler::JmpRel8 => parse_jump(OpCode::Jmp, i32::from(cursor.next_i8()?)),
        Handler::InAlDx => instruction(
            OpCode::In,
            false,
            Operand::ByteRegister(ByteRegister::Al),
            Operand::Dx,
        ),
        Handler::OutDxAl => instruction(
            OpCode::Out,
            false,
            Operand::Dx,
            Operand::ByteRegister(ByteRegister::Al),
        ),
    };

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> (Result<Instruction, DecodeError>, u32) {
        let mut cursor = CodeCursor::new(bytes, 0);
        let decoded = decode_instruction(&mut cursor);
        (decoded, cursor.movs())
    }

    #[test]
    fn register_mode_never_addresses_memory() {
        let mut registers = Registers::default();
        for (index, reg) in Register::ALL.into_iter().enumerate() {
            registers.set(reg, 0x1000 * (index as u32 + 1));
        }

        for byte in 0b1100_0000..=0xFFu8 {
            let (modrm, len) = decode_modrm(&[byte]).unwrap();
            assert_eq!(len, 1);
            assert_eq!(modrm.mode, 0b11);

            let operand = modrm.rm_operand(true);
            assert_eq!(operand, Operand::Register(Register::from_index(byte & 0b111)));
            assert_eq!(operand.effective_address(&registers), None);
            assert_eq!(
                modrm.rm_operand(false),
                Operand::ByteRegister(ByteRegister::from_index(byte & 0b111))
            );
        }
    }

    #[test]
    fn disp8_is_sign_extended_onto_the_base() {
        let mut registers = Registers::default();
        for (index, reg) in Register::ALL.into_iter().enumerate() {
            registers.set(reg, 0x1000 * (index as u32 + 1));
        }

        for rm in (0..8u8).filter(|rm| *rm != 0b100) {
            for displacement in [-1i8, 127, -128, 0, 16] {
                let byte = 0b01_000_000 | rm;
                let (modrm, len) = decode_modrm(&[byte, displacement as u8]).unwrap();
                assert_eq!(len, 2);

                let base = registers.get(Register::from_index(rm));
                let expected = base.wrapping_add(i32::from(displacement) as u32);
                assert_eq!(
                    modrm.rm_operand(true).effective_address(&registers),
                    Some(expected),
                    "rm={rm} disp={displacement}"
                );
            }
        }
    }

    #[test]
    fn disp32_and_plain_base() {
        let mut registers = Registers::default();
        registers.set(Register::Ebp, 0x7c00);

        // [ebp + 0x100]
        let (modrm, len) = decode_modrm(&[0b10_000_101, 0x00, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(len, 5);
        assert_eq!(modrm.rm_operand(true).effective_address(&registers), Some(0x7d00));

        // [ebp] with mod=1 and disp8=-4
        let (modrm, _) = decode_modrm(&[0b01_010_101, 0xFC]).unwrap();
        assert_eq!(modrm.reg, 0b010);
        assert_eq!(modrm.rm_operand(true).effective_address(&registers), Some(0x7bfc));

        // [eax]
        let (modrm, len) = decode_modrm(&[0b00_000_000]).unwrap();
        assert_eq!(len, 1);
        assert_eq!(modrm.rm_operand(true), Operand::Address(Register::Eax, 0));
    }

    #[test]
    fn sib_and_absolute_forms_fail_fast() {
        for (byte, mode, rm) in [
            (0b00_000_100u8, 0u8, 4u8),
            (0b00_000_101, 0, 5),
            (0b01_000_100, 1, 4),
            (0b10_000_100, 2, 4),
        ] {
            assert_eq!(
                decode_modrm(&[byte, 0, 0, 0, 0, 0]),
                Err(DecodeError::UnimplementedAddressing { mode, rm })
            );
        }
    }

    #[test]
    fn truncated_displacement() {
        assert_eq!(decode_modrm(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode_modrm(&[0b10_000_000, 1, 2]), Err(DecodeError::Truncated));
    }

    #[test]
    fn decodes_mov_r32_imm32() {
        let (decoded, len) = decode(&[0xBB, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(len, 5);
        assert_eq!(
            decoded.unwrap(),
            Instruction {
                op_code: OpCode::Mov,
                flags: InstructionFlags::Wide,
                left_operand: Operand::Register(Register::Ebx),
                right_operand: Operand::Immediate(0x1234_5678),
            }
        );
    }

    #[test]
    fn decodes_group_83_with_memory_operand() {
        // sub dword [ebp-8], -1
        let (decoded, len) = decode(&[0x83, 0b01_101_101, 0xF8, 0xFF]);
        assert_eq!(len, 4);
        let decoded = decoded.unwrap();
        assert_eq!(decoded.op_code, OpCode::Sub);
        assert_eq!(decoded.left_operand, Operand::Address(Register::Ebp, -8));
        assert_eq!(decoded.right_operand, Operand::Immediate(0xFFFF_FFFF));
    }

    #[test]
    fn decodes_byte_moves() {
        // mov ah, 0x0e
        let (decoded, len) = decode(&[0xB4, 0x0E]);
        assert_eq!(len, 2);
        assert_eq!(
            decoded.unwrap().left_operand,
            Operand::ByteRegister(ByteRegister::Ah)
        );

        // mov [esi], bl
        let (decoded, len) = decode(&[0x88, 0b00_011_110]);
        assert_eq!(len, 2);
        let decoded = decoded.unwrap();
        assert!(!decoded.is_wide());
        assert_eq!(decoded.left_operand, Operand::Address(Register::Esi, 0));
        assert_eq!(decoded.right_operand, Operand::ByteRegister(ByteRegister::Bl));
    }

    #[test]
    fn port_instructions_use_dx() {
        let (decoded, len) = decode(&[0xEC]);
        assert_eq!(len, 1);
        let decoded = decoded.unwrap();
        assert_eq!(decoded.left_operand, Operand::ByteRegister(ByteRegister::Al));
        assert_eq!(decoded.right_operand, Operand::Dx);

        let (decoded, _) = decode(&[0xEE]);
        assert_eq!(decoded.unwrap().left_operand, Operand::Dx);
    }

    #[test]
    fn decodes_jumps() {
        let (decoded, len) = decode(&[0xE8, 0xFB, 0xFF, 0xFF, 0xFF]);
        assert_eq!(len, 5);
        let decoded = decoded.unwrap();
        assert_eq!(decoded.op_code, OpCode::Call);
        assert_eq!(decoded.left_operand.as_displacement(), Some(-5));

        let (decoded, len) = decode(&[0x7E, 0x80]);
        assert_eq!(len, 2);
        assert_eq!(decoded.unwrap().left_operand.as_displacement(), Some(-128));
    }

    #[test]
    fn decode_errors() {
        assert_eq!(decode(&[0x0F]).0, Err(DecodeError::UnknownOpcode(0x0F)));
        assert_eq!(
            decode(&[0xFF, 0b11_001_000]).0,
            Err(DecodeError::UnknownSubOpcode { opcode: 0xFF, sub: 1 })
        );
        assert_eq!(decode(&[0xB8, 0x01]).0, Err(DecodeError::Truncated));

        // the rejected ModRM byte counts as consumed, its displacement does not
        let mut cursor = CodeCursor::new(&[0x8B, 0b01_000_100, 0x10], 0);
        assert_eq!(
            decode_instruction(&mut cursor),
            Err(DecodeError::UnimplementedAddressing { mode: 1, rm: 4 })
        );
        assert_eq!(cursor.consumed(), &[0x8B, 0b01_000_100]);

        // truncation does not consume the missing bytes
        let mut cursor = CodeCursor::new(&[0x8B, 0b10_000_000, 0x01], 0);
        assert_eq!(decode_instruction(&mut cursor), Err(DecodeError::Truncated));
        assert_eq!(cursor.consumed(), &[0x8B]);
    }
}
