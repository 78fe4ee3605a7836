//! Opcode dispatch: one table lookup on the leading byte, and a second lookup on the ModRM
//! reg field for the group opcodes.

use crate::error::DecodeError;
use crate::structs::Condition;

/// Encoding form selected by a leading opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    AddRm32R32,
    SubRm32R32,
    CmpRm32R32,
    CmpR32Rm32,
    CmpAlImm8,
    CmpEaxImm32,
    /// `40+r`
    IncR32,
    /// `50+r`
    PushR32,
    /// `58+r`
    PopR32,
    PushImm32,
    PushImm8,
    JccRel8(Condition),
    Group83,
    MovRm8R8,
    MovRm32R32,
    MovR8Rm8,
    MovR32Rm32,
    /// `B0+r`
    MovR8Imm8,
    /// `B8+r`
    MovR32Imm32,
    Ret,
    GroupC6,
    GroupC7,
    Leave,
    IntImm8,
    CallRel32,
    JmpRel32,
    JmpRel8,
    InAlDx,
    OutDxAl,
    GroupFf,
}

/// Operation selected by the reg field of a group opcode's ModRM byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    AddRm32Imm8,
    SubRm32Imm8,
    CmpRm32Imm8,
    MovRm8Imm8,
    MovRm32Imm32,
    IncRm32,
}

const fn register_family(
    mut table: [Option<Handler>; 256],
    base: usize,
    handler: Handler,
) -> [Option<Handler>; 256] {
    let mut reg = 0;
    while reg < 8 {
        table[base + reg] = Some(handler);
        reg += 1;
    }
    table
}

const fn build_dispatch_table() -> [Option<Handler>; 256] {
    let mut table: [Option<Handler>; 256] = [None; 256];

    table[0x01] = Some(Handler::AddRm32R32);
    table[0x29] = Some(Handler::SubRm32R32);
    table[0x39] = Some(Handler::CmpRm32R32);
    table[0x3B] = Some(Handler::CmpR32Rm32);
    table[0x3C] = Some(Handler::CmpAlImm8);
    table[0x3D] = Some(Handler::CmpEaxImm32);
    table = register_family(table, 0x40, Handler::IncR32);
    table = register_family(table, 0x50, Handler::PushR32);
    table = register_family(table, 0x58, Handler::PopR32);
    table[0x68] = Some(Handler::PushImm32);
    table[0x6A] = Some(Handler::PushImm8);

    // jumps
    table[0x70] = Some(Handler::JccRel8(Condition::Overflow));
    table[0x71] = Some(Handler::JccRel8(Condition::NotOverflow));
    table[0x72] = Some(Handler::JccRel8(Condition::Carry));
    table[0x73] = Some(Handler::JccRel8(Condition::NotCarry));
    table[0x74] = Some(Handler::JccRel8(Condition::Zero));
    table[0x75] = Some(Handler::JccRel8(Condition::NotZero));
    table[0x78] = Some(Handler::JccRel8(Condition::Sign));
    table[0x79] = Some(Handler::JccRel8(Condition::NotSign));
    table[0x7C] = Some(Handler::JccRel8(Condition::Less));
    table[0x7E] = Some(Handler::JccRel8(Condition::LessOrEqual));

    table[0x83] = Some(Handler::Group83);

    // movs
    table[0x88] = Some(Handler::MovRm8R8);
    table[0x89] = Some(Handler::MovRm32R32);
    table[0x8A] = Some(Handler::MovR8Rm8);
    table[0x8B] = Some(Handler::MovR32Rm32);
    table = register_family(table, 0xB0, Handler::MovR8Imm8);
    table = register_family(table, 0xB8, Handler::MovR32Imm32);

    table[0xC3] = Some(Handler::Ret);
    table[0xC6] = Some(Handler::GroupC6);
    table[0xC7] = Some(Handler::GroupC7);
    table[0xC9] = Some(Handler::Leave);
    table[0xCD] = Some(Handler::IntImm8);
    table[0xE8] = Some(Handler::CallRel32);
    table[0xE9] = Some(Handler::JmpRel32);
    table[0xEB] = Some(Handler::JmpRel8);
    table[0xEC] = Some(Handler::InAlDx);
    table[0xEE] = Some(Handler::OutDxAl);
    table[0xFF] = Some(Handler::GroupFf);

    table
}

pub static DISPATCH_TABLE: [Option<Handler>; 256] = build_dispatch_table();

pub fn lookup(opcode: u8) -> Result<Handler, DecodeError> {
    DISPATCH_TABLE[usize::from(opcode)].ok_or(DecodeError::UnknownOpcode(opcode))
}

pub fn group_op(opcode: u8, sub: u8) -> Result<GroupOp, DecodeError> {
    let op = match (opcode, sub) {
        (0x83, 0) => GroupOp::AddRm32Imm8,
        (0x83, 5) => GroupOp::SubRm32Imm8,
        (0x83, 7) => GroupOp::CmpRm32Imm8,
        (0xC6, 0) => GroupOp::MovRm8Imm8,
        (0xC7, 0) => GroupOp::MovRm32Imm32,
        (0xFF, 0) => GroupOp::IncRm32,
        _ => return Err(DecodeError::UnknownSubOpcode { opcode, sub }),
    };

    Ok(op)
}
