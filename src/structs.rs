use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstructionFlags: u8 {
        // operand size is 32 bits, otherwise 8
        const Wide = 0b0000_0001;
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
  Eax, Ecx, Edx, Ebx,
  Esp, Ebp, Esi, Edi,
}

impl Register {
    /// Encoding order, so `ALL[i]` is the register with index `i`.
    pub const ALL: [Register; 8] = [
        Register::Eax,
        Register::Ecx,
        Register::Edx,
        Register::Ebx,
        Register::Esp,
        Register::Ebp,
        Register::Esi,
        Register::Edi,
    ];

    /// Panics on an index above 7; decoded indices are always 3 bits wide.
    pub fn from_index(index: u8) -> Register {
        Self::ALL[usize::from(index)]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRegister {
  Al, Cl, Dl, Bl,
  Ah, Ch, Dh, Bh,
}

impl ByteRegister {
    pub const ALL: [ByteRegister; 8] = [
        ByteRegister::Al,
        ByteRegister::Cl,
        ByteRegister::Dl,
        ByteRegister::Bl,
        ByteRegister::Ah,
        ByteRegister::Ch,
        ByteRegister::Dh,
        ByteRegister::Bh,
    ];

    pub fn from_index(index: u8) -> ByteRegister {
        Self::ALL[usize::from(index)]
    }

    /// Parent register and bit offset of the byte inside it.
    pub fn alias(self) -> (Register, u32) {
        match self {
            ByteRegister::Al => (Register::Eax, 0),
            ByteRegister::Cl => (Register::Ecx, 0),
            ByteRegister::Dl => (Register::Edx, 0),
            ByteRegister::Bl => (Register::Ebx, 0),

            ByteRegister::Ah => (Register::Eax, 8),
            ByteRegister::Ch => (Register::Ecx, 8),
            ByteRegister::Dh => (Register::Edx, 8),
            ByteRegister::Bh => (Register::Ebx, 8),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    gpr: [u32; 8],
}

impl Registers {
    pub fn get(&self, reg: Register) -> u32 {
        self.gpr[reg.index()]
    }

    pub fn set(&mut self, reg: Register, value: u32) {
        self.gpr[reg.index()] = value;
    }

    pub fn get8(&self, reg: ByteRegister) -> u8 {
        let (parent, shift) = reg.alias();

        (self.get(parent) >> shift) as u8
    }

    pub fn set8(&mut self, reg: ByteRegister, value: u8) {
        let (parent, shift) = reg.alias();
        let mask = 0xFFu32 << shift;
        let next = (self.get(parent) & !mask) | (u32::from(value) << shift);

        self.set(parent, next);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    ByteRegister(ByteRegister),
    // port number for in/out, the low 16 bits of EDX
    Dx,
    // [base + displacement]
    Address(Register, i32),
    JumpDisplacement(i32),
    Immediate(u32),
    Empty,
}

impl Operand {
    /// Memory address the operand refers to with the current register values.
    /// Register and immediate operands have none.
    pub fn effective_address(&self, registers: &Registers) -> Option<u32> {
        match self {
            Operand::Address(base, displacement) => {
                Some(registers.get(*base).wrapping_add(*displacement as u32))
            }
            _ => None,
        }
    }

    pub fn as_displacement(&self) -> Option<i32> {
        match self {
            Operand::JumpDisplacement(displ) => Some(*displ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Overflow,
    NotOverflow,
    Carry,
    NotCarry,
    Zero,
    NotZero,
    Sign,
    NotSign,
    Less,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Mov,
    Add,
    Sub,
    Cmp,
    Inc,

    Push,
    Pop,
    Call,
    Ret,
    Leave,

    Jmp,
    Jcc(Condition),

    In,
    Out,
    Int,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op_code: OpCode,
    pub flags: InstructionFlags,
    pub left_operand: Operand,
    pub right_operand: Operand,
}

impl Instruction {
    pub fn is_wide(&self) -> bool {
        self.flags.contains(InstructionFlags::Wide)
    }
}
