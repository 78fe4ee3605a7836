use super::flags::Flags;
use super::structs::*;

pub trait Formattable {
    fn format(&self) -> String;
}

impl Formattable for Register {
    fn format(&self) -> String {
        match self {
            Register::Eax => "eax",
            Register::Ecx => "ecx",
            Register::Edx => "edx",
            Register::Ebx => "ebx",
            Register::Esp => "esp",
            Register::Ebp => "ebp",
            Register::Esi => "esi",
            Register::Edi => "edi",
        }
        .to_string()
    }
}

impl Formattable for ByteRegister {
    fn format(&self) -> String {
        match self {
            ByteRegister::Al => "al",
            ByteRegister::Cl => "cl",
            ByteRegister::Dl => "dl",
            ByteRegister::Bl => "bl",
            ByteRegister::Ah => "ah",
            ByteRegister::Ch => "ch",
            ByteRegister::Dh => "dh",
            ByteRegister::Bh => "bh",
        }
        .to_string()
    }
}

impl Formattable for OpCode {
    fn format(&self) -> String {
        match self {
            OpCode::Mov => "mov",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Cmp => "cmp",
            OpCode::Inc => "inc",
            OpCode::Push => "push",
            OpCode::Pop => "pop",
            OpCode::Call => "call",
            OpCode::Ret => "ret",
            OpCode::Leave => "leave",
            OpCode::Jmp => "jmp",
            OpCode::Jcc(Condition::Overflow) => "jo",
            OpCode::Jcc(Condition::NotOverflow) => "jno",
            OpCode::Jcc(Condition::Carry) => "jc",
            OpCode::Jcc(Condition::NotCarry) => "jnc",
            OpCode::Jcc(Condition::Zero) => "jz",
            OpCode::Jcc(Condition::NotZero) => "jnz",
            OpCode::Jcc(Condition::Sign) => "js",
            OpCode::Jcc(Condition::NotSign) => "jns",
            OpCode::Jcc(Condition::Less) => "jl",
            OpCode::Jcc(Condition::LessOrEqual) => "jle",
            OpCode::In => "in",
            OpCode::Out => "out",
            OpCode::Int => "int",
        }
        .to_string()
    }
}

impl Formattable for Operand {
    fn format(&self) -> String {
        match self {
            Self::Register(reg) => reg.format(),
            Self::ByteRegister(reg) => reg.format(),
            Self::Dx => "dx".to_string(),

            Self::Address(base, 0) => format!("[{}]", base.format()),
            Self::Address(base, displacement) if *displacement < 0 => {
                format!("[{}-{:#x}]", base.format(), displacement.unsigned_abs())
            }
            Self::Address(base, displacement) => {
                format!("[{}+{:#x}]", base.format(), displacement)
            }

            Self::JumpDisplacement(displacement) => format!("{:+}", displacement),
            Self::Immediate(immediate) => format!("{:#x}", immediate),
            Self::Empty => "".to_string(),
        }
    }
}

impl Formattable for Instruction {
    fn format(&self) -> String {
        // relative to the end of the instruction
        if let Some(displacement) = self.left_operand.as_displacement() {
            return format!("{} ${:+}", self.op_code.format(), displacement);
        }

        let size = match (self.left_operand, self.right_operand) {
            (Operand::Address(_, _), Operand::Immediate(_) | Operand::Empty) => {
                if self.is_wide() {
                    "dword "
                } else {
                    "byte "
                }
            }
            _ => "",
        };

        match (self.left_operand, self.right_operand) {
            (Operand::Empty, _) => self.op_code.format(),
            (left, Operand::Empty) => {
                format!("{} {}{}", self.op_code.format(), size, left.format())
            }
            (left, right) => format!(
                "{} {}{}, {}",
                self.op_code.format(),
                size,
                left.format(),
                right.format()
            ),
        }
    }
}

impl Formattable for Flags {
    fn format(&self) -> String {
        let mut res = String::with_capacity(4);
        if self.contains(Flags::Carry) {
            res.push('C');
        }
        if self.contains(Flags::Zero) {
            res.push('Z');
        }
        if self.contains(Flags::Sign) {
            res.push('S');
        }
        if self.contains(Flags::Overflow) {
            res.push('O');
        }
        if self.is_empty() {
            res.push_str("None");
        }

        res
    }
}
