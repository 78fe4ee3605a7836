use crate::{
    console::PortIo,
    decoder::{decode_instruction, CodeCursor},
    error::{EmulatorError, Result},
    flags::{execute_sub, Flags},
    format::Formattable,
    memory::Memory,
    structs::*,
};
use std::io::Write;

pub const MEMORY_SIZE: usize = 1024 * 1024;
/// Where the BIOS places a boot sector.
pub const BOOT_ORIGIN: u32 = 0x7c00;

pub struct SimulatorConfig {
    pub memory_size: usize,
    /// Load address of the image; also the initial EIP and ESP.
    pub origin: u32,
    /// Stop once EIP becomes 0 after an instruction.
    pub halt_on_zero_ip: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            memory_size: MEMORY_SIZE,
            origin: BOOT_ORIGIN,
            halt_on_zero_ip: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// EIP reached 0. A jump or return to address 0 looks exactly the same.
    EndOfProgram,
    Fault(EmulatorError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Running,
    Halted(HaltReason),
}

pub struct Simulator<P> {
    registers: Registers,
    memory: Memory,
    flags: Flags,
    ip: u32,

    io: P,
    config: SimulatorConfig,
    state: State,
    steps: u64,
}

impl<P: PortIo> Simulator<P> {
    pub fn new(config: SimulatorConfig, io: P) -> Simulator<P> {
        let mut registers = Registers::default();
        registers.set(Register::Esp, config.origin);

        Simulator {
            registers,
            memory: Memory::new(config.memory_size),
            flags: Flags::empty(),
            ip: config.origin,
            io,
            config,
            state: State::Running,
            steps: 0,
        }
    }

    pub fn load(&mut self, image: &[u8]) -> Result<()> {
        self.memory.load(self.config.origin, image)
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Instructions executed to completion.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn io(&self) -> &P {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut P {
        &mut self.io
    }

    pub fn push32(&mut self, value: u32) -> Result<()> {
        let address = self.registers.get(Register::Esp).wrapping_sub(4);
        self.memory.write_as_u32(address, value)?;
        self.registers.set(Register::Esp, address);

        Ok(())
    }

    pub fn pop32(&mut self) -> Result<u32> {
        let address = self.registers.get(Register::Esp);
        let value = self.memory.read_as_u32(address)?;
        self.registers.set(Register::Esp, address.wrapping_add(4));

        Ok(value)
    }

    fn read_operand(&self, operand: &Operand, is_wide: bool) -> Result<u32> {
        match operand {
            Operand::Register(reg) => Ok(self.registers.get(*reg)),
            Operand::ByteRegister(reg) => Ok(u32::from(self.registers.get8(*reg))),
            Operand::Dx => Ok(self.registers.get(Register::Edx) & 0xffff),
            Operand::Immediate(value) => Ok(*value),
            Operand::Address(_, _) => {
                let Some(address) = operand.effective_address(&self.registers) else {
                    unreachable!("address operand without an address");
                };
                if is_wide {
                    self.memory.read_as_u32(address)
                } else {
                    self.memory.read_as_u8(address).map(u32::from)
                }
            }
            Operand::JumpDisplacement(_) | Operand::Empty => {
                unreachable!("{:?} is not a value operand", operand)
            }
        }
    }

    fn write_operand(&mut self, operand: &Operand, is_wide: bool, value: u32) -> Result<()> {
        match operand {
            Operand::Register(reg) => {
                self.registers.set(*reg, value);
                Ok(())
            }
            Operand::ByteRegister(reg) => {
                self.registers.set8(*reg, value as u8);
                Ok(())
            }
            Operand::Address(_, _) => {
                let Some(address) = operand.effective_address(&self.registers) else {
                    unreachable!("address operand without an address");
                };
                if is_wide {
                    self.memory.write_as_u32(address, value)
                } else {
                    self.memory.write_as_u8(address, value as u8)
                }
            }
            Operand::Dx
            | Operand::Immediate(_)
            | Operand::JumpDisplacement(_)
            | Operand::Empty => {
                unreachable!("{:?} is not writable", operand)
            }
        }
    }

    /// Runs one decoded instruction. Returns the jump target, if control leaves the
    /// sequential path; `next_ip` is the address right after the instruction.
    fn process(&mut self, instr: &Instruction, next_ip: u32) -> Result<Option<u32>> {
        let is_wide = instr.is_wide();
        let relative = |displacement: i32| next_ip.wrapping_add(displacement as u32);

        let jump = match (instr.op_code, instr.left_operand) {
            (OpCode::Mov, left) => {
                let value = self.read_operand(&instr.right_operand, is_wide)?;
                self.write_operand(&left, is_wide, value)?;
                None
            }
            (OpCode::Add, left) => {
                // add does not touch the flags on this machine
                let value = self.read_operand(&left, is_wide)?;
                let right = self.read_operand(&instr.right_operand, is_wide)?;
                self.write_operand(&left, is_wide, value.wrapping_add(right))?;
                None
            }
            (OpCode::Sub, left) => {
                let value = self.read_operand(&left, is_wide)?;
                let right = self.read_operand(&instr.right_operand, is_wide)?;
                let (result, flags) = execute_sub(value, right);
                self.write_operand(&left, is_wide, result)?;
                self.flags = flags;
                None
            }
            (OpCode::Cmp, left) => {
                let value = self.read_operand(&left, is_wide)?;
                let right = self.read_operand(&instr.right_operand, is_wide)?;
                self.flags = execute_sub(value, right).1;
                None
            }
            (OpCode::Inc, left) => {
                let value = self.read_operand(&left, is_wide)?;
                self.write_operand(&left, is_wide, value.wrapping_add(1))?;
                None
            }

            (OpCode::Push, left) => {
                let value = self.read_operand(&left, true)?;
                self.push32(value)?;
                None
            }
            (OpCode::Pop, left) => {
                let value = self.pop32()?;
                self.write_operand(&left, true, value)?;
                None
            }
            (OpCode::Call, Operand::JumpDisplacement(displacement)) => {
                self.push32(next_ip)?;
                Some(relative(displacement))
            }
            (OpCode::Ret, _) => Some(self.pop32()?),
            (OpCode::Leave, _) => {
                // read the saved frame pointer before touching either register
                let frame = self.registers.get(Register::Ebp);
                let saved = self.memory.read_as_u32(frame)?;
                self.registers.set(Register::Esp, frame.wrapping_add(4));
                self.registers.set(Register::Ebp, saved);
                None
            }

            (OpCode::Jmp, Operand::JumpDisplacement(displacement)) => Some(relative(displacement)),
            (OpCode::Jcc(condition), Operand::JumpDisplacement(displacement)) => {
                condition.holds(self.flags).then(|| relative(displacement))
            }

            (OpCode::In, left) => {
                let port = self.read_operand(&instr.right_operand, true)? as u16;
                let value = self.io.io_in8(port)?;
                self.write_operand(&left, false, u32::from(value))?;
                None
            }
            (OpCode::Out, left) => {
                let port = self.read_operand(&left, true)? as u16;
                let value = self.read_operand(&instr.right_operand, false)? as u8;
                self.io.io_out8(port, value)?;
                None
            }
            (OpCode::Int, left) => {
                let vector = self.read_operand(&left, false)? as u8;
                self.software_interrupt(vector)?;
                None
            }

            _ => unreachable!("malformed instruction {:?}", instr),
        };

        Ok(jump)
    }

    fn execute_next(&mut self) -> Result<()> {
        let ip = self.ip;
        let opcode = self.memory.read_as_u8(ip)?;

        let mut cursor = CodeCursor::new(self.memory.as_slice(), ip);
        let instr = match decode_instruction(&mut cursor) {
            Ok(instr) => instr,
            Err(source) => {
                return Err(EmulatorError::Decode {
                    eip: ip,
                    bytes: cursor.consumed().to_vec(),
                    source,
                })
            }
        };
        let next_ip = ip.wrapping_add(cursor.movs());

        let jump = self.process(&instr, next_ip)?;
        self.ip = jump.unwrap_or(next_ip);

        tracing::trace!(
            eip = format_args!("{:#010x}", ip),
            opcode = format_args!("{:#04x}", opcode),
            flags = %self.flags.format(),
            "{}",
            instr.format()
        );

        Ok(())
    }

    /// Executes a single instruction unless the machine has already halted.
    pub fn step(&mut self) -> &State {
        if self.state != State::Running {
            return &self.state;
        }

        match self.execute_next() {
            Ok(()) => {
                self.steps += 1;
                if self.config.halt_on_zero_ip && self.ip == 0 {
                    tracing::debug!(steps = self.steps, "end of program");
                    self.state = State::Halted(HaltReason::EndOfProgram);
                }
            }
            Err(err) => {
                tracing::error!(eip = format_args!("{:#010x}", self.ip), "{}", err);
                self.state = State::Halted(HaltReason::Fault(err));
            }
        }

        &self.state
    }

    pub fn run(&mut self) -> &State {
        while self.state == State::Running {
            self.step();
        }

        &self.state
    }

    pub fn print_registers<T: Write>(&self, out: &mut T) -> std::io::Result<()> {
        for reg in Register::ALL {
            writeln!(
                out,
                "{} = {:08x}",
                reg.format().to_uppercase(),
                self.registers.get(reg)
            )?;
        }

        writeln!(out, "EIP = {:08x}", self.ip)
    }
}

/// Loads `image` at the configured origin and runs it until the machine halts.
pub fn execute<P: PortIo>(image: &[u8], io: P, config: SimulatorConfig) -> Result<Simulator<P>> {
    let mut machine = Simulator::new(config, io);
    machine.load(image)?;
    machine.run();

    Ok(machine)
}
