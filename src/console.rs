use std::io::{ErrorKind, Read, Write};

use crate::error::{EmulatorError, Result};

/// COM1 data register; the only port wired to the host console.
pub const CONSOLE_PORT: u16 = 0x03f8;

/// Host side of the `in`/`out` instructions.
pub trait PortIo {
    fn io_in8(&mut self, port: u16) -> Result<u8>;
    fn io_out8(&mut self, port: u16, value: u8) -> Result<()>;
}

/// Serial console: bytes written to [`CONSOLE_PORT`] go to `output`, reads from it block on
/// `input`. Other ports read as zero and ignore writes.
pub struct SerialConsole<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> SerialConsole<R, W> {
    pub fn new(input: R, output: W) -> SerialConsole<R, W> {
        SerialConsole { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }
}

fn console_error(err: std::io::Error) -> EmulatorError {
    EmulatorError::Console(err.to_string())
}

impl<R: Read, W: Write> PortIo for SerialConsole<R, W> {
    fn io_in8(&mut self, port: u16) -> Result<u8> {
        if port != CONSOLE_PORT {
            return Ok(0);
        }

        let mut byte = [0u8; 1];
        match self.input.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                tracing::debug!("console input exhausted, reading 0");
                Ok(0)
            }
            Err(err) => Err(console_error(err)),
        }
    }

    fn io_out8(&mut self, port: u16, value: u8) -> Result<()> {
        if port != CONSOLE_PORT {
            return Ok(());
        }

        self.output.write_all(&[value]).map_err(console_error)?;
        self.output.flush().map_err(console_error)
    }
}
