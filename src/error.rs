use thiserror::Error;

/// Failures that can be detected from instruction bytes alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("unimplemented sub-opcode {opcode:#04x} /{sub}")]
    UnknownSubOpcode { opcode: u8, sub: u8 },

    /// SIB-indexed or disp32-only memory operands.
    #[error("unimplemented addressing form mod={mode} rm={rm}")]
    UnimplementedAddressing { mode: u8, rm: u8 },

    #[error("instruction runs past the end of memory")]
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulatorError {
    #[error("decode failed at eip={eip:#010x} (bytes {bytes:02x?}): {source}")]
    Decode {
        eip: u32,
        bytes: Vec<u8>,
        #[source]
        source: DecodeError,
    },

    #[error("memory access out of bounds: address={address:#010x} len={len} capacity={capacity:#x}")]
    OutOfBounds {
        address: u32,
        len: usize,
        capacity: usize,
    },

    #[error("image of {len} bytes does not fit at origin {origin:#x} (capacity {capacity:#x})")]
    ImageTooLarge {
        origin: u32,
        len: usize,
        capacity: usize,
    },

    /// Host console failure. Stored as text so the error stays `Clone`.
    #[error("console i/o failed: {0}")]
    Console(String),
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
