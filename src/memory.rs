use std::ops::Range;

use crate::error::{EmulatorError, Result};

/// Flat guest memory. Every access is bounds checked; nothing wraps.
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Memory {
        Memory {
            bytes: vec![0u8; size],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, address: u32, len: usize) -> Result<Range<usize>> {
        let start = address as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(EmulatorError::OutOfBounds {
                address,
                len,
                capacity: self.bytes.len(),
            }),
        }
    }

    pub fn read_as_u8(&self, address: u32) -> Result<u8> {
        let range = self.range(address, 1)?;

        Ok(self.bytes[range.start])
    }

    pub fn read_as_u32(&self, address: u32) -> Result<u32> {
        let range = self.range(address, 4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[range]);

        Ok(u32::from_le_bytes(word))
    }

    pub fn write_as_u8(&mut self, address: u32, value: u8) -> Result<()> {
        let range = self.range(address, 1)?;
        self.bytes[range.start] = value;

        Ok(())
    }

    pub fn write_as_u32(&mut self, address: u32, value: u32) -> Result<()> {
        let range = self.range(address, 4)?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes());

        Ok(())
    }

    /// Copies a program image to `origin`, leaving the rest untouched.
    pub fn load(&mut self, origin: u32, image: &[u8]) -> Result<()> {
        let range = self
            .range(origin, image.len())
            .map_err(|_| EmulatorError::ImageTooLarge {
                origin,
                len: image.len(),
                capacity: self.bytes.len(),
            })?;
        self.bytes[range].copy_from_slice(image);

        Ok(())
    }
}
