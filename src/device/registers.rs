//! Register device over a memory-mapped window.

use std::io;
use std::path::Path;

use super::{unimplemented_operation, Arguments, Device, Reply};
use crate::core::{MemoryMap, WORD_SIZE};
use crate::devgen::OperationDescriptor;
use crate::error::{Error, Result};

const DECLARATION: &str = "class Registers {
  public:
    uint32_t read(uint32_t offset);
    void write(uint32_t offset, uint32_t value);
    void set_bit(uint32_t offset, uint32_t index);
    void clear_bit(uint32_t offset, uint32_t index);
    void toggle_bit(uint32_t offset, uint32_t index);

    #pragma devlink write_array arg{data} arg{len}
    void write_buffer(uint32_t offset, const uint32_t* data, uint32_t len);

    #pragma devlink read_array arg{len}
    const uint32_t* read_buffer(uint32_t offset, uint32_t len);

    uint32_t size();

    #pragma devlink is_failed
    bool is_failed();
};
";

pub struct Registers {
    map: MemoryMap,
}

impl Registers {
    pub fn open<P: AsRef<Path>>(path: P, size: usize) -> io::Result<Self> {
        Ok(Self {
            map: MemoryMap::open(path, size)?,
        })
    }

    pub fn size(&self) -> usize {
        self.map.size()
    }

    fn out_of_range(&self, op: &OperationDescriptor, offset: u32, words: usize) -> Error {
        Error::Device {
            device: "Registers".to_string(),
            operation: op.name.clone(),
            reason: format!(
                "{} words at offset {:#x} outside the {} byte window",
                words,
                offset,
                self.map.size()
            ),
        }
    }

    fn update(&mut self, op: &OperationDescriptor, args: &Arguments, f: impl FnOnce(u32, u32) -> u32) -> Result<Reply> {
        let offset = args.get::<u32>("offset")?;
        let index = args.get::<u32>("index")?;
        if index >= 32 {
            return Err(Error::Device {
                device: "Registers".to_string(),
                operation: op.name.clone(),
                reason: format!("bit index {} out of range", index),
            });
        }
        let value = self
            .map
            .read_u32(offset as usize)
            .ok_or_else(|| self.out_of_range(op, offset, 1))?;
        self.map
            .write_u32(offset as usize, f(value, 1 << index))
            .ok_or_else(|| self.out_of_range(op, offset, 1))?;
        Ok(Reply::None)
    }
}

impl Device for Registers {
    fn declaration(&self) -> &str {
        DECLARATION
    }

    fn execute(&mut self, op: &OperationDescriptor, args: &Arguments) -> Result<Reply> {
        match op.name.as_str() {
            "read" => {
                let offset = args.get::<u32>("offset")?;
                let value = self
                    .map
                    .read_u32(offset as usize)
                    .ok_or_else(|| self.out_of_range(op, offset, 1))?;
                Ok(Reply::scalar(value))
            }
            "write" => {
                let offset = args.get::<u32>("offset")?;
                let value = args.get::<u32>("value")?;
                self.map
                    .write_u32(offset as usize, value)
                    .ok_or_else(|| self.out_of_range(op, offset, 1))?;
                Ok(Reply::None)
            }
            "set_bit" => self.update(op, args, |v, mask| v | mask),
            "clear_bit" => self.update(op, args, |v, mask| v & !mask),
            "toggle_bit" => self.update(op, args, |v, mask| v ^ mask),
            "write_buffer" => {
                let offset = args.get::<u32>("offset")?;
                let data = args.to_vec::<u32>("data")?;
                self.map
                    .write_words(offset as usize, &data)
                    .ok_or_else(|| self.out_of_range(op, offset, data.len()))?;
                Ok(Reply::None)
            }
            "read_buffer" => {
                let offset = args.get::<u32>("offset")?;
                let len = args.get::<u32>("len")? as usize;
                let words = self
                    .map
                    .read_words(offset as usize, len)
                    .ok_or_else(|| self.out_of_range(op, offset, len))?;
                Ok(Reply::elements(&words))
            }
            "size" => Ok(Reply::scalar(self.map.size() as u32)),
            _ => Err(unimplemented_operation("Registers", op)),
        }
    }

    fn is_failed(&self) -> bool {
        !self.map.is_valid()
    }

    /// Buffers beyond the end of the window are cut to what fits.
    fn accept_buffer(&self, _op: &OperationDescriptor, args: &Arguments, requested: usize) -> usize {
        let offset = args.get::<u32>("offset").unwrap_or(u32::MAX) as usize;
        let room = self.map.size().saturating_sub(offset) / WORD_SIZE;
        requested.min(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Value;
    use crate::devgen::annotations::DEFAULT_NAMESPACE;
    use crate::devgen::{parse_source, DeviceDescriptor, IoType};
    use crate::protocol::codec::{Elements, Scalar};

    fn setup() -> (tempfile::TempDir, Registers, DeviceDescriptor) {
        let dir = tempfile::tempdir().unwrap();
        let regs = Registers::open(dir.path().join("regs.bin"), 64).unwrap();
        let desc = parse_source(regs.declaration(), "registers", DEFAULT_NAMESPACE)
            .unwrap()
            .remove(0);
        (dir, regs, desc)
    }

    fn args(values: &[(&str, u32)]) -> Arguments {
        let mut args = Arguments::new();
        for (name, v) in values {
            args.push(*name, Value::Scalar(Scalar::U32(*v)));
        }
        args
    }

    #[test]
    fn test_declaration() {
        let (_dir, _regs, desc) = setup();
        assert_eq!(desc.tag, "REGISTERS");
        assert_eq!(desc.is_failed.as_deref(), Some("is_failed"));
        assert_eq!(desc.operation_by_name("read_buffer").unwrap().io_type, IoType::ReadArray);
        assert!(desc.operation_by_name("write_buffer").unwrap().write_array.is_some());
    }

    #[test]
    fn test_bits() {
        let (_dir, mut regs, desc) = setup();
        let op = |name: &str| desc.operation_by_name(name).unwrap();

        regs.execute(op("write"), &args(&[("offset", 4), ("value", 0b1010)])).unwrap();
        regs.execute(op("set_bit"), &args(&[("offset", 4), ("index", 0)])).unwrap();
        regs.execute(op("clear_bit"), &args(&[("offset", 4), ("index", 3)])).unwrap();
        regs.execute(op("toggle_bit"), &args(&[("offset", 4), ("index", 2)])).unwrap();
        assert_eq!(
            regs.execute(op("read"), &args(&[("offset", 4)])).unwrap(),
            Reply::scalar(0b0111u32)
        );
        assert!(regs.execute(op("set_bit"), &args(&[("offset", 4), ("index", 32)])).is_err());
        assert!(regs.execute(op("read"), &args(&[("offset", 64)])).is_err());
    }

    #[test]
    fn test_buffers() {
        let (_dir, mut regs, desc) = setup();
        let write = desc.operation_by_name("write_buffer").unwrap();

        let mut call = args(&[("offset", 8), ("len", 3)]);
        call.push("data", Value::Buffer(Elements::from_slice(&[1u32, 2, 3])));
        regs.execute(write, &call).unwrap();

        let read = desc.operation_by_name("read_buffer").unwrap();
        assert_eq!(
            regs.execute(read, &args(&[("offset", 4), ("len", 5)])).unwrap(),
            Reply::elements(&[0u32, 1, 2, 3, 0])
        );

        assert_eq!(regs.accept_buffer(write, &args(&[("offset", 56)]), 10), 2);
        assert_eq!(regs.accept_buffer(write, &args(&[("offset", 0)]), 10), 10);
    }
}
