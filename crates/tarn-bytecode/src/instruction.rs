//! Fixed 8-byte instruction format

use crate::opcode::Opcode;

/// `op | reserved | b (u16 LE) | a (u32 LE)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub op: u8,
    /// Secondary operand; the argument count of a `Call`
    pub b: u16,
    /// Primary operand
    pub a: u32,
}

impl Instruction {
    pub const SIZE: usize = 8;

    #[inline]
    pub const fn new(op: Opcode, a: u32) -> Self {
        Self { op: op as u8, b: 0, a }
    }

    #[inline]
    pub const fn simple(op: Opcode) -> Self {
        Self::new(op, 0)
    }

    #[inline]
    pub const fn call(function: u32, argc: u16) -> Self {
        Self { op: Opcode::Call as u8, b: argc, a: function }
    }

    /// `None` for bytes outside the opcode set
    #[inline]
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.op).ok()
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let b = self.b.to_le_bytes();
        let a = self.a.to_le_bytes();
        [self.op, 0, b[0], b[1], a[0], a[1], a[2], a[3]]
    }

    pub fn decode(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            op: bytes[0],
            b: u16::from_le_bytes([bytes[2], bytes[3]]),
            a: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_little_endian() {
        let ins = Instruction::call(0x0102_0304, 0x0506);
        assert_eq!(ins.encode(), [Opcode::Call as u8, 0, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(Instruction::decode(ins.encode()), ins);
    }

    #[test]
    fn test_unknown_opcode_byte() {
        let ins = Instruction { op: 0xFF, b: 0, a: 0 };
        assert_eq!(ins.opcode(), None);
    }
}
