//! Stable binary layout.
//!
//! ```text
//! magic "TARN" | version u32 | entry u32 | #constants u32 | #functions u32 | #code u32
//! constants   tag u8, payload
//! functions   name, arity u16, local_slots u16, code_offset u32, code_len u32
//! code        8 bytes per instruction
//! spans       start u32, end u32, file u32 per instruction
//! ```
//!
//! All integers are little-endian; strings are a u32 length followed by UTF-8.

use tarn_ast::Span;

use crate::error::DecodeError;
use crate::instruction::Instruction;
use crate::module::{BytecodeModule, Constant, FieldDesc, FunctionEntry, Storage, TypeDescriptor, MAGIC, VERSION};

const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_TYPE: u8 = 3;

fn wr_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}
fn wr_u16le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn wr_u32le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn wr_u64le(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn wr_str(out: &mut Vec<u8>, s: &str) {
    wr_u32le(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}
fn wr_len(out: &mut Vec<u8>, n: usize) {
    wr_u32le(out, u32::try_from(n).unwrap_or(u32::MAX));
}
fn span_part(v: usize) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl BytecodeModule {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.code.len() * (Instruction::SIZE + 12));
        out.extend_from_slice(&MAGIC);
        wr_u32le(&mut out, VERSION);
        wr_u32le(&mut out, self.entry);
        wr_len(&mut out, self.constants.len());
        wr_len(&mut out, self.functions.len());
        wr_len(&mut out, self.code.len());

        for constant in &self.constants {
            match constant {
                Constant::Int(v) => {
                    wr_u8(&mut out, TAG_INT);
                    wr_u64le(&mut out, *v as u64);
                }
                Constant::Float(v) => {
                    wr_u8(&mut out, TAG_FLOAT);
                    wr_u64le(&mut out, v.to_bits());
                }
                Constant::Str(s) => {
                    wr_u8(&mut out, TAG_STR);
                    wr_str(&mut out, s);
                }
                Constant::Type(desc) => {
                    wr_u8(&mut out, TAG_TYPE);
                    wr_str(&mut out, &desc.name);
                    wr_u8(&mut out, match desc.storage {
                        Storage::Heap => 0,
                        Storage::Inline => 1,
                    });
                    wr_len(&mut out, desc.fields.len());
                    for field in &desc.fields {
                        wr_str(&mut out, &field.name);
                        wr_u8(&mut out, field.owned as u8);
                    }
                }
            }
        }

        for f in &self.functions {
            wr_str(&mut out, &f.name);
            wr_u16le(&mut out, f.arity);
            wr_u16le(&mut out, f.local_slots);
            wr_u32le(&mut out, f.code_offset);
            wr_u32le(&mut out, f.code_len);
        }

        for ins in &self.code {
            out.extend_from_slice(&ins.encode());
        }

        for i in 0..self.code.len() {
            let span = self.spans.get(i).copied().unwrap_or_default();
            wr_u32le(&mut out, span_part(span.start));
            wr_u32le(&mut out, span_part(span.end));
            wr_u32le(&mut out, span_part(span.file_id));
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader { bytes, pos: 0 };
        if r.take(4)? != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = r.u32()?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let entry = r.u32()?;
        let nconst = r.u32()? as usize;
        let nfunc = r.u32()? as usize;
        let ncode = r.u32()? as usize;

        let mut constants = Vec::new();
        for _ in 0..nconst {
            let offset = r.pos;
            let constant = match r.u8()? {
                TAG_INT => Constant::Int(r.u64()? as i64),
                TAG_FLOAT => Constant::Float(f64::from_bits(r.u64()?)),
                TAG_STR => Constant::Str(r.string()?),
                TAG_TYPE => {
                    let name = r.string()?;
                    let storage_offset = r.pos;
                    let storage = match r.u8()? {
                        0 => Storage::Heap,
                        1 => Storage::Inline,
                        tag => return Err(DecodeError::InvalidTag { what: "storage", tag, offset: storage_offset }),
                    };
                    let nfields = r.u32()? as usize;
                    let mut fields = Vec::new();
                    for _ in 0..nfields {
                        let name = r.string()?;
                        let owned = r.u8()? != 0;
                        fields.push(FieldDesc { name, owned });
                    }
                    Constant::Type(TypeDescriptor { name, storage, fields })
                }
                tag => return Err(DecodeError::InvalidTag { what: "constant", tag, offset }),
            };
            constants.push(constant);
        }

        let mut functions = Vec::new();
        for _ in 0..nfunc {
            functions.push(FunctionEntry {
                name: r.string()?,
                arity: r.u16()?,
                local_slots: r.u16()?,
                code_offset: r.u32()?,
                code_len: r.u32()?,
            });
        }

        let mut code = Vec::new();
        for _ in 0..ncode {
            let raw = r.take(Instruction::SIZE)?;
            let mut buf = [0u8; Instruction::SIZE];
            buf.copy_from_slice(raw);
            code.push(Instruction::decode(buf));
        }

        let mut spans = Vec::new();
        for _ in 0..ncode {
            let start = r.u32()? as usize;
            let end = r.u32()? as usize;
            let file_id = r.u32()? as usize;
            spans.push(Span::new(start, end, file_id));
        }

        if r.pos != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - r.pos));
        }
        Ok(BytecodeModule { constants, functions, code, spans, entry })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(DecodeError::Truncated { offset: self.pos }),
        }
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let offset = self.pos;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;
    use pretty_assertions::assert_eq;

    fn sample() -> BytecodeModule {
        BytecodeModule {
            constants: vec![
                Constant::Int(-7),
                Constant::Float(2.5),
                Constant::Str("héllo".into()),
                Constant::Type(TypeDescriptor {
                    name: "app::main::Box".into(),
                    storage: Storage::Heap,
                    fields: vec![FieldDesc { name: "v".into(), owned: false }],
                }),
            ],
            functions: vec![FunctionEntry {
                name: "app::main::main".into(),
                arity: 0,
                local_slots: 1,
                code_offset: 0,
                code_len: 3,
            }],
            code: vec![
                Instruction::new(Opcode::PushConst, 0),
                Instruction::new(Opcode::StoreLocal, 0),
                Instruction::simple(Opcode::Return),
            ],
            spans: vec![Span::new(0, 4, 0), Span::new(5, 9, 0), Span::new(10, 12, 0)],
            entry: 0,
        }
    }

    #[test]
    fn test_bytes_decode_to_same_module() {
        let module = sample();
        let bytes = module.to_bytes();
        assert_eq!(&bytes[..4], b"TARN");
        assert_eq!(BytecodeModule::from_bytes(&bytes), Ok(module));
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        let mut bytes = sample().to_bytes();
        assert!(matches!(BytecodeModule::from_bytes(&bytes[..bytes.len() - 1]), Err(DecodeError::Truncated { .. })));
        bytes[0] = b'X';
        assert_eq!(BytecodeModule::from_bytes(&bytes), Err(DecodeError::BadMagic));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        assert_eq!(BytecodeModule::from_bytes(&bytes), Err(DecodeError::TrailingBytes(1)));
    }
}
