//! Fetch-decode-execute loop

use std::rc::Rc;

use tarn_bytecode::{disassemble_instruction, verify, BytecodeModule, Constant, Opcode, Storage, VerifyError};
use tracing::{debug, trace};

use crate::config::VmConfig;
use crate::heap::Heap;
use crate::output::OutputSink;
use crate::trap::{Trap, TrapKind};
use crate::value::Value;

/// Activation record of one call
#[derive(Debug)]
struct Frame {
    function: u32,
    pc: u32,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn pop(&mut self) -> Result<Value, TrapKind> {
        self.stack.pop().ok_or(TrapKind::StackUnderflow)
    }

    fn pop_int(&mut self) -> Result<i64, TrapKind> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            _ => Err(TrapKind::InvalidOperand),
        }
    }

    fn pop_float(&mut self) -> Result<f64, TrapKind> {
        match self.pop()? {
            Value::Float(v) => Ok(v),
            _ => Err(TrapKind::InvalidOperand),
        }
    }

    fn pop_bool(&mut self) -> Result<bool, TrapKind> {
        match self.pop()? {
            Value::Bool(v) => Ok(v),
            _ => Err(TrapKind::InvalidOperand),
        }
    }

    fn pop_str(&mut self) -> Result<Rc<str>, TrapKind> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            _ => Err(TrapKind::InvalidOperand),
        }
    }

    /// Pop `n` values, returned in push order
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, TrapKind> {
        let start = self.stack.len().checked_sub(n).ok_or(TrapKind::StackUnderflow)?;
        Ok(self.stack.split_off(start))
    }

    fn local(&mut self, slot: u32) -> Result<&mut Value, TrapKind> {
        self.locals.get_mut(slot as usize).ok_or(TrapKind::InvalidOperand)
    }
}

/// What the loop does after an instruction
enum Flow {
    Next,
    /// The entry function returned
    Done(Value),
}

/// Runtime view of one type descriptor
#[derive(Debug, Clone)]
struct Layout {
    storage: Storage,
    owned: Rc<[bool]>,
}

pub struct Vm {
    module: BytecodeModule,
    config: VmConfig,
    /// Pushable value of each constant; `None` for type descriptors
    constants: Vec<Option<Value>>,
    /// Layout of each type-descriptor constant
    layouts: Vec<Option<Layout>>,
    frames: Vec<Frame>,
    heap: Heap,
    output: OutputSink,
}

impl Vm {
    /// Verify `module` and prepare it for execution
    pub fn new(module: BytecodeModule, config: VmConfig) -> Result<Self, VerifyError> {
        verify(&module)?;
        let constants = module
            .constants
            .iter()
            .map(|c| match c {
                Constant::Int(v) => Some(Value::Int(*v)),
                Constant::Float(v) => Some(Value::Float(*v)),
                Constant::Str(s) => Some(Value::str(s)),
                Constant::Type(_) => None,
            })
            .collect();
        let layouts = module
            .constants
            .iter()
            .map(|c| match c {
                Constant::Type(desc) => Some(Layout {
                    storage: desc.storage,
                    owned: desc.fields.iter().map(|f| f.owned).collect(),
                }),
                _ => None,
            })
            .collect();
        debug!(
            functions = module.functions.len(),
            constants = module.constants.len(),
            instructions = module.code.len(),
            "loaded module"
        );
        Ok(Self {
            module,
            config,
            constants,
            layouts,
            frames: Vec::new(),
            heap: Heap::new(),
            output: OutputSink::Stdout,
        })
    }

    /// Collect `print` output in memory instead of writing to stdout
    pub fn capture_output(mut self) -> Self {
        self.output = OutputSink::Buffer(String::new());
        self
    }

    /// Everything printed so far, when output is captured
    pub fn output(&self) -> Option<&str> {
        self.output.captured()
    }

    pub fn module(&self) -> &BytecodeModule {
        &self.module
    }

    /// Heap objects not yet freed
    pub fn live_objects(&self) -> usize {
        self.heap.live()
    }

    /// Run the entry function to completion
    pub fn run(&mut self) -> Result<Value, Trap> {
        self.frames.clear();
        let entry = self.module.entry;
        self.push_frame(entry, Vec::new()).map_err(|kind| Trap { kind, function: entry, offset: 0 })?;

        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Value::Unit);
            };
            let (function, offset) = (frame.function, frame.pc);
            frame.pc += 1;

            let instruction = self
                .module
                .function(function)
                .and_then(|f| self.module.code_of(f).get(offset as usize))
                .copied();
            let result = match instruction {
                Some(ins) => {
                    trace!(function, offset, "{}", disassemble_instruction(&self.module, &ins));
                    self.step(ins.op, ins.a, ins.b)
                }
                None => Err(TrapKind::InvalidOperand),
            };

            match result {
                Ok(Flow::Next) => {}
                Ok(Flow::Done(value)) => return Ok(value),
                Err(kind) => {
                    debug!(%kind, function, offset, "trap");
                    return Err(Trap { kind, function, offset });
                }
            }
        }
    }

    fn push_frame(&mut self, function: u32, args: Vec<Value>) -> Result<(), TrapKind> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(TrapKind::StackOverflow);
        }
        let entry = self.module.function(function).ok_or(TrapKind::InvalidOperand)?;
        let mut locals = args;
        locals.resize(entry.local_slots.max(entry.arity) as usize, Value::Unit);
        debug!(function = %entry.name, depth = self.frames.len() + 1, "call");
        self.frames.push(Frame { function, pc: 0, locals, stack: Vec::new() });
        Ok(())
    }

    fn frame(&mut self) -> Result<&mut Frame, TrapKind> {
        self.frames.last_mut().ok_or(TrapKind::StackUnderflow)
    }

    fn push(&mut self, value: Value) -> Result<(), TrapKind> {
        self.frame()?.stack.push(value);
        Ok(())
    }

    fn layout(&self, ty: u32) -> Result<Layout, TrapKind> {
        self.layouts.get(ty as usize).cloned().flatten().ok_or(TrapKind::InvalidOperand)
    }

    /// Release an owned value
    fn release(&mut self, value: Value) -> Result<(), TrapKind> {
        match value {
            Value::Ref(r) => self.heap.release(r),
            _ => Ok(()),
        }
    }

    fn int_arith(
        &mut self,
        checked: fn(i64, i64) -> Option<i64>,
        wrapping: fn(i64, i64) -> i64,
    ) -> Result<(), TrapKind> {
        let frame = self.frame()?;
        let b = frame.pop_int()?;
        let a = frame.pop_int()?;
        let result = if self.config.checked_arithmetic {
            checked(a, b).ok_or(TrapKind::ArithmeticOverflow)?
        } else {
            wrapping(a, b)
        };
        self.push(Value::Int(result))
    }

    fn int_division(
        &mut self,
        checked: fn(i64, i64) -> Option<i64>,
        wrapping: fn(i64, i64) -> i64,
    ) -> Result<(), TrapKind> {
        let frame = self.frame()?;
        let divisor = match frame.stack.last() {
            Some(Value::Int(v)) => *v,
            Some(_) => return Err(TrapKind::InvalidOperand),
            None => return Err(TrapKind::StackUnderflow),
        };
        if divisor == 0 {
            return Err(TrapKind::DivisionByZero);
        }
        self.int_arith(checked, wrapping)
    }

    fn float_arith(&mut self, f: fn(f64, f64) -> f64) -> Result<(), TrapKind> {
        let frame = self.frame()?;
        let b = frame.pop_float()?;
        let a = frame.pop_float()?;
        frame.stack.push(Value::Float(f(a, b)));
        Ok(())
    }

    fn int_cmp(&mut self, f: fn(&i64, &i64) -> bool) -> Result<(), TrapKind> {
        let frame = self.frame()?;
        let b = frame.pop_int()?;
        let a = frame.pop_int()?;
        frame.stack.push(Value::Bool(f(&a, &b)));
        Ok(())
    }

    fn float_cmp(&mut self, f: fn(&f64, &f64) -> bool) -> Result<(), TrapKind> {
        let frame = self.frame()?;
        let b = frame.pop_float()?;
        let a = frame.pop_float()?;
        frame.stack.push(Value::Bool(f(&a, &b)));
        Ok(())
    }

    fn step(&mut self, op: u8, a: u32, b: u16) -> Result<Flow, TrapKind> {
        let op = Opcode::try_from(op).map_err(|_| TrapKind::InvalidOpcode)?;
        match op {
            // === PUSH ===
            Opcode::PushConst => {
                let value = self.constants.get(a as usize).cloned().flatten().ok_or(TrapKind::InvalidOperand)?;
                self.push(value)?;
            }
            Opcode::PushUnit => self.push(Value::Unit)?,
            Opcode::PushNull => self.push(Value::Null)?,
            Opcode::PushTrue => self.push(Value::Bool(true))?,
            Opcode::PushFalse => self.push(Value::Bool(false))?,

            // === LOCAL ===
            Opcode::LoadLocal => {
                let frame = self.frame()?;
                let value = frame.local(a)?.clone();
                frame.stack.push(value);
            }
            Opcode::StoreLocal => {
                let frame = self.frame()?;
                let value = frame.pop()?;
                *frame.local(a)? = value;
            }
            Opcode::Pop => {
                self.frame()?.pop()?;
            }

            // === ARITH ===
            Opcode::AddInt => self.int_arith(i64::checked_add, i64::wrapping_add)?,
            Opcode::SubInt => self.int_arith(i64::checked_sub, i64::wrapping_sub)?,
            Opcode::MulInt => self.int_arith(i64::checked_mul, i64::wrapping_mul)?,
            Opcode::DivInt => self.int_division(i64::checked_div, i64::wrapping_div)?,
            Opcode::RemInt => self.int_division(i64::checked_rem, i64::wrapping_rem)?,
            Opcode::NegInt => {
                let checked = self.config.checked_arithmetic;
                let frame = self.frame()?;
                let v = frame.pop_int()?;
                let result = if checked { v.checked_neg().ok_or(TrapKind::ArithmeticOverflow)? } else { v.wrapping_neg() };
                frame.stack.push(Value::Int(result));
            }
            Opcode::AddFloat => self.float_arith(|a, b| a + b)?,
            Opcode::SubFloat => self.float_arith(|a, b| a - b)?,
            Opcode::MulFloat => self.float_arith(|a, b| a * b)?,
            Opcode::DivFloat => self.float_arith(|a, b| a / b)?,
            Opcode::RemFloat => self.float_arith(|a, b| a % b)?,
            Opcode::NegFloat => {
                let frame = self.frame()?;
                let v = frame.pop_float()?;
                frame.stack.push(Value::Float(-v));
            }
            Opcode::Concat => {
                let frame = self.frame()?;
                let right = frame.pop_str()?;
                let left = frame.pop_str()?;
                let mut joined = String::with_capacity(left.len() + right.len());
                joined.push_str(&left);
                joined.push_str(&right);
                frame.stack.push(Value::Str(Rc::from(joined)));
            }

            // === CMP ===
            Opcode::EqInt => self.int_cmp(i64::eq)?,
            Opcode::NeInt => self.int_cmp(i64::ne)?,
            Opcode::LtInt => self.int_cmp(i64::lt)?,
            Opcode::LeInt => self.int_cmp(i64::le)?,
            Opcode::GtInt => self.int_cmp(i64::gt)?,
            Opcode::GeInt => self.int_cmp(i64::ge)?,
            Opcode::EqFloat => self.float_cmp(f64::eq)?,
            Opcode::NeFloat => self.float_cmp(f64::ne)?,
            Opcode::LtFloat => self.float_cmp(f64::lt)?,
            Opcode::LeFloat => self.float_cmp(f64::le)?,
            Opcode::GtFloat => self.float_cmp(f64::gt)?,
            Opcode::GeFloat => self.float_cmp(f64::ge)?,
            Opcode::EqBool | Opcode::NeBool => {
                let frame = self.frame()?;
                let right = frame.pop_bool()?;
                let left = frame.pop_bool()?;
                frame.stack.push(Value::Bool((left == right) == (op == Opcode::EqBool)));
            }
            Opcode::EqStr | Opcode::NeStr => {
                let frame = self.frame()?;
                let right = frame.pop_str()?;
                let left = frame.pop_str()?;
                frame.stack.push(Value::Bool((left == right) == (op == Opcode::EqStr)));
            }
            Opcode::Not => {
                let frame = self.frame()?;
                let v = frame.pop_bool()?;
                frame.stack.push(Value::Bool(!v));
            }
            Opcode::IsNull => {
                let frame = self.frame()?;
                let v = frame.pop()?;
                frame.stack.push(Value::Bool(v == Value::Null));
            }

            // === CONTROL ===
            Opcode::Jump => self.frame()?.pc = a,
            Opcode::JumpIfFalse => {
                let frame = self.frame()?;
                if !frame.pop_bool()? {
                    frame.pc = a;
                }
            }
            Opcode::Call => {
                let args = self.frame()?.pop_n(b as usize)?;
                self.push_frame(a, args)?;
            }
            Opcode::Return => {
                let mut frame = self.frames.pop().ok_or(TrapKind::StackUnderflow)?;
                let value = frame.pop()?;
                if self.frames.is_empty() {
                    return Ok(Flow::Done(value));
                }
                self.push(value)?;
            }

            // === OBJECT ===
            Opcode::Alloc | Opcode::MakeStruct => {
                let layout = self.layout(a)?;
                let fields = self.frame()?.pop_n(layout.owned.len())?;
                let value = match layout.storage {
                    Storage::Heap => Value::Ref(self.heap.alloc(a, fields, layout.owned)),
                    Storage::Inline => Value::Struct { ty: a, fields: Rc::from(fields) },
                };
                self.push(value)?;
            }
            Opcode::LoadField => {
                let object = self.frame()?.pop()?;
                let value = match &object {
                    Value::Ref(r) => self.heap.get(*r)?.fields.get(a as usize).cloned(),
                    Value::Struct { fields, .. } => fields.get(a as usize).cloned(),
                    _ => None,
                };
                self.push(value.ok_or(TrapKind::InvalidOperand)?)?;
            }
            Opcode::StoreField => {
                let frame = self.frame()?;
                let value = frame.pop()?;
                let Value::Ref(r) = frame.pop()? else {
                    return Err(TrapKind::InvalidOperand);
                };
                let object = self.heap.get_mut(r)?;
                let ty = object.ty;
                let slot = object.fields.get_mut(a as usize).ok_or(TrapKind::InvalidOperand)?;
                let old = std::mem::replace(slot, value);
                if self.layout(ty)?.owned.get(a as usize).copied().unwrap_or(false) {
                    self.release(old)?;
                }
            }
            Opcode::Clone => {
                let value = match self.frame()?.pop()? {
                    Value::Ref(r) => Value::Ref(self.heap.deep_clone(r)?),
                    other => other,
                };
                self.push(value)?;
            }

            // === DROP ===
            Opcode::Drop => {
                let value = std::mem::replace(self.frame()?.local(a)?, Value::Unit);
                self.release(value)?;
            }
            Opcode::DropTop => {
                let value = self.frame()?.pop()?;
                self.release(value)?;
            }

            // === IO ===
            Opcode::Print => {
                let value = self.frame()?.pop()?;
                self.output.write_line(&value.to_string());
            }
        }
        Ok(Flow::Next)
    }
}
