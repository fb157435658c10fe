//! The interpreter.
//!
//! One Rust call per guest frame. Each frame owns its locals and operand
//! stack; guest exceptions travel as [`VmError::Thrown`] and are matched
//! against the frame's handler table on the way out.

use std::cmp::Ordering;
use std::sync::Arc;

use kiln_ir::insn::{Insn, Operand};
use kiln_ir::opcode::Opcode;
use kiln_ir::{well_known as wk, Constant, MethodDesc, Type};
use kiln_stack::{ensure_sufficient_stack, DepthGuard};

use crate::class::{is_instance_of, Class, LinkedCode, Method, MethodImpl};
use crate::core::{self, throw};
use crate::value::{ObjRef, ObjectKind, Value};
use crate::VmError;

/// Invoke method `idx` of `class` with `args` (receiver first for instance
/// methods).
pub(crate) fn invoke(
    class: &Arc<Class>,
    idx: usize,
    args: Vec<Value>,
) -> Result<Option<Value>, VmError> {
    let method = class.method_at(idx);
    match &method.body {
        MethodImpl::Native(f) => f(&args),
        MethodImpl::Abstract => Err(throw(
            wk::NO_SUCH_MEMBER,
            &format!("abstract {}.{}", class.name(), method.sig()),
        )),
        MethodImpl::Code(code) => {
            let _depth =
                DepthGuard::enter().map_err(|e| throw(wk::STACK_OVERFLOW, &e.to_string()))?;
            ensure_sufficient_stack(|| Frame::new(class, method, code, args)?.run())
        }
    }
}

enum Flow {
    Next,
    Jump(u32),
    Return(Option<Value>),
}

struct Frame<'a> {
    class: &'a Arc<Class>,
    method: &'a Method,
    code: &'a LinkedCode,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl<'a> Frame<'a> {
    fn new(
        class: &'a Arc<Class>,
        method: &'a Method,
        code: &'a LinkedCode,
        args: Vec<Value>,
    ) -> Result<Self, VmError> {
        let mut frame = Frame {
            class,
            method,
            code,
            locals: vec![Value::Top; usize::from(code.max_locals)],
            stack: Vec::new(),
        };
        let mut slot = 0;
        for arg in args {
            if slot >= frame.locals.len() {
                return Err(frame.verify("arguments exceed max_locals"));
            }
            let width = arg.slots();
            frame.locals[slot] = arg;
            slot += width;
        }
        Ok(frame)
    }

    fn verify(&self, message: impl Into<String>) -> VmError {
        VmError::verify(
            format!("{}.{}", self.class.name(), self.method.sig()),
            message,
        )
    }

    fn run(mut self) -> Result<Option<Value>, VmError> {
        let code = self.code;
        let mut pc = 0usize;
        loop {
            let Some(insn) = code.insns.get(pc) else {
                return Err(self.verify("execution fell off the end of the code"));
            };
            match self.step(insn) {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(target)) => {
                    pc = code
                        .index_of(target)
                        .ok_or_else(|| self.verify(format!("bad branch target {target}")))?;
                }
                Ok(Flow::Return(value)) => return Ok(value),
                Err(VmError::Thrown(exc)) => match self.handler_for(insn.offset, &exc) {
                    Some(handler) => {
                        self.stack.clear();
                        self.stack.push(Value::object(exc));
                        pc = handler;
                    }
                    None => return Err(VmError::Thrown(exc)),
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn handler_for(&self, offset: u32, exc: &ObjRef) -> Option<usize> {
        self.code
            .handlers
            .iter()
            .find(|h| {
                h.start <= offset
                    && offset < h.end
                    && h.catch_type
                        .as_deref()
                        .map_or(true, |name| exc.class().is_subclass_of(name))
            })
            .map(|h| h.handler)
    }

    // ── Stack helpers ───────────────────────────────────────────────

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack
            .pop()
            .ok_or_else(|| self.verify("operand stack underflow"))
    }

    fn pop_int(&mut self) -> Result<i32, VmError> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            other => Err(self.verify(format!("expected int, found {other:?}"))),
        }
    }

    fn pop_long(&mut self) -> Result<i64, VmError> {
        match self.pop()? {
            Value::Long(v) => Ok(v),
            other => Err(self.verify(format!("expected long, found {other:?}"))),
        }
    }

    fn pop_float(&mut self) -> Result<f32, VmError> {
        match self.pop()? {
            Value::Float(v) => Ok(v),
            other => Err(self.verify(format!("expected float, found {other:?}"))),
        }
    }

    fn pop_double(&mut self) -> Result<f64, VmError> {
        match self.pop()? {
            Value::Double(v) => Ok(v),
            other => Err(self.verify(format!("expected double, found {other:?}"))),
        }
    }

    fn pop_ref(&mut self) -> Result<Option<ObjRef>, VmError> {
        match self.pop()? {
            Value::Ref(r) => Ok(r),
            other => Err(self.verify(format!("expected reference, found {other:?}"))),
        }
    }

    fn pop_nonnull(&mut self) -> Result<ObjRef, VmError> {
        self.pop_ref()?
            .ok_or_else(|| throw(wk::NULL_POINTER, "null reference"))
    }

    /// Pop `count` values, returning them in push order.
    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, VmError> {
        let at = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| self.verify("operand stack underflow"))?;
        Ok(self.stack.split_off(at))
    }

    /// Number of entries below the top `skip` that make up exactly `slots`
    /// stack slots.
    fn entries_for(&self, slots: usize, skip: usize) -> Result<usize, VmError> {
        let mut covered = 0;
        let mut count = 0;
        let mut iter = self.stack.iter().rev().skip(skip);
        while covered < slots {
            let value = iter
                .next()
                .ok_or_else(|| self.verify("operand stack underflow"))?;
            covered += value.slots();
            count += 1;
        }
        if covered == slots {
            Ok(count)
        } else {
            Err(self.verify("instruction splits a wide value"))
        }
    }

    /// The `dup` family: copy the top `top` slots below the next `below`.
    fn dup_slots(&mut self, top: usize, below: usize) -> Result<(), VmError> {
        let n = self.entries_for(top, 0)?;
        let m = if below == 0 {
            0
        } else {
            self.entries_for(below, n)?
        };
        let len = self.stack.len();
        let copy = self.stack[len - n..].to_vec();
        let at = len - n - m;
        self.stack.splice(at..at, copy);
        Ok(())
    }

    fn local(&self, slot: u16) -> Result<Value, VmError> {
        self.locals
            .get(usize::from(slot))
            .cloned()
            .ok_or_else(|| self.verify(format!("bad local {slot}")))
    }

    fn set_local(&mut self, slot: u16, value: Value) -> Result<(), VmError> {
        let slot = usize::from(slot);
        if slot >= self.locals.len() {
            return Err(self.verify(format!("bad local {slot}")));
        }
        let wide = value.is_wide();
        self.locals[slot] = value;
        if wide {
            if let Some(upper) = self.locals.get_mut(slot + 1) {
                *upper = Value::Top;
            }
        }
        Ok(())
    }

    // ── Pool helpers ────────────────────────────────────────────────

    fn constant(&self, insn: &Insn) -> Result<&'a Constant, VmError> {
        let class: &'a Arc<Class> = self.class;
        match insn.operand {
            Operand::Pool(idx) => class
                .pool
                .get(idx)
                .ok_or_else(|| self.verify(format!("bad pool index {idx}"))),
            _ => Err(self.verify("expected pool operand")),
        }
    }

    fn class_operand(&self, insn: &Insn) -> Result<&'a str, VmError> {
        match self.constant(insn)? {
            Constant::Class(name) => Ok(name),
            other => Err(self.verify(format!("expected class constant, found {other}"))),
        }
    }

    fn field_operand(&self, insn: &Insn) -> Result<(Arc<Class>, &'a str), VmError> {
        match self.constant(insn)? {
            Constant::Field { owner, name, .. } => Ok((self.class.resolve_class(owner)?, name)),
            other => Err(self.verify(format!("expected field constant, found {other}"))),
        }
    }

    fn method_operand(
        &self,
        insn: &Insn,
    ) -> Result<(&'a str, &'a str, &'a str, MethodDesc), VmError> {
        match self.constant(insn)? {
            Constant::Method {
                owner, name, desc, ..
            } => {
                let parsed = MethodDesc::parse(desc).map_err(|e| self.verify(e.to_string()))?;
                Ok((owner, name, desc, parsed))
            }
            other => Err(self.verify(format!("expected method constant, found {other}"))),
        }
    }

    // ── Arrays ──────────────────────────────────────────────────────

    fn array_load(&mut self) -> Result<Value, VmError> {
        let index = self.pop_int()?;
        let array = self.pop_nonnull()?;
        let ObjectKind::Array { items, .. } = array.kind() else {
            return Err(self.verify("array load from non-array"));
        };
        let items = items.lock();
        let value = usize::try_from(index).ok().and_then(|i| items.get(i).cloned());
        value.ok_or_else(|| {
            throw(
                wk::INDEX_OUT_OF_BOUNDS,
                &format!("index {index}, length {}", items.len()),
            )
        })
    }

    fn array_store(&mut self) -> Result<(), VmError> {
        let value = self.pop()?;
        let index = self.pop_int()?;
        let array = self.pop_nonnull()?;
        let ObjectKind::Array { elem, items } = array.kind() else {
            return Err(self.verify("array store to non-array"));
        };
        let value = match (elem, value) {
            (Type::Boolean, Value::Int(v)) => Value::Int(v & 1),
            (Type::Byte, Value::Int(v)) => Value::Int(i32::from(v as i8)),
            (Type::Char, Value::Int(v)) => Value::Int(i32::from(v as u16)),
            (Type::Short, Value::Int(v)) => Value::Int(i32::from(v as i16)),
            (Type::Object(_) | Type::Array(_), Value::Ref(Some(obj))) => {
                let target = elem.class_name().unwrap_or_default();
                if !is_instance_of(&obj, &target) {
                    return Err(throw(
                        wk::CLASS_CAST,
                        &format!("{} stored into {elem}[]", obj.class().name()),
                    ));
                }
                Value::Ref(Some(obj))
            }
            (_, value) => value,
        };
        let mut items = items.lock();
        let len = items.len();
        let Some(slot) = usize::try_from(index).ok().filter(|&i| i < len) else {
            return Err(throw(
                wk::INDEX_OUT_OF_BOUNDS,
                &format!("index {index}, length {len}"),
            ));
        };
        items[slot] = value;
        Ok(())
    }

    fn new_array(&mut self, elem: Type) -> Result<Value, VmError> {
        let count = self.pop_int()?;
        let count = usize::try_from(count)
            .map_err(|_| throw(wk::NEGATIVE_ARRAY_SIZE, &count.to_string()))?;
        let items = vec![Value::zero(&elem); count];
        Ok(Value::object(core::new_array(elem, items)))
    }

    // ── Arithmetic ──────────────────────────────────────────────────

    fn int_op(&mut self, f: impl FnOnce(i32, i32) -> Result<i32, VmError>) -> Result<(), VmError> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Value::Int(f(a, b)?));
        Ok(())
    }

    fn long_op(&mut self, f: impl FnOnce(i64, i64) -> Result<i64, VmError>) -> Result<(), VmError> {
        let b = self.pop_long()?;
        let a = self.pop_long()?;
        self.push(Value::Long(f(a, b)?));
        Ok(())
    }

    fn long_shift(&mut self, f: impl FnOnce(i64, u32) -> i64) -> Result<(), VmError> {
        let s = self.pop_int()?;
        let a = self.pop_long()?;
        self.push(Value::Long(f(a, (s & 0x3f) as u32)));
        Ok(())
    }

    fn float_op(&mut self, f: impl FnOnce(f32, f32) -> f32) -> Result<(), VmError> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push(Value::Float(f(a, b)));
        Ok(())
    }

    fn double_op(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<(), VmError> {
        let b = self.pop_double()?;
        let a = self.pop_double()?;
        self.push(Value::Double(f(a, b)));
        Ok(())
    }

    fn branch_if(&self, insn: &Insn, cond: bool) -> Result<Flow, VmError> {
        if !cond {
            return Ok(Flow::Next);
        }
        match insn.operand {
            Operand::Branch(target) => Ok(Flow::Jump(target)),
            _ => Err(self.verify("expected branch operand")),
        }
    }

    // ── Invocation ──────────────────────────────────────────────────

    fn call(&mut self, insn: &Insn) -> Result<(), VmError> {
        let (owner, name, desc, parsed) = self.method_operand(insn)?;
        let params = parsed.params().len();
        let missing = || throw(wk::NO_SUCH_MEMBER, &format!("{owner}.{name}{desc}"));

        let (target, idx, args) = match insn.op {
            Opcode::Invokestatic => {
                let class = self.class.resolve_class(owner)?;
                let (target, idx) = class.find_method(name, desc).ok_or_else(missing)?;
                (target, idx, self.pop_n(params)?)
            }
            Opcode::Invokespecial => {
                let class = self.class.resolve_class(owner)?;
                let (target, idx) = class.find_method(name, desc).ok_or_else(missing)?;
                let args = self.pop_n(params + 1)?;
                if args[0].is_null() {
                    return Err(throw(wk::NULL_POINTER, &format!("{name} on null")));
                }
                (target, idx, args)
            }
            _ => {
                let args = self.pop_n(params + 1)?;
                let receiver = args[0]
                    .as_object()
                    .ok_or_else(|| throw(wk::NULL_POINTER, &format!("{name} on null")))?;
                let (target, idx) = receiver
                    .class()
                    .find_method(name, desc)
                    .ok_or_else(missing)?;
                (target, idx, args)
            }
        };

        let result = invoke(&target, idx, args)?;
        if *parsed.ret() != Type::Void {
            let value =
                result.ok_or_else(|| self.verify(format!("{name}{desc} returned nothing")))?;
            self.push(value);
        }
        Ok(())
    }

    // ── Dispatch ────────────────────────────────────────────────────

    fn step(&mut self, insn: &Insn) -> Result<Flow, VmError> {
        use Opcode as O;
        match insn.op {
            O::Nop => {}
            O::AconstNull => self.push(Value::NULL),
            O::IconstM1 => self.push(Value::Int(-1)),
            O::Iconst0 => self.push(Value::Int(0)),
            O::Iconst1 => self.push(Value::Int(1)),
            O::Iconst2 => self.push(Value::Int(2)),
            O::Iconst3 => self.push(Value::Int(3)),
            O::Iconst4 => self.push(Value::Int(4)),
            O::Iconst5 => self.push(Value::Int(5)),
            O::Lconst0 => self.push(Value::Long(0)),
            O::Lconst1 => self.push(Value::Long(1)),
            O::Fconst0 => self.push(Value::Float(0.0)),
            O::Fconst1 => self.push(Value::Float(1.0)),
            O::Fconst2 => self.push(Value::Float(2.0)),
            O::Dconst0 => self.push(Value::Double(0.0)),
            O::Dconst1 => self.push(Value::Double(1.0)),
            O::Bipush | O::Sipush => match insn.operand {
                Operand::Int(v) => self.push(Value::Int(v)),
                _ => return Err(self.verify("expected immediate")),
            },
            O::Ldc | O::Ldc2 => {
                let value = match self.constant(insn)? {
                    Constant::Int(v) => Value::Int(*v),
                    Constant::Long(v) => Value::Long(*v),
                    Constant::Float(bits) => Value::Float(f32::from_bits(*bits)),
                    Constant::Double(bits) => Value::Double(f64::from_bits(*bits)),
                    Constant::Str(s) => Value::object(core::new_string(s)),
                    other => return Err(self.verify(format!("cannot load constant {other}"))),
                };
                self.push(value);
            }

            O::Iload | O::Lload | O::Fload | O::Dload | O::Aload => match insn.operand {
                Operand::Local(slot) => {
                    let value = self.local(slot)?;
                    self.push(value);
                }
                _ => return Err(self.verify("expected local operand")),
            },
            O::Istore | O::Lstore | O::Fstore | O::Dstore | O::Astore => match insn.operand {
                Operand::Local(slot) => {
                    let value = self.pop()?;
                    self.set_local(slot, value)?;
                }
                _ => return Err(self.verify("expected local operand")),
            },
            O::Iinc => match insn.operand {
                Operand::Iinc { local, delta } => match self.local(local)? {
                    Value::Int(v) => {
                        let bumped = v.wrapping_add(i32::from(delta));
                        self.set_local(local, Value::Int(bumped))?;
                    }
                    other => return Err(self.verify(format!("iinc on {other:?}"))),
                },
                _ => return Err(self.verify("expected iinc operand")),
            },

            O::Iaload | O::Laload | O::Faload | O::Daload | O::Aaload | O::Baload | O::Caload
            | O::Saload => {
                let value = self.array_load()?;
                self.push(value);
            }
            O::Iastore | O::Lastore | O::Fastore | O::Dastore | O::Aastore | O::Bastore
            | O::Castore | O::Sastore => self.array_store()?,

            O::Pop => {
                let n = self.entries_for(1, 0)?;
                self.stack.truncate(self.stack.len() - n);
            }
            O::Pop2 => {
                let n = self.entries_for(2, 0)?;
                self.stack.truncate(self.stack.len() - n);
            }
            O::Dup => self.dup_slots(1, 0)?,
            O::DupX1 => self.dup_slots(1, 1)?,
            O::DupX2 => self.dup_slots(1, 2)?,
            O::Dup2 => self.dup_slots(2, 0)?,
            O::Dup2X1 => self.dup_slots(2, 1)?,
            O::Dup2X2 => self.dup_slots(2, 2)?,
            O::Swap => {
                let a = self.pop()?;
                let b = self.pop()?;
                if a.is_wide() || b.is_wide() {
                    return Err(self.verify("swap of a wide value"));
                }
                self.push(a);
                self.push(b);
            }

            O::Iadd => self.int_op(|a, b| Ok(a.wrapping_add(b)))?,
            O::Isub => self.int_op(|a, b| Ok(a.wrapping_sub(b)))?,
            O::Imul => self.int_op(|a, b| Ok(a.wrapping_mul(b)))?,
            O::Idiv => self.int_op(|a, b| {
                if b == 0 {
                    Err(throw(wk::ARITHMETIC, "/ by zero"))
                } else {
                    Ok(a.wrapping_div(b))
                }
            })?,
            O::Irem => self.int_op(|a, b| {
                if b == 0 {
                    Err(throw(wk::ARITHMETIC, "/ by zero"))
                } else {
                    Ok(a.wrapping_rem(b))
                }
            })?,
            O::Iand => self.int_op(|a, b| Ok(a & b))?,
            O::Ior => self.int_op(|a, b| Ok(a | b))?,
            O::Ixor => self.int_op(|a, b| Ok(a ^ b))?,
            O::Ishl => self.int_op(|a, s| Ok(a.wrapping_shl(s as u32)))?,
            O::Ishr => self.int_op(|a, s| Ok(a.wrapping_shr(s as u32)))?,
            O::Iushr => self.int_op(|a, s| Ok((a as u32).wrapping_shr(s as u32) as i32))?,
            O::Ineg => {
                let v = self.pop_int()?;
                self.push(Value::Int(v.wrapping_neg()));
            }

            O::Ladd => self.long_op(|a, b| Ok(a.wrapping_add(b)))?,
            O::Lsub => self.long_op(|a, b| Ok(a.wrapping_sub(b)))?,
            O::Lmul => self.long_op(|a, b| Ok(a.wrapping_mul(b)))?,
            O::Ldiv => self.long_op(|a, b| {
                if b == 0 {
                    Err(throw(wk::ARITHMETIC, "/ by zero"))
                } else {
                    Ok(a.wrapping_div(b))
                }
            })?,
            O::Lrem => self.long_op(|a, b| {
                if b == 0 {
                    Err(throw(wk::ARITHMETIC, "/ by zero"))
                } else {
                    Ok(a.wrapping_rem(b))
                }
            })?,
            O::Land => self.long_op(|a, b| Ok(a & b))?,
            O::Lor => self.long_op(|a, b| Ok(a | b))?,
            O::Lxor => self.long_op(|a, b| Ok(a ^ b))?,
            O::Lshl => self.long_shift(i64::wrapping_shl)?,
            O::Lshr => self.long_shift(i64::wrapping_shr)?,
            O::Lushr => self.long_shift(|a, s| (a as u64).wrapping_shr(s) as i64)?,
            O::Lneg => {
                let v = self.pop_long()?;
                self.push(Value::Long(v.wrapping_neg()));
            }

            O::Fadd => self.float_op(|a, b| a + b)?,
            O::Fsub => self.float_op(|a, b| a - b)?,
            O::Fmul => self.float_op(|a, b| a * b)?,
            O::Fdiv => self.float_op(|a, b| a / b)?,
            O::Frem => self.float_op(|a, b| a % b)?,
            O::Fneg => {
                let v = self.pop_float()?;
                self.push(Value::Float(-v));
            }
            O::Dadd => self.double_op(|a, b| a + b)?,
            O::Dsub => self.double_op(|a, b| a - b)?,
            O::Dmul => self.double_op(|a, b| a * b)?,
            O::Ddiv => self.double_op(|a, b| a / b)?,
            O::Drem => self.double_op(|a, b| a % b)?,
            O::Dneg => {
                let v = self.pop_double()?;
                self.push(Value::Double(-v));
            }

            O::I2l => {
                let v = self.pop_int()?;
                self.push(Value::Long(i64::from(v)));
            }
            O::I2f => {
                let v = self.pop_int()?;
                self.push(Value::Float(v as f32));
            }
            O::I2d => {
                let v = self.pop_int()?;
                self.push(Value::Double(f64::from(v)));
            }
            O::L2i => {
                let v = self.pop_long()?;
                self.push(Value::Int(v as i32));
            }
            O::L2f => {
                let v = self.pop_long()?;
                self.push(Value::Float(v as f32));
            }
            O::L2d => {
                let v = self.pop_long()?;
                self.push(Value::Double(v as f64));
            }
            O::F2i => {
                let v = self.pop_float()?;
                self.push(Value::Int(v as i32));
            }
            O::F2l => {
                let v = self.pop_float()?;
                self.push(Value::Long(v as i64));
            }
            O::F2d => {
                let v = self.pop_float()?;
                self.push(Value::Double(f64::from(v)));
            }
            O::D2i => {
                let v = self.pop_double()?;
                self.push(Value::Int(v as i32));
            }
            O::D2l => {
                let v = self.pop_double()?;
                self.push(Value::Long(v as i64));
            }
            O::D2f => {
                let v = self.pop_double()?;
                self.push(Value::Float(v as f32));
            }
            O::I2b => {
                let v = self.pop_int()?;
                self.push(Value::Int(i32::from(v as i8)));
            }
            O::I2c => {
                let v = self.pop_int()?;
                self.push(Value::Int(i32::from(v as u16)));
            }
            O::I2s => {
                let v = self.pop_int()?;
                self.push(Value::Int(i32::from(v as i16)));
            }

            O::Lcmp => {
                let b = self.pop_long()?;
                let a = self.pop_long()?;
                self.push(Value::Int(ordering(a.cmp(&b))));
            }
            O::Fcmpl | O::Fcmpg => {
                let b = self.pop_float()?;
                let a = self.pop_float()?;
                let nan = if insn.op == O::Fcmpl { -1 } else { 1 };
                self.push(Value::Int(a.partial_cmp(&b).map_or(nan, ordering)));
            }
            O::Dcmpl | O::Dcmpg => {
                let b = self.pop_double()?;
                let a = self.pop_double()?;
                let nan = if insn.op == O::Dcmpl { -1 } else { 1 };
                self.push(Value::Int(a.partial_cmp(&b).map_or(nan, ordering)));
            }

            O::Ifeq | O::Ifne | O::Iflt | O::Ifge | O::Ifgt | O::Ifle => {
                let v = self.pop_int()?;
                let cond = match insn.op {
                    O::Ifeq => v == 0,
                    O::Ifne => v != 0,
                    O::Iflt => v < 0,
                    O::Ifge => v >= 0,
                    O::Ifgt => v > 0,
                    _ => v <= 0,
                };
                return self.branch_if(insn, cond);
            }
            O::IfIcmpeq | O::IfIcmpne | O::IfIcmplt | O::IfIcmpge | O::IfIcmpgt | O::IfIcmple => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                let cond = match insn.op {
                    O::IfIcmpeq => a == b,
                    O::IfIcmpne => a != b,
                    O::IfIcmplt => a < b,
                    O::IfIcmpge => a >= b,
                    O::IfIcmpgt => a > b,
                    _ => a <= b,
                };
                return self.branch_if(insn, cond);
            }
            O::IfAcmpeq | O::IfAcmpne => {
                let b = self.pop_ref()?;
                let a = self.pop_ref()?;
                let same = match (&a, &b) {
                    (None, None) => true,
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    _ => false,
                };
                return self.branch_if(insn, same == (insn.op == O::IfAcmpeq));
            }
            O::Ifnull | O::Ifnonnull => {
                let r = self.pop_ref()?;
                return self.branch_if(insn, r.is_none() == (insn.op == O::Ifnull));
            }
            O::Goto => return self.branch_if(insn, true),
            O::Tableswitch => {
                let key = self.pop_int()?;
                let Operand::Table {
                    default,
                    low,
                    targets,
                } = &insn.operand
                else {
                    return Err(self.verify("expected table operand"));
                };
                let slot = i64::from(key) - i64::from(*low);
                let target = usize::try_from(slot)
                    .ok()
                    .and_then(|i| targets.get(i))
                    .copied()
                    .unwrap_or(*default);
                return Ok(Flow::Jump(target));
            }
            O::Lookupswitch => {
                let key = self.pop_int()?;
                let Operand::Lookup { default, pairs } = &insn.operand else {
                    return Err(self.verify("expected lookup operand"));
                };
                let target = pairs
                    .binary_search_by_key(&key, |(k, _)| *k)
                    .map_or(*default, |i| pairs[i].1);
                return Ok(Flow::Jump(target));
            }

            O::Ireturn | O::Lreturn | O::Freturn | O::Dreturn | O::Areturn => {
                return Ok(Flow::Return(Some(self.pop()?)));
            }
            O::Return => return Ok(Flow::Return(None)),

            O::Getstatic => {
                let (class, name) = self.field_operand(insn)?;
                let (decl, slot) = class
                    .find_static(name)
                    .ok_or_else(|| throw(wk::NO_SUCH_MEMBER, name))?;
                self.push(decl.static_at(slot));
            }
            O::Putstatic => {
                let (class, name) = self.field_operand(insn)?;
                let value = self.pop()?;
                let (decl, slot) = class
                    .find_static(name)
                    .ok_or_else(|| throw(wk::NO_SUCH_MEMBER, name))?;
                decl.set_static_at(slot, value);
            }
            O::Getfield => {
                let (class, name) = self.field_operand(insn)?;
                let obj = self.pop_nonnull()?;
                let slot = class
                    .instance_slot(name)
                    .ok_or_else(|| throw(wk::NO_SUCH_MEMBER, name))?;
                let value = obj.get_slot(slot)?;
                self.push(value);
            }
            O::Putfield => {
                let (class, name) = self.field_operand(insn)?;
                let value = self.pop()?;
                let obj = self.pop_nonnull()?;
                let slot = class
                    .instance_slot(name)
                    .ok_or_else(|| throw(wk::NO_SUCH_MEMBER, name))?;
                obj.set_slot(slot, value)?;
            }

            O::Invokevirtual | O::Invokespecial | O::Invokestatic | O::Invokeinterface => {
                self.call(insn)?;
            }

            O::New => {
                let name = self.class_operand(insn)?;
                let class = self.class.resolve_class(name)?;
                let obj = class.allocate()?;
                self.push(Value::object(obj));
            }
            O::Newarray => {
                let Operand::ArrayType(elem) = &insn.operand else {
                    return Err(self.verify("expected array type operand"));
                };
                let array = self.new_array(elem.clone())?;
                self.push(array);
            }
            O::Anewarray => {
                let name = self.class_operand(insn)?;
                let elem = Type::from_class_name(name).map_err(|e| self.verify(e.to_string()))?;
                let array = self.new_array(elem)?;
                self.push(array);
            }
            O::Arraylength => {
                let array = self.pop_nonnull()?;
                let ObjectKind::Array { items, .. } = array.kind() else {
                    return Err(self.verify("arraylength of non-array"));
                };
                let len = i32::try_from(items.lock().len()).unwrap_or(i32::MAX);
                self.push(Value::Int(len));
            }
            O::Athrow => {
                let exc = self.pop_nonnull()?;
                return Err(VmError::Thrown(exc));
            }
            O::Checkcast => {
                let name = self.class_operand(insn)?;
                let top = self
                    .stack
                    .last()
                    .ok_or_else(|| self.verify("operand stack underflow"))?;
                if let Some(obj) = top.as_object() {
                    if !is_instance_of(obj, name) {
                        return Err(throw(
                            wk::CLASS_CAST,
                            &format!("{} cannot be cast to {name}", obj.class().name()),
                        ));
                    }
                }
            }
            O::Instanceof => {
                let name = self.class_operand(insn)?;
                let r = self.pop_ref()?;
                let is = r.is_some_and(|obj| is_instance_of(&obj, name));
                self.push(Value::Int(i32::from(is)));
            }
        }
        Ok(Flow::Next)
    }
}

fn ordering(ord: Ordering) -> i32 {
    match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
