//! The instruction emitter.
//!
//! A [`CodeEmitter`] builds one method body. It borrows its
//! [`TypeEmitter`] mutably for its whole life: constants go into the type's
//! pool, and [`CodeEmitter::end_method`] hands the finished body back. Only
//! one body can therefore be open per type at a time.
//!
//! Operand stack depth is tracked per instruction in slots (wide values count
//! two). Structural problems found while emitting (underflow, inconsistent
//! depth at a label, a bad argument index) are recorded and reported by
//! `end_method`, so the individual emission calls stay infallible. Calls
//! whose arguments can be wrong in themselves (`if_cmp`, `math`, switches)
//! return `Result` directly.

use kiln_ir::opcode::Opcode;
use kiln_ir::{well_known, Access, Constant, MethodDef, MethodDesc, Signature, Type};

use crate::body::{Label, Local, MethodBody};
use crate::refs::{FieldRef, MethodRef};
use crate::{EmitError, TypeEmitter};

/// Which slot of its type a body occupies when it is ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BodyRole {
    Method,
    StaticInit,
    StaticHook,
}

/// Comparison modes for conditional branches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CmpMode {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CmpMode {
    /// The mode that holds exactly when `self` does not (ignoring NaN).
    pub fn negate(self) -> Self {
        match self {
            CmpMode::Eq => CmpMode::Ne,
            CmpMode::Ne => CmpMode::Eq,
            CmpMode::Lt => CmpMode::Ge,
            CmpMode::Ge => CmpMode::Lt,
            CmpMode::Gt => CmpMode::Le,
            CmpMode::Le => CmpMode::Gt,
        }
    }

    fn against_zero(self) -> Opcode {
        match self {
            CmpMode::Eq => Opcode::Ifeq,
            CmpMode::Ne => Opcode::Ifne,
            CmpMode::Lt => Opcode::Iflt,
            CmpMode::Ge => Opcode::Ifge,
            CmpMode::Gt => Opcode::Ifgt,
            CmpMode::Le => Opcode::Ifle,
        }
    }

    fn int_pair(self) -> Opcode {
        match self {
            CmpMode::Eq => Opcode::IfIcmpeq,
            CmpMode::Ne => Opcode::IfIcmpne,
            CmpMode::Lt => Opcode::IfIcmplt,
            CmpMode::Ge => Opcode::IfIcmpge,
            CmpMode::Gt => Opcode::IfIcmpgt,
            CmpMode::Le => Opcode::IfIcmple,
        }
    }
}

/// Arithmetic and bitwise operations for [`CodeEmitter::math`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl MathOp {
    fn name(self) -> &'static str {
        match self {
            MathOp::Add => "add",
            MathOp::Sub => "sub",
            MathOp::Mul => "mul",
            MathOp::Div => "div",
            MathOp::Rem => "rem",
            MathOp::Neg => "neg",
            MathOp::Shl => "shl",
            MathOp::Shr => "shr",
            MathOp::Ushr => "ushr",
            MathOp::And => "and",
            MathOp::Or => "or",
            MathOp::Xor => "xor",
        }
    }
}

/// A protected region for [`CodeEmitter::catch_exception`].
#[derive(Clone, Debug)]
pub struct Block {
    start: Label,
    end: Option<Label>,
}

impl Block {
    pub fn start(&self) -> Label {
        self.start
    }

    pub fn end(&self) -> Option<Label> {
        self.end
    }
}

/// Builder for a single method body.
pub struct CodeEmitter<'t> {
    owner: &'t mut TypeEmitter,
    body: MethodBody,
    role: BodyRole,
}

impl<'t> CodeEmitter<'t> {
    pub(crate) fn new(owner: &'t mut TypeEmitter, body: MethodBody, role: BodyRole) -> Self {
        owner.open_body = Some(body.sig.to_string());
        Self { owner, body, role }
    }

    pub fn signature(&self) -> &Signature {
        &self.body.sig
    }

    pub fn access(&self) -> Access {
        self.body.access
    }

    pub fn is_static(&self) -> bool {
        self.body.is_static()
    }

    /// Type being emitted.
    pub fn class_type(&self) -> &Type {
        self.owner.class_type()
    }

    pub fn super_type(&self) -> &Type {
        self.owner.super_type()
    }

    /// Whether this body is the merged static initializer or its hook.
    pub fn is_static_init(&self) -> bool {
        self.role != BodyRole::Method
    }

    /// Current stack depth in slots; `None` where code is unreachable.
    pub fn stack_depth(&self) -> Option<u16> {
        self.body.depth()
    }

    // ── Raw emission ────────────────────────────────────────────────

    fn insn(&mut self, op: Opcode, pops: u16, pushes: u16) -> u32 {
        self.body.stack(pops, pushes);
        let at = self.body.pos();
        self.body.bytes.push(op.byte());
        at
    }

    fn put_u16(&mut self, v: u16) {
        self.body.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.body.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn constant(&mut self, constant: Constant) -> u16 {
        match self.owner.add_constant(constant) {
            Ok(idx) => idx,
            Err(err) => {
                self.body.fail(err);
                0
            }
        }
    }

    fn class_constant(&mut self, ty: &Type) -> u16 {
        let name = ty.class_name().unwrap_or_else(|| ty.descriptor());
        self.constant(Constant::Class(name))
    }

    fn jump(&mut self, op: Opcode, pops: u16, label: Label) {
        self.body.stack(pops, 0);
        let at = self.body.pos();
        self.body.bytes.push(op.byte());
        self.body.branch_to(label);
        self.body.put_label_offset(at, label);
    }

    // ── Labels and locals ───────────────────────────────────────────

    pub fn make_label(&mut self) -> Label {
        self.body.new_label()
    }

    /// Bind `label` to the current position.
    pub fn mark(&mut self, label: Label) {
        self.body.bind(label);
    }

    /// Create a label bound to the current position.
    pub fn mark_new(&mut self) -> Label {
        let label = self.make_label();
        self.mark(label);
        label
    }

    pub fn make_local(&mut self, ty: Type) -> Local {
        self.body.alloc_local(ty)
    }

    fn load_slot(&mut self, ty: &Type, slot: u16) {
        let op = match ty {
            t if t.is_int_like() => Opcode::Iload,
            Type::Long => Opcode::Lload,
            Type::Float => Opcode::Fload,
            Type::Double => Opcode::Dload,
            _ => Opcode::Aload,
        };
        self.insn(op, 0, ty.size().max(1));
        self.put_u16(slot);
    }

    fn store_slot(&mut self, ty: &Type, slot: u16) {
        let op = match ty {
            t if t.is_int_like() => Opcode::Istore,
            Type::Long => Opcode::Lstore,
            Type::Float => Opcode::Fstore,
            Type::Double => Opcode::Dstore,
            _ => Opcode::Astore,
        };
        self.insn(op, ty.size().max(1), 0);
        self.put_u16(slot);
    }

    pub fn load_local(&mut self, local: &Local) {
        self.load_slot(local.ty(), local.index());
    }

    pub fn store_local(&mut self, local: &Local) {
        self.store_slot(local.ty(), local.index());
    }

    /// `local += delta` for an int local.
    pub fn iinc(&mut self, local: &Local, delta: i16) {
        self.insn(Opcode::Iinc, 0, 0);
        self.put_u16(local.index());
        self.body.bytes.extend_from_slice(&delta.to_be_bytes());
    }

    /// Push the receiver.
    pub fn load_this(&mut self) {
        if self.body.is_static() {
            let method = self.body.sig.to_string();
            self.body.fail(EmitError::NoReceiver { method });
        }
        self.insn(Opcode::Aload, 0, 1);
        self.put_u16(0);
    }

    /// Push parameter `index` (0-based, receiver excluded).
    pub fn load_arg(&mut self, index: usize) {
        let params = self.body.sig.desc().params();
        let count = params.len();
        match (self.body.arg_slot(index), params.get(index).cloned()) {
            (Some(slot), Some(ty)) => self.load_slot(&ty, slot),
            _ => self.body.fail(EmitError::ArgumentOutOfRange { index, count }),
        }
    }

    /// Push every parameter in order.
    pub fn load_args(&mut self) {
        for index in 0..self.body.sig.desc().params().len() {
            self.load_arg(index);
        }
    }

    // ── Constants ───────────────────────────────────────────────────

    fn ldc(&mut self, constant: Constant) {
        let wide = constant.is_wide();
        let idx = self.constant(constant);
        if wide {
            self.insn(Opcode::Ldc2, 0, 2);
        } else {
            self.insn(Opcode::Ldc, 0, 1);
        }
        self.put_u16(idx);
    }

    pub fn push_int(&mut self, value: i32) {
        let short = match value {
            -1 => Some(Opcode::IconstM1),
            0 => Some(Opcode::Iconst0),
            1 => Some(Opcode::Iconst1),
            2 => Some(Opcode::Iconst2),
            3 => Some(Opcode::Iconst3),
            4 => Some(Opcode::Iconst4),
            5 => Some(Opcode::Iconst5),
            _ => None,
        };
        if let Some(op) = short {
            self.insn(op, 0, 1);
        } else if let Ok(byte) = i8::try_from(value) {
            self.insn(Opcode::Bipush, 0, 1);
            self.body.bytes.extend_from_slice(&byte.to_be_bytes());
        } else if let Ok(half) = i16::try_from(value) {
            self.insn(Opcode::Sipush, 0, 1);
            self.body.bytes.extend_from_slice(&half.to_be_bytes());
        } else {
            self.ldc(Constant::Int(value));
        }
    }

    pub fn push_bool(&mut self, value: bool) {
        self.push_int(i32::from(value));
    }

    pub fn push_long(&mut self, value: i64) {
        match value {
            0 => {
                self.insn(Opcode::Lconst0, 0, 2);
            }
            1 => {
                self.insn(Opcode::Lconst1, 0, 2);
            }
            _ => self.ldc(Constant::Long(value)),
        }
    }

    /// Floats are matched by bit pattern, so `-0.0` goes through the pool.
    pub fn push_float(&mut self, value: f32) {
        let bits = value.to_bits();
        if bits == 0.0f32.to_bits() {
            self.insn(Opcode::Fconst0, 0, 1);
        } else if bits == 1.0f32.to_bits() {
            self.insn(Opcode::Fconst1, 0, 1);
        } else if bits == 2.0f32.to_bits() {
            self.insn(Opcode::Fconst2, 0, 1);
        } else {
            self.ldc(Constant::float(value));
        }
    }

    pub fn push_double(&mut self, value: f64) {
        let bits = value.to_bits();
        if bits == 0.0f64.to_bits() {
            self.insn(Opcode::Dconst0, 0, 2);
        } else if bits == 1.0f64.to_bits() {
            self.insn(Opcode::Dconst1, 0, 2);
        } else {
            self.ldc(Constant::double(value));
        }
    }

    pub fn push_string(&mut self, value: &str) {
        self.ldc(Constant::Str(value.to_owned()));
    }

    pub fn push_null(&mut self) {
        self.insn(Opcode::AconstNull, 0, 1);
    }

    // ── Stack manipulation ──────────────────────────────────────────

    pub fn pop(&mut self) {
        self.insn(Opcode::Pop, 1, 0);
    }

    pub fn pop2(&mut self) {
        self.insn(Opcode::Pop2, 2, 0);
    }

    /// Pop a value of `ty`, whatever its width.
    pub fn pop_value(&mut self, ty: &Type) {
        match ty.size() {
            0 => {}
            1 => self.pop(),
            _ => self.pop2(),
        }
    }

    pub fn dup(&mut self) {
        self.insn(Opcode::Dup, 1, 2);
    }

    pub fn dup_x1(&mut self) {
        self.insn(Opcode::DupX1, 2, 3);
    }

    pub fn dup_x2(&mut self) {
        self.insn(Opcode::DupX2, 3, 4);
    }

    pub fn dup2(&mut self) {
        self.insn(Opcode::Dup2, 2, 4);
    }

    pub fn dup2_x1(&mut self) {
        self.insn(Opcode::Dup2X1, 3, 5);
    }

    pub fn dup2_x2(&mut self) {
        self.insn(Opcode::Dup2X2, 4, 6);
    }

    pub fn swap(&mut self) {
        self.insn(Opcode::Swap, 2, 2);
    }

    // ── Arithmetic and conversion ───────────────────────────────────

    /// Apply `op` to operands of `ty`. Shifts take an `int` shift count on
    /// top of the value; bitwise operations exist only for `int` and `long`.
    pub fn math(&mut self, op: MathOp, ty: &Type) -> Result<(), EmitError> {
        #[derive(Copy, Clone)]
        enum Kind {
            I,
            L,
            F,
            D,
        }
        let invalid = || EmitError::InvalidMath {
            op: op.name(),
            ty: ty.clone(),
        };
        let kind = match ty {
            t if t.is_int_like() => Kind::I,
            Type::Long => Kind::L,
            Type::Float => Kind::F,
            Type::Double => Kind::D,
            _ => return Err(invalid()),
        };
        let pick = |i, l, f, d| match kind {
            Kind::I => Some(i),
            Kind::L => Some(l),
            Kind::F => f,
            Kind::D => d,
        };
        use Opcode as O;
        let opcode = match op {
            MathOp::Add => pick(O::Iadd, O::Ladd, Some(O::Fadd), Some(O::Dadd)),
            MathOp::Sub => pick(O::Isub, O::Lsub, Some(O::Fsub), Some(O::Dsub)),
            MathOp::Mul => pick(O::Imul, O::Lmul, Some(O::Fmul), Some(O::Dmul)),
            MathOp::Div => pick(O::Idiv, O::Ldiv, Some(O::Fdiv), Some(O::Ddiv)),
            MathOp::Rem => pick(O::Irem, O::Lrem, Some(O::Frem), Some(O::Drem)),
            MathOp::Neg => pick(O::Ineg, O::Lneg, Some(O::Fneg), Some(O::Dneg)),
            MathOp::Shl => pick(O::Ishl, O::Lshl, None, None),
            MathOp::Shr => pick(O::Ishr, O::Lshr, None, None),
            MathOp::Ushr => pick(O::Iushr, O::Lushr, None, None),
            MathOp::And => pick(O::Iand, O::Land, None, None),
            MathOp::Or => pick(O::Ior, O::Lor, None, None),
            MathOp::Xor => pick(O::Ixor, O::Lxor, None, None),
        }
        .ok_or_else(invalid)?;

        let size = ty.size();
        let pops = match op {
            MathOp::Neg => size,
            MathOp::Shl | MathOp::Shr | MathOp::Ushr => size + 1,
            _ => size * 2,
        };
        self.insn(opcode, pops, size);
        Ok(())
    }

    /// Convert the numeric value on top of the stack from `from` to `to`.
    /// Narrowing through `int` emits two conversions (`double` to `byte` is
    /// `D2I; I2B`).
    pub fn cast_numeric(&mut self, from: &Type, to: &Type) {
        if from == to {
            return;
        }
        let conv = |this: &mut Self, op: Opcode, from: &Type, to: &Type| {
            this.insn(op, from.size(), to.size());
        };
        match from {
            Type::Double => match to {
                Type::Float => conv(self, Opcode::D2f, from, to),
                Type::Long => conv(self, Opcode::D2l, from, to),
                _ => {
                    conv(self, Opcode::D2i, from, &Type::Int);
                    self.cast_numeric(&Type::Int, to);
                }
            },
            Type::Float => match to {
                Type::Double => conv(self, Opcode::F2d, from, to),
                Type::Long => conv(self, Opcode::F2l, from, to),
                _ => {
                    conv(self, Opcode::F2i, from, &Type::Int);
                    self.cast_numeric(&Type::Int, to);
                }
            },
            Type::Long => match to {
                Type::Double => conv(self, Opcode::L2d, from, to),
                Type::Float => conv(self, Opcode::L2f, from, to),
                _ => {
                    conv(self, Opcode::L2i, from, &Type::Int);
                    self.cast_numeric(&Type::Int, to);
                }
            },
            _ => match to {
                Type::Byte => conv(self, Opcode::I2b, from, to),
                Type::Char => conv(self, Opcode::I2c, from, to),
                Type::Short => conv(self, Opcode::I2s, from, to),
                Type::Double => conv(self, Opcode::I2d, from, to),
                Type::Float => conv(self, Opcode::I2f, from, to),
                Type::Long => conv(self, Opcode::I2l, from, to),
                _ => {}
            },
        }
    }

    // ── Branches ────────────────────────────────────────────────────

    /// Branch on the int on top of the stack compared against zero.
    pub fn if_jump(&mut self, mode: CmpMode, label: Label) {
        self.jump(mode.against_zero(), 1, label);
    }

    /// Branch on two ints.
    pub fn if_icmp(&mut self, mode: CmpMode, label: Label) {
        self.jump(mode.int_pair(), 2, label);
    }

    /// Branch when `a <mode> b` for the two values of `ty` on the stack.
    ///
    /// Long, float and double operands are reduced with `LCMP`/`FCMPx`/`DCMPx`
    /// and branched on against zero. The `x` variant is picked per mode so a
    /// NaN operand never satisfies an ordering: `LT`/`LE` use the `G` form
    /// (NaN yields 1), `GT`/`GE` use the `L` form (NaN yields -1).
    pub fn if_cmp(&mut self, ty: &Type, mode: CmpMode, label: Label) -> Result<(), EmitError> {
        let nan_low = matches!(mode, CmpMode::Gt | CmpMode::Ge);
        match ty {
            Type::Long => {
                self.insn(Opcode::Lcmp, 4, 1);
                self.if_jump(mode, label);
            }
            Type::Float => {
                let op = if nan_low { Opcode::Fcmpl } else { Opcode::Fcmpg };
                self.insn(op, 2, 1);
                self.if_jump(mode, label);
            }
            Type::Double => {
                let op = if nan_low { Opcode::Dcmpl } else { Opcode::Dcmpg };
                self.insn(op, 4, 1);
                self.if_jump(mode, label);
            }
            Type::Object(_) | Type::Array(_) => match mode {
                CmpMode::Eq => self.jump(Opcode::IfAcmpeq, 2, label),
                CmpMode::Ne => self.jump(Opcode::IfAcmpne, 2, label),
                _ => {
                    return Err(EmitError::ReferenceOrdering {
                        ty: ty.clone(),
                        mode,
                    })
                }
            },
            Type::Void => {
                return Err(EmitError::InvalidMath {
                    op: "compare",
                    ty: ty.clone(),
                })
            }
            _ => self.if_icmp(mode, label),
        }
        Ok(())
    }

    pub fn if_null(&mut self, label: Label) {
        self.jump(Opcode::Ifnull, 1, label);
    }

    pub fn if_nonnull(&mut self, label: Label) {
        self.jump(Opcode::Ifnonnull, 1, label);
    }

    pub fn goto(&mut self, label: Label) {
        self.jump(Opcode::Goto, 0, label);
        self.body.unreachable();
    }

    // ── Switch plumbing ─────────────────────────────────────────────

    pub(crate) fn emit_table_switch(&mut self, default: Label, low: i32, targets: &[Label]) {
        let base = self.insn(Opcode::Tableswitch, 1, 0);
        self.body.branch_to(default);
        self.body.put_label_offset(base, default);
        let high = i64::from(low) + targets.len() as i64 - 1;
        self.put_i32(low);
        self.put_i32(i32::try_from(high).unwrap_or(i32::MAX));
        for &target in targets {
            self.body.branch_to(target);
            self.body.put_label_offset(base, target);
        }
        self.body.unreachable();
    }

    pub(crate) fn emit_lookup_switch(&mut self, default: Label, pairs: &[(i32, Label)]) {
        let base = self.insn(Opcode::Lookupswitch, 1, 0);
        self.body.branch_to(default);
        self.body.put_label_offset(base, default);
        self.put_i32(i32::try_from(pairs.len()).unwrap_or(i32::MAX));
        for &(key, target) in pairs {
            self.put_i32(key);
            self.body.branch_to(target);
            self.body.put_label_offset(base, target);
        }
        self.body.unreachable();
    }

    // ── Arrays ──────────────────────────────────────────────────────

    /// Pop a length and push a new array of `elem`.
    pub fn new_array(&mut self, elem: &Type) {
        if let Some(code) = elem.array_type_code() {
            self.insn(Opcode::Newarray, 1, 1);
            self.body.bytes.push(code);
        } else {
            let idx = self.class_constant(elem);
            self.insn(Opcode::Anewarray, 1, 1);
            self.put_u16(idx);
        }
    }

    pub fn array_length(&mut self) {
        self.insn(Opcode::Arraylength, 1, 1);
    }

    /// `array[index]` for an array of `elem`.
    pub fn array_load(&mut self, elem: &Type) {
        let op = match elem {
            Type::Boolean | Type::Byte => Opcode::Baload,
            Type::Char => Opcode::Caload,
            Type::Short => Opcode::Saload,
            Type::Int => Opcode::Iaload,
            Type::Long => Opcode::Laload,
            Type::Float => Opcode::Faload,
            Type::Double => Opcode::Daload,
            _ => Opcode::Aaload,
        };
        self.insn(op, 2, elem.size().max(1));
    }

    /// `array[index] = value` for an array of `elem`.
    pub fn array_store(&mut self, elem: &Type) {
        let op = match elem {
            Type::Boolean | Type::Byte => Opcode::Bastore,
            Type::Char => Opcode::Castore,
            Type::Short => Opcode::Sastore,
            Type::Int => Opcode::Iastore,
            Type::Long => Opcode::Lastore,
            Type::Float => Opcode::Fastore,
            Type::Double => Opcode::Dastore,
            _ => Opcode::Aastore,
        };
        self.insn(op, 2 + elem.size().max(1), 0);
    }

    // ── Fields ──────────────────────────────────────────────────────

    fn field_constant(&mut self, field: &FieldRef) -> u16 {
        let owner = field
            .owner
            .class_name()
            .unwrap_or_else(|| field.owner.descriptor());
        self.constant(Constant::Field {
            owner,
            name: field.name.clone(),
            desc: field.ty.descriptor(),
        })
    }

    pub fn get_field(&mut self, field: &FieldRef) {
        let idx = self.field_constant(field);
        if field.is_static {
            self.insn(Opcode::Getstatic, 0, field.ty.size());
        } else {
            self.insn(Opcode::Getfield, 1, field.ty.size());
        }
        self.put_u16(idx);
    }

    pub fn put_field(&mut self, field: &FieldRef) {
        let idx = self.field_constant(field);
        if field.is_static {
            self.insn(Opcode::Putstatic, field.ty.size(), 0);
        } else {
            self.insn(Opcode::Putfield, 1 + field.ty.size(), 0);
        }
        self.put_u16(idx);
    }

    /// Read a field declared on the type being emitted. Instance fields
    /// expect the receiver on the stack.
    pub fn get_own_field(&mut self, name: &str) -> Result<(), EmitError> {
        let field = self.owner.field_ref(name)?;
        self.get_field(&field);
        Ok(())
    }

    /// Write a field declared on the type being emitted.
    pub fn put_own_field(&mut self, name: &str) -> Result<(), EmitError> {
        let field = self.owner.field_ref(name)?;
        self.put_field(&field);
        Ok(())
    }

    // ── Objects ─────────────────────────────────────────────────────

    pub fn new_instance(&mut self, ty: &Type) {
        let idx = self.class_constant(ty);
        self.insn(Opcode::New, 0, 1);
        self.put_u16(idx);
    }

    pub fn new_instance_this(&mut self) {
        let ty = self.owner.class_type().clone();
        self.new_instance(&ty);
    }

    /// Cast the reference on top of the stack. Casting to the root class is
    /// a no-op and emits nothing.
    pub fn checkcast(&mut self, ty: &Type) {
        if *ty == Type::object_root() {
            return;
        }
        let idx = self.class_constant(ty);
        self.insn(Opcode::Checkcast, 1, 1);
        self.put_u16(idx);
    }

    pub fn instance_of(&mut self, ty: &Type) {
        let idx = self.class_constant(ty);
        self.insn(Opcode::Instanceof, 1, 1);
        self.put_u16(idx);
    }

    pub fn athrow(&mut self) {
        self.insn(Opcode::Athrow, 1, 0);
        self.body.unreachable();
    }

    /// `throw new <ty>(message)`.
    pub fn throw_exception(&mut self, ty: &Type, message: &str) {
        self.new_instance(ty);
        self.dup();
        self.push_string(message);
        self.invoke_constructor(ty, &[Type::string()]);
        self.athrow();
    }

    // ── Invocation ──────────────────────────────────────────────────

    fn call(&mut self, op: Opcode, method: &MethodRef) {
        let owner = method
            .owner
            .class_name()
            .unwrap_or_else(|| method.owner.descriptor());
        let idx = self.constant(Constant::Method {
            owner,
            name: method.sig.name().to_owned(),
            desc: method.sig.desc().descriptor(),
            interface: method.owner_is_interface,
        });
        let pushes = method.sig.desc().ret().size();
        self.insn(op, method.pops(), pushes);
        self.put_u16(idx);
    }

    /// Invoke `method`, choosing the form from the reference: constructors
    /// are special calls, interface owners get interface calls, static
    /// methods static calls, everything else a virtual call.
    pub fn invoke(&mut self, method: &MethodRef) {
        let op = if method.sig.is_constructor() {
            Opcode::Invokespecial
        } else if method.owner_is_interface {
            Opcode::Invokeinterface
        } else if method.access.is_static() {
            Opcode::Invokestatic
        } else {
            Opcode::Invokevirtual
        };
        self.call(op, method);
    }

    pub fn invoke_virtual(&mut self, owner: &Type, sig: &Signature) {
        self.invoke(&MethodRef::virtual_method(owner.clone(), sig.clone()));
    }

    pub fn invoke_interface(&mut self, owner: &Type, sig: &Signature) {
        self.invoke(&MethodRef::interface_method(owner.clone(), sig.clone()));
    }

    pub fn invoke_static(&mut self, owner: &Type, sig: &Signature) {
        self.invoke(&MethodRef::static_method(owner.clone(), sig.clone()));
    }

    pub fn invoke_virtual_this(&mut self, sig: &Signature) {
        let owner = self.owner.class_type().clone();
        self.invoke_virtual(&owner, sig);
    }

    pub fn invoke_static_this(&mut self, sig: &Signature) {
        let owner = self.owner.class_type().clone();
        self.invoke_static(&owner, sig);
    }

    /// Call a constructor of `owner` on the reference below the arguments.
    pub fn invoke_constructor(&mut self, owner: &Type, params: &[Type]) {
        self.invoke(&MethodRef::constructor(owner.clone(), params.iter().cloned()));
    }

    pub fn invoke_constructor_this(&mut self, params: &[Type]) {
        let owner = self.owner.class_type().clone();
        self.invoke_constructor(&owner, params);
    }

    /// Call the no-argument constructor of the supertype.
    pub fn super_invoke_constructor(&mut self) {
        self.super_invoke_constructor_with(&[]);
    }

    pub fn super_invoke_constructor_with(&mut self, params: &[Type]) {
        let owner = self.owner.super_type().clone();
        self.invoke_constructor(&owner, params);
    }

    /// Non-virtual call of the supertype's implementation of `sig`.
    pub fn super_invoke(&mut self, sig: &Signature) {
        let owner = self.owner.super_type().clone();
        self.call(Opcode::Invokespecial, &MethodRef::virtual_method(owner, sig.clone()));
    }

    /// Return the value on the stack according to the method's return type.
    pub fn return_value(&mut self) {
        let ret = self.body.sig.desc().ret().clone();
        let op = match &ret {
            Type::Void => Opcode::Return,
            t if t.is_int_like() => Opcode::Ireturn,
            Type::Long => Opcode::Lreturn,
            Type::Float => Opcode::Freturn,
            Type::Double => Opcode::Dreturn,
            _ => Opcode::Areturn,
        };
        self.insn(op, ret.size(), 0);
        self.body.unreachable();
    }

    // ── Boxing ──────────────────────────────────────────────────────

    /// Replace a primitive on the stack by its box. `void` pushes null;
    /// references are left alone.
    pub fn box_value(&mut self, ty: &Type) {
        if !ty.is_primitive() {
            return;
        }
        let Some(boxed) = ty.boxed_class() else {
            self.push_null();
            return;
        };
        let boxed = Type::object(boxed);
        self.new_instance(&boxed);
        if ty.is_wide() {
            // Pp o -> o Pp o -> o o Pp o -> o o Pp
            self.dup_x2();
            self.dup_x2();
            self.pop();
        } else {
            // p o -> o p o -> o o p
            self.dup_x1();
            self.swap();
        }
        self.invoke_constructor(&boxed, std::slice::from_ref(ty));
    }

    /// Replace a box on the stack by its primitive value. Integral types
    /// narrower than `int` unbox through `Number.intValue`. References are
    /// cast to `ty`.
    pub fn unbox(&mut self, ty: &Type) {
        let (owner, name, ret) = match ty {
            Type::Void => return,
            Type::Char => (well_known::CHARACTER, "charValue", Type::Char),
            Type::Boolean => (well_known::BOOLEAN, "booleanValue", Type::Boolean),
            Type::Double => (well_known::NUMBER, "doubleValue", Type::Double),
            Type::Float => (well_known::NUMBER, "floatValue", Type::Float),
            Type::Long => (well_known::NUMBER, "longValue", Type::Long),
            Type::Int | Type::Short | Type::Byte => (well_known::NUMBER, "intValue", Type::Int),
            Type::Object(_) | Type::Array(_) => {
                self.checkcast(ty);
                return;
            }
        };
        let owner = Type::object(owner);
        self.checkcast(&owner);
        self.invoke_virtual(&owner, &Signature::new(name, MethodDesc::new([], ret)));
    }

    /// Like [`unbox`](Self::unbox), but a null reference becomes zero
    /// (or `false`).
    pub fn unbox_or_zero(&mut self, ty: &Type) {
        if !ty.is_primitive() {
            self.checkcast(ty);
            return;
        }
        if *ty == Type::Void {
            return;
        }
        let non_null = self.make_label();
        let end = self.make_label();
        self.dup();
        self.if_nonnull(non_null);
        self.pop();
        self.zero_or_null(ty);
        self.goto(end);
        self.mark(non_null);
        self.unbox(ty);
        self.mark(end);
    }

    /// Push the default value of `ty`.
    pub fn zero_or_null(&mut self, ty: &Type) {
        match ty {
            Type::Double => self.push_double(0.0),
            Type::Long => self.push_long(0),
            Type::Float => self.push_float(0.0),
            Type::Void | Type::Object(_) | Type::Array(_) => self.push_null(),
            _ => self.push_int(0),
        }
    }

    // ── Exceptions ──────────────────────────────────────────────────

    /// Start a protected region at the current position.
    pub fn begin_block(&mut self) -> Block {
        let start = self.mark_new();
        Block { start, end: None }
    }

    /// End a protected region at the current position.
    pub fn end_block(&mut self, block: &mut Block) {
        let end = self.mark_new();
        block.end = Some(end);
    }

    /// Start a handler for `block` at the current position. The caught value
    /// is on the stack; `None` catches every throwable.
    pub fn catch_exception(
        &mut self,
        block: &Block,
        exception: Option<&Type>,
    ) -> Result<(), EmitError> {
        let end = block.end.ok_or(EmitError::BlockNotEnded)?;
        let handler = self.make_label();
        self.body.bind_handler(handler);
        let catch_type = exception.and_then(Type::class_name);
        self.body.add_handler(block.start, end, handler, catch_type);
        Ok(())
    }

    // ── Finishing ───────────────────────────────────────────────────

    /// Close the body. A regular method is frozen and added to its type;
    /// the static initializer and hook are parked on the type to be resumed
    /// or closed by `end_type`.
    pub fn end_method(self) -> Result<(), EmitError> {
        let CodeEmitter { owner, body, role } = self;
        owner.open_body = None;
        match role {
            BodyRole::Method => {
                let access = body.access;
                let name = body.sig.name().to_owned();
                let desc = body.sig.desc().descriptor();
                let exceptions = body.exceptions.clone();
                tracing::trace!(method = %body.sig, "finished method body");
                let code = body.finish()?;
                owner.methods.push(MethodDef {
                    access,
                    name,
                    desc,
                    exceptions,
                    code: Some(code),
                });
            }
            BodyRole::StaticInit => owner.static_init = Some(body),
            BodyRole::StaticHook => owner.static_hook = Some(body),
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
