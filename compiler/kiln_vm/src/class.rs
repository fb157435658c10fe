//! Loaded classes and their linked members.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use kiln_ir::insn::{decode, Insn, Operand};
use kiln_ir::{well_known, Access, Code, Constant, ConstantPool, Signature, Type, UnitDef};

use crate::scope::{ModuleScope, WeakScope};
use crate::value::{ObjRef, Object, ObjectKind, Value};
use crate::{DefineError, VmError};

/// Host implementation of a method. Receives the receiver (for instance
/// methods) followed by the arguments.
pub type NativeFn = fn(&[Value]) -> Result<Option<Value>, VmError>;

// ── Methods ─────────────────────────────────────────────────────────

/// A protected range with its handler, resolved to instruction indices.
#[derive(Clone, Debug)]
pub(crate) struct LinkedHandler {
    pub(crate) start: u32,
    pub(crate) end: u32,
    pub(crate) handler: usize,
    pub(crate) catch_type: Option<String>,
}

/// A decoded method body ready for interpretation.
#[derive(Debug)]
pub(crate) struct LinkedCode {
    pub(crate) insns: Vec<Insn>,
    index: FxHashMap<u32, usize>,
    pub(crate) max_locals: u16,
    pub(crate) handlers: Vec<LinkedHandler>,
}

impl LinkedCode {
    /// Instruction index of a branch target.
    pub(crate) fn index_of(&self, offset: u32) -> Option<usize> {
        self.index.get(&offset).copied()
    }

    fn link(code: Code, pool: &ConstantPool) -> Result<Self, String> {
        let insns = decode(&code.bytes).map_err(|e| e.to_string())?;
        let index: FxHashMap<u32, usize> = insns
            .iter()
            .enumerate()
            .map(|(i, insn)| (insn.offset, i))
            .collect();
        for insn in &insns {
            if let Operand::Pool(idx) = insn.operand {
                if pool.get(idx).is_none() {
                    return Err(format!("bad pool index #{idx} at {}", insn.offset));
                }
            }
        }
        let len = u32::try_from(code.bytes.len()).map_err(|_| "code too large".to_owned())?;
        let boundary = |off: u32| off == len || index.contains_key(&off);
        let mut handlers = Vec::with_capacity(code.handlers.len());
        for h in code.handlers {
            let handler = index
                .get(&h.handler)
                .copied()
                .filter(|_| boundary(h.start) && boundary(h.end) && h.start < h.end)
                .ok_or_else(|| {
                    format!("bad handler range [{}, {}) -> {}", h.start, h.end, h.handler)
                })?;
            handlers.push(LinkedHandler {
                start: h.start,
                end: h.end,
                handler,
                catch_type: h.catch_type,
            });
        }
        Ok(Self {
            insns,
            index,
            max_locals: code.max_locals,
            handlers,
        })
    }
}

#[derive(Debug)]
pub(crate) enum MethodImpl {
    Code(LinkedCode),
    Native(NativeFn),
    Abstract,
}

/// A declared method.
#[derive(Debug)]
pub struct Method {
    access: Access,
    sig: Signature,
    pub(crate) body: MethodImpl,
}

impl Method {
    pub(crate) fn native(access: Access, sig: Signature, f: NativeFn) -> Self {
        Self {
            access,
            sig,
            body: MethodImpl::Native(f),
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn sig(&self) -> &Signature {
        &self.sig
    }

    pub fn name(&self) -> &str {
        self.sig.name()
    }

    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.body, MethodImpl::Abstract)
    }
}

/// A declared field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub access: Access,
    pub name: String,
    pub ty: Type,
}

// ── Classes ─────────────────────────────────────────────────────────

/// Everything needed to assemble a [`Class`].
pub(crate) struct ClassParts {
    pub(crate) name: String,
    pub(crate) access: Access,
    pub(crate) super_class: Option<Arc<Class>>,
    pub(crate) interfaces: Vec<Arc<Class>>,
    pub(crate) source: Option<String>,
    pub(crate) pool: ConstantPool,
    pub(crate) fields: Vec<FieldInfo>,
    /// Initial values of static fields, by name.
    pub(crate) static_values: Vec<(String, Value)>,
    pub(crate) methods: Vec<Method>,
}

/// A class defined in a module scope.
///
/// A class refers to its scope weakly; the scope owns its classes. Instances
/// keep their class (and through it, the supertype chain) alive.
pub struct Class {
    name: String,
    access: Access,
    scope: WeakScope,
    super_class: Option<Arc<Class>>,
    interfaces: Vec<Arc<Class>>,
    source: Option<String>,
    pub(crate) pool: ConstantPool,
    fields: Vec<FieldInfo>,
    /// Field types of the full instance layout, supertype fields first.
    layout: Vec<Type>,
    instance_index: FxHashMap<String, usize>,
    statics: Mutex<Vec<Value>>,
    static_index: FxHashMap<String, usize>,
    methods: Vec<Method>,
    method_index: FxHashMap<(String, String), usize>,
}

impl Class {
    pub(crate) fn assemble(parts: ClassParts, scope: WeakScope) -> Self {
        let (mut layout, mut instance_index) = match &parts.super_class {
            Some(sup) => (sup.layout.clone(), sup.instance_index.clone()),
            None => (Vec::new(), FxHashMap::default()),
        };
        let mut statics = Vec::new();
        let mut static_index = FxHashMap::default();
        for field in &parts.fields {
            if field.access.is_static() {
                static_index.insert(field.name.clone(), statics.len());
                statics.push(Value::zero(&field.ty));
            } else {
                instance_index.insert(field.name.clone(), layout.len());
                layout.push(field.ty.clone());
            }
        }
        for (name, value) in parts.static_values {
            if let Some(&slot) = static_index.get(&name) {
                statics[slot] = value;
            }
        }
        let method_index = parts
            .methods
            .iter()
            .enumerate()
            .map(|(i, m)| ((m.name().to_owned(), m.sig.desc().descriptor()), i))
            .collect();

        Class {
            name: parts.name,
            access: parts.access,
            scope,
            super_class: parts.super_class,
            interfaces: parts.interfaces,
            source: parts.source,
            pool: parts.pool,
            fields: parts.fields,
            layout,
            instance_index,
            statics: Mutex::new(statics),
            static_index,
            methods: parts.methods,
            method_index,
        }
    }

    /// Link a decoded unit against its resolved supertype and interfaces.
    pub(crate) fn link(
        unit: UnitDef,
        scope: WeakScope,
        super_class: Option<Arc<Class>>,
        interfaces: Vec<Arc<Class>>,
    ) -> Result<Self, DefineError> {
        let link_err = |message: String| DefineError::Link {
            name: unit.name.clone(),
            message,
        };

        let mut fields = Vec::with_capacity(unit.fields.len());
        let mut static_values = Vec::new();
        for field in &unit.fields {
            if let Some(idx) = field.constant {
                let value = match unit.pool.get(idx) {
                    Some(Constant::Int(v)) => Value::Int(*v),
                    Some(Constant::Long(v)) => Value::Long(*v),
                    Some(Constant::Float(bits)) => Value::Float(f32::from_bits(*bits)),
                    Some(Constant::Double(bits)) => Value::Double(f64::from_bits(*bits)),
                    Some(Constant::Str(s)) => Value::object(crate::core::new_string(s)),
                    other => {
                        return Err(link_err(format!(
                            "field {} has unusable constant {other:?}",
                            field.name
                        )))
                    }
                };
                static_values.push((field.name.clone(), value));
            }
            fields.push(FieldInfo {
                access: field.access,
                name: field.name.clone(),
                ty: field.ty.clone(),
            });
        }

        let mut methods = Vec::with_capacity(unit.methods.len());
        for method in &unit.methods {
            let sig = Signature::parse(&method.name, &method.desc)?;
            let body = match &method.code {
                Some(code) => MethodImpl::Code(
                    LinkedCode::link(code.clone(), &unit.pool)
                        .map_err(|m| link_err(format!("{sig}: {m}")))?,
                ),
                None => MethodImpl::Abstract,
            };
            methods.push(Method {
                access: method.access,
                sig,
                body,
            });
        }

        let parts = ClassParts {
            name: unit.name.clone(),
            access: unit.access,
            super_class,
            interfaces,
            source: unit.source.clone(),
            pool: unit.pool,
            fields,
            static_values,
            methods,
        };
        Ok(Class::assemble(parts, scope))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<Class>] {
        &self.interfaces
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract() || self.access.is_interface()
    }

    /// The defining scope, if it is still alive.
    pub fn scope(&self) -> Option<ModuleScope> {
        self.scope.upgrade()
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Declared methods, in declaration order.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Declared and inherited public instance methods, subclass first.
    pub fn all_methods(self: &Arc<Self>) -> Vec<(Arc<Class>, &Method)> {
        let mut out: Vec<(Arc<Class>, &Method)> = Vec::new();
        let mut seen: Vec<(String, String)> = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            for method in &class.methods {
                let key = (method.name().to_owned(), method.sig.desc().descriptor());
                if !seen.contains(&key) {
                    seen.push(key);
                    out.push((Arc::clone(class), method));
                }
            }
            current = class.super_class.as_ref();
        }
        out
    }

    /// Whether this class is `name` or has it as a supertype or interface.
    pub fn is_subclass_of(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        if self.interfaces.iter().any(|i| i.is_subclass_of(name)) {
            return true;
        }
        self.super_class
            .as_ref()
            .is_some_and(|sup| sup.is_subclass_of(name))
    }

    /// Layout slot of an instance field, searching inherited fields too.
    pub fn instance_slot(&self, name: &str) -> Option<usize> {
        self.instance_index.get(name).copied()
    }

    /// Find a method by name and descriptor on this class or a supertype,
    /// returning the declaring class and the method index.
    pub fn find_method(self: &Arc<Self>, name: &str, desc: &str) -> Option<(Arc<Class>, usize)> {
        let key = (name.to_owned(), desc.to_owned());
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(&idx) = class.method_index.get(&key) {
                return Some((Arc::clone(class), idx));
            }
            current = class.super_class.as_ref();
        }
        None
    }

    pub(crate) fn method_at(&self, idx: usize) -> &Method {
        &self.methods[idx]
    }

    /// Find the class declaring static field `name`, with its slot.
    pub(crate) fn find_static(self: &Arc<Self>, name: &str) -> Option<(Arc<Class>, usize)> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(&slot) = class.static_index.get(name) {
                return Some((Arc::clone(class), slot));
            }
            current = class.super_class.as_ref();
        }
        None
    }

    pub(crate) fn static_at(&self, slot: usize) -> Value {
        self.statics.lock().get(slot).cloned().unwrap_or_default()
    }

    pub(crate) fn set_static_at(&self, slot: usize, value: Value) {
        if let Some(s) = self.statics.lock().get_mut(slot) {
            *s = value;
        }
    }

    /// Read a static field by name.
    pub fn get_static(self: &Arc<Self>, name: &str) -> Option<Value> {
        let (class, slot) = self.find_static(name)?;
        Some(class.static_at(slot))
    }

    /// Resolve a class name as seen from this class's scope.
    pub fn resolve_class(&self, name: &str) -> Result<Arc<Class>, VmError> {
        let scope = self.scope.upgrade().ok_or(VmError::ScopeDropped)?;
        scope
            .load_class(name)
            .ok_or_else(|| VmError::link(format!("class {name} not found from {}", self.name)))
    }

    /// Allocate an instance without running a constructor.
    pub fn allocate(self: &Arc<Self>) -> Result<ObjRef, VmError> {
        if self.is_abstract() {
            return Err(VmError::link(format!("cannot instantiate abstract {}", self.name)));
        }
        let fields = self.layout.iter().map(Value::zero).collect();
        Ok(Object::new(
            Arc::clone(self),
            ObjectKind::Plain(Mutex::new(fields)),
        ))
    }

    /// Allocate an instance and run its no-argument constructor.
    pub fn new_instance(self: &Arc<Self>) -> Result<ObjRef, VmError> {
        self.new_instance_with("()V", Vec::new())
    }

    /// Allocate an instance and run the constructor with descriptor `desc`.
    pub fn new_instance_with(
        self: &Arc<Self>,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<ObjRef, VmError> {
        let obj = self.allocate()?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::object(Arc::clone(&obj)));
        full.extend(args);
        let (owner, idx) = self
            .find_method(well_known::CONSTRUCTOR, desc)
            .ok_or_else(|| VmError::link(format!("no constructor {desc} on {}", self.name)))?;
        crate::interp::invoke(&owner, idx, full)?;
        Ok(obj)
    }

    /// Call a static method.
    pub fn invoke_static(
        self: &Arc<Self>,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, VmError> {
        let (owner, idx) = self
            .find_method(name, desc)
            .filter(|(owner, idx)| owner.method_at(*idx).is_static())
            .ok_or_else(|| VmError::link(format!("no static {name}{desc} on {}", self.name)))?;
        crate::interp::invoke(&owner, idx, args)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("scope", &self.scope.id())
            .finish_non_exhaustive()
    }
}

/// Call an instance method on `receiver`, dispatching on its runtime class.
pub fn invoke_virtual(
    receiver: &ObjRef,
    name: &str,
    desc: &str,
    args: Vec<Value>,
) -> Result<Option<Value>, VmError> {
    let (owner, idx) = receiver
        .class()
        .find_method(name, desc)
        .ok_or_else(|| crate::core::throw(well_known::NO_SUCH_MEMBER, &format!("{name}{desc}")))?;
    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(Value::object(Arc::clone(receiver)));
    full.extend(args);
    crate::interp::invoke(&owner, idx, full)
}

/// Whether `obj` is an instance of the class or array type named `target`.
pub fn is_instance_of(obj: &Object, target: &str) -> bool {
    match obj.kind() {
        ObjectKind::Array { elem, .. } => {
            if target == well_known::OBJECT {
                return true;
            }
            match Type::parse(target) {
                Ok(Type::Array(target_elem)) => array_assignable(elem, &target_elem),
                _ => false,
            }
        }
        _ => obj.class().is_subclass_of(target),
    }
}

fn array_assignable(elem: &Type, target: &Type) -> bool {
    match (elem, target) {
        (a, b) if a == b => true,
        (Type::Object(_) | Type::Array(_), Type::Object(b)) => &**b == well_known::OBJECT,
        (Type::Array(a), Type::Array(b)) => array_assignable(a, b),
        _ => false,
    }
}
