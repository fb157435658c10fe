//! The type emitter: one whole unit definition.

use rustc_hash::FxHashMap;

use kiln_ir::{
    Access, Constant, ConstantPool, FieldDef, MethodDef, MethodDesc, Signature, Type, UnitDef,
};

use crate::body::MethodBody;
use crate::code::BodyRole;
use crate::refs::FieldRef;
use crate::{CodeEmitter, EmitError};

/// Name of the static hook. Each class calls its own hook through its own
/// name, so a supertype's hook is never reached from a subclass.
const STATIC_HOOK: &str = "kiln$static_hook";

/// Builder for a unit definition.
///
/// Static initialization is merged: every [`begin_static`] resumes the same
/// `<clinit>` body, and [`static_hook`] resumes a private static method that
/// the initializer calls exactly once. The call sits where the hook was first
/// requested (or at the start of the initializer when the hook came first),
/// so code added to the hook later still runs at that point.
///
/// [`begin_static`]: TypeEmitter::begin_static
/// [`static_hook`]: TypeEmitter::static_hook
#[derive(Debug)]
pub struct TypeEmitter {
    access: Access,
    name: String,
    class_type: Type,
    super_type: Type,
    interfaces: Vec<Type>,
    source: Option<String>,
    pool: ConstantPool,
    fields: Vec<FieldDef>,
    field_index: FxHashMap<String, usize>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) static_init: Option<MethodBody>,
    pub(crate) static_hook: Option<MethodBody>,
    hook_sig: Option<Signature>,
    /// Signature of the body currently being emitted, if any.
    pub(crate) open_body: Option<String>,
}

impl TypeEmitter {
    /// Open a type definition. `super_type` defaults to the root class.
    pub fn begin_type(
        access: Access,
        name: &str,
        super_type: Option<Type>,
        interfaces: Vec<Type>,
        source: Option<&str>,
    ) -> Self {
        tracing::debug!(name, "begin type");
        Self {
            access,
            name: name.to_owned(),
            class_type: Type::object(name),
            super_type: super_type.unwrap_or_else(Type::object_root),
            interfaces,
            source: source.map(str::to_owned),
            pool: ConstantPool::new(),
            fields: Vec::new(),
            field_index: FxHashMap::default(),
            methods: Vec::new(),
            static_init: None,
            static_hook: None,
            hook_sig: None,
            open_body: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_type(&self) -> &Type {
        &self.class_type
    }

    pub fn super_type(&self) -> &Type {
        &self.super_type
    }

    pub fn interfaces(&self) -> &[Type] {
        &self.interfaces
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    // ── Fields ──────────────────────────────────────────────────────

    /// Declare a field. Declaring the same field again with identical
    /// access, type and constant is a no-op.
    pub fn declare_field(
        &mut self,
        access: Access,
        name: &str,
        ty: Type,
        constant: Option<Constant>,
    ) -> Result<(), EmitError> {
        let constant = constant.map(|c| self.add_constant(c)).transpose()?;
        let def = FieldDef {
            access,
            name: name.to_owned(),
            ty,
            constant,
        };
        if let Some(&existing) = self.field_index.get(name) {
            return if self.fields[existing] == def {
                Ok(())
            } else {
                Err(EmitError::FieldDeclaredDifferently {
                    name: name.to_owned(),
                })
            };
        }
        self.field_index.insert(name.to_owned(), self.fields.len());
        self.fields.push(def);
        Ok(())
    }

    /// Intern `constant` in the unit's pool.
    pub(crate) fn add_constant(&mut self, constant: Constant) -> Result<u16, EmitError> {
        self.pool
            .add(constant)
            .map_err(|_| EmitError::TooManyConstants {
                unit: self.name.clone(),
            })
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.field_index.get(name).map(|&i| &self.fields[i])
    }

    pub(crate) fn field_ref(&self, name: &str) -> Result<FieldRef, EmitError> {
        let field = self.field(name).ok_or_else(|| EmitError::UnknownField {
            owner: self.name.clone(),
            name: name.to_owned(),
        })?;
        Ok(FieldRef {
            owner: self.class_type.clone(),
            name: field.name.clone(),
            ty: field.ty.clone(),
            is_static: field.access.is_static(),
        })
    }

    // ── Methods ─────────────────────────────────────────────────────

    /// Declare a method without code (abstract or interface method).
    pub fn declare_method(&mut self, access: Access, sig: &Signature, exceptions: &[Type]) {
        self.methods.push(MethodDef {
            access: access | Access::ABSTRACT,
            name: sig.name().to_owned(),
            desc: sig.desc().descriptor(),
            exceptions: exceptions.iter().filter_map(Type::class_name).collect(),
            code: None,
        });
    }

    /// Start a method body. The static initializer signature resumes the
    /// merged initializer.
    pub fn begin_method(
        &mut self,
        access: Access,
        sig: &Signature,
        exceptions: &[Type],
    ) -> CodeEmitter<'_> {
        if sig.is_static_init() {
            return self.begin_static();
        }
        let exceptions = exceptions.iter().filter_map(Type::class_name).collect();
        let body = MethodBody::new(access, sig.clone(), exceptions);
        CodeEmitter::new(self, body, BodyRole::Method)
    }

    /// Resume the merged static initializer.
    ///
    /// On interfaces there is no hook and no merging; the returned body is an
    /// ordinary `<clinit>`.
    pub fn begin_static(&mut self) -> CodeEmitter<'_> {
        if self.is_interface() {
            let body = MethodBody::new(Access::STATIC, Signature::static_init(), Vec::new());
            return CodeEmitter::new(self, body, BodyRole::Method);
        }
        if let Some(body) = self.static_init.take() {
            return CodeEmitter::new(self, body, BodyRole::StaticInit);
        }
        let hook = self.hook_sig.clone();
        let body = MethodBody::new(Access::STATIC, Signature::static_init(), Vec::new());
        let mut init = CodeEmitter::new(self, body, BodyRole::StaticInit);
        if let Some(hook) = hook {
            init.invoke_static_this(&hook);
        }
        init
    }

    /// Resume the static hook, creating it on first use.
    pub fn static_hook(&mut self) -> Result<CodeEmitter<'_>, EmitError> {
        if self.is_interface() {
            return Err(EmitError::StaticHookOnInterface {
                name: self.name.clone(),
            });
        }
        let hook = self.hook_signature()?;
        let body = self
            .static_hook
            .take()
            .unwrap_or_else(|| MethodBody::new(Access::STATIC | Access::PRIVATE, hook, Vec::new()));
        Ok(CodeEmitter::new(self, body, BodyRole::StaticHook))
    }

    /// Name of the hook, allocating it (and wiring it into an existing
    /// initializer) the first time.
    fn hook_signature(&mut self) -> Result<Signature, EmitError> {
        if let Some(sig) = &self.hook_sig {
            return Ok(sig.clone());
        }
        let sig = Signature::new(STATIC_HOOK, MethodDesc::void());
        self.hook_sig = Some(sig.clone());
        if let Some(body) = self.static_init.take() {
            let mut init = CodeEmitter::new(self, body, BodyRole::StaticInit);
            init.invoke_static_this(&sig);
            init.end_method()?;
        }
        Ok(sig)
    }

    /// Close the definition.
    pub fn end_type(mut self) -> Result<UnitDef, EmitError> {
        if let Some(method) = self.open_body.take() {
            return Err(EmitError::MethodNotEnded { method });
        }
        if self.static_hook.is_some() && self.static_init.is_none() {
            self.begin_static().end_method()?;
        }
        if let Some(hook) = self.static_hook.take() {
            let mut e = CodeEmitter::new(&mut self, hook, BodyRole::Method);
            e.return_value();
            e.end_method()?;
        }
        if let Some(init) = self.static_init.take() {
            let mut e = CodeEmitter::new(&mut self, init, BodyRole::Method);
            e.return_value();
            e.end_method()?;
        }
        tracing::debug!(
            name = %self.name,
            fields = self.fields.len(),
            methods = self.methods.len(),
            "end type"
        );
        Ok(UnitDef {
            access: self.access,
            name: self.name,
            super_name: self.super_type.class_name(),
            interfaces: self.interfaces.iter().filter_map(Type::class_name).collect(),
            source: self.source,
            pool: self.pool,
            fields: self.fields,
            methods: self.methods,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
