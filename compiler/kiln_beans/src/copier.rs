//! Copy adapters between bean classes.
//!
//! A copier moves every property that is readable on the source class and
//! writable on the target class under the same name. Without a converter
//! the types must be compatible; with one, every value goes through
//! [`convert`](crate::converter::convert_signature) and is unboxed to the
//! setter's type.
//!
//! A failure while copying the n-th property surfaces as a
//! `core/IndexedMemberException` with index n and the original throwable as
//! its cause.

use std::sync::{Arc, OnceLock};

use kiln_emit::emit_utils::null_constructor;
use kiln_emit::{CodeEmitter, EmitError, TypeEmitter};
use kiln_gen::key::{Key, KeyFactory, KeyKind, KeyShape, KeyValue};
use kiln_gen::{DynSpec, GenError, Generator, GeneratorBase};
use kiln_ir::{well_known, Access, MethodDesc, Signature, Type, UnitDef};
use kiln_vm::{invoke_virtual, Class, ModuleScope, ObjRef, Value};

use crate::converter::{convert_signature, converter_interface, CONVERTER};
use crate::introspect::{properties, PropertyDescriptor};
use crate::BeanError;

const COPY_DESC: &str = "(Lcore/Object;Lcore/Object;Lkiln/beans/Converter;)V";

fn copy_signature() -> Signature {
    Signature::new(
        "copy",
        MethodDesc::new(
            [Type::object_root(), Type::object_root(), Type::object(CONVERTER)],
            Type::Void,
        ),
    )
}

fn key_factory() -> &'static KeyFactory {
    static FACTORY: OnceLock<Arc<KeyFactory>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        KeyFactory::for_shape(&KeyShape::new([
            KeyKind::TypeName,
            KeyKind::TypeName,
            KeyKind::Bool,
        ]))
    })
}

/// One copied property: read from the source, written to the target.
struct Member {
    name: String,
    getter: Signature,
    source_ty: Type,
    setter: Signature,
    target_ty: Type,
}

/// Whether a value of `from` can be passed where `to` is expected.
fn compatible(source: &Class, from: &Type, to: &Type) -> bool {
    if from == to || (*to == Type::object_root() && from.is_reference()) {
        return true;
    }
    match (from, to) {
        (Type::Object(from), Type::Object(to)) => source
            .resolve_class(from)
            .is_ok_and(|class| class.is_subclass_of(to)),
        _ => false,
    }
}

fn members(source: &Arc<Class>, target: &Arc<Class>, use_converter: bool) -> Vec<Member> {
    let readable: Vec<PropertyDescriptor> = properties(source)
        .into_iter()
        .filter(PropertyDescriptor::is_readable)
        .collect();
    properties(target)
        .into_iter()
        .filter_map(|write| {
            let read = readable.iter().find(|r| r.name == write.name)?;
            if !use_converter && !compatible(source, &read.ty, &write.ty) {
                return None;
            }
            Some(Member {
                name: write.name.clone(),
                getter: read.getter()?,
                source_ty: read.ty.clone(),
                setter: write.setter()?,
                target_ty: write.ty,
            })
        })
        .collect()
}

struct CopierGenerator {
    source: Arc<Class>,
    target: Arc<Class>,
    use_converter: bool,
    key: Key,
}

impl CopierGenerator {
    fn emit_member(
        &self,
        e: &mut CodeEmitter<'_>,
        index: usize,
        member: &Member,
        locals: &CopyLocals,
    ) -> Result<(), EmitError> {
        let source_ty = Type::object(self.source.name());
        let target_ty = Type::object(self.target.name());
        let indexed = Type::object(well_known::INDEXED_MEMBER);

        let mut block = e.begin_block();
        e.load_local(&locals.to);
        if self.use_converter {
            e.load_arg(2);
            e.load_local(&locals.from);
            e.invoke_virtual(&source_ty, &member.getter);
            e.box_value(&member.source_ty);
            e.push_string(&member.target_ty.descriptor());
            e.push_string(member.setter.name());
            e.invoke_interface(&Type::object(CONVERTER), &convert_signature());
            e.unbox_or_zero(&member.target_ty);
        } else {
            e.load_local(&locals.from);
            e.invoke_virtual(&source_ty, &member.getter);
        }
        e.invoke_virtual(&target_ty, &member.setter);
        e.end_block(&mut block);
        let next = e.make_label();
        e.goto(next);

        e.catch_exception(&block, None)?;
        e.store_local(&locals.cause);
        e.new_instance(&indexed);
        e.dup();
        e.push_string(&format!("cannot copy property {}", member.name));
        e.push_int(i32::try_from(index).unwrap_or(i32::MAX));
        e.load_local(&locals.cause);
        e.invoke_constructor(
            &indexed,
            &[Type::string(), Type::Int, Type::object(well_known::THROWABLE)],
        );
        e.athrow();
        e.mark(next);
        Ok(())
    }
}

struct CopyLocals {
    from: kiln_emit::Local,
    to: kiln_emit::Local,
    cause: kiln_emit::Local,
}

impl Generator for CopierGenerator {
    fn source_name(&self) -> &str {
        "kiln.beans.BeanCopier"
    }

    fn spec(&self) -> DynSpec {
        DynSpec::new(self.key.clone())
    }

    fn name_prefix(&self) -> Option<&str> {
        Some(self.source.name())
    }

    /// The source's scope when it sees the target class, else the target's.
    fn default_scope(&self) -> Option<ModuleScope> {
        let source_scope = self.source.scope();
        let sees_target = source_scope.as_ref().is_some_and(|scope| {
            scope
                .load_class(self.target.name())
                .is_some_and(|found| Arc::ptr_eq(&found, &self.target))
        });
        if sees_target {
            source_scope
        } else {
            self.target.scope()
        }
    }

    fn generate_unit(&self, name: &str) -> Result<UnitDef, GenError> {
        let members = members(&self.source, &self.target, self.use_converter);
        tracing::debug!(
            source = self.source.name(),
            target = self.target.name(),
            members = members.len(),
            "generating copier"
        );

        let mut te =
            TypeEmitter::begin_type(Access::PUBLIC, name, None, vec![], Some("BeanCopier"));
        null_constructor(&mut te)?;

        let mut e = te.begin_method(Access::PUBLIC, &copy_signature(), &[]);
        let locals = CopyLocals {
            from: e.make_local(Type::object(self.source.name())),
            to: e.make_local(Type::object(self.target.name())),
            cause: e.make_local(Type::object(well_known::THROWABLE)),
        };
        e.load_arg(0);
        e.checkcast(locals.from.ty());
        e.store_local(&locals.from);
        e.load_arg(1);
        e.checkcast(locals.to.ty());
        e.store_local(&locals.to);
        for (index, member) in members.iter().enumerate() {
            self.emit_member(&mut e, index, member, &locals)?;
        }
        e.return_value();
        e.end_method()?;
        Ok(te.end_type()?)
    }
}

/// A generated copy adapter from one bean class to another.
#[derive(Debug)]
pub struct BeanCopier {
    copier: ObjRef,
    use_converter: bool,
}

impl BeanCopier {
    /// The copier from `source` to `target`, shared with every equal
    /// request in the same scope.
    pub fn create(
        source: &Arc<Class>,
        target: &Arc<Class>,
        use_converter: bool,
    ) -> Result<Self, BeanError> {
        Self::create_with(&GeneratorBase::new(), source, target, use_converter)
    }

    pub fn create_with(
        base: &GeneratorBase,
        source: &Arc<Class>,
        target: &Arc<Class>,
        use_converter: bool,
    ) -> Result<Self, BeanError> {
        converter_interface()?;
        let key = key_factory()
            .create([
                KeyValue::type_name(source.name()),
                KeyValue::type_name(target.name()),
                KeyValue::from(use_converter),
            ])
            .map_err(GenError::from)?;
        let generator = CopierGenerator {
            source: Arc::clone(source),
            target: Arc::clone(target),
            use_converter,
            key,
        };
        let copier = base.create(&generator)?;
        Ok(BeanCopier {
            copier,
            use_converter,
        })
    }

    pub fn class(&self) -> &Arc<Class> {
        self.copier.class()
    }

    pub fn uses_converter(&self) -> bool {
        self.use_converter
    }

    /// Copy the shared properties of `from` into `to`.
    pub fn copy(
        &self,
        from: &ObjRef,
        to: &ObjRef,
        converter: Option<&ObjRef>,
    ) -> Result<(), BeanError> {
        let converter = match (self.use_converter, converter) {
            (true, None) => return Err(BeanError::MissingConverter),
            (true, Some(converter)) => Value::object(Arc::clone(converter)),
            (false, _) => Value::NULL,
        };
        invoke_virtual(
            &self.copier,
            "copy",
            COPY_DESC,
            vec![
                Value::object(Arc::clone(from)),
                Value::object(Arc::clone(to)),
                converter,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
