//! The guest interface copy adapters call to convert values.

use std::sync::Arc;

use kiln_emit::TypeEmitter;
use kiln_gen::GenError;
use kiln_ir::{Access, MethodDesc, Signature, Type};
use kiln_vm::{Class, DefineError, ModuleScope};

use crate::BeanError;

/// Internal name of the converter interface.
pub const CONVERTER: &str = "kiln/beans/Converter";

/// `Object convert(Object value, String targetType, Object context)`.
///
/// `targetType` is the descriptor of the setter's parameter, `context` the
/// setter's name.
pub fn convert_signature() -> Signature {
    Signature::new(
        "convert",
        MethodDesc::new(
            [Type::object_root(), Type::string(), Type::object_root()],
            Type::object_root(),
        ),
    )
}

/// The converter interface, defined in the system scope on first use.
pub fn converter_interface() -> Result<Arc<Class>, BeanError> {
    let system = ModuleScope::system();
    if let Some(class) = system.find_class(CONVERTER) {
        return Ok(class);
    }
    let mut te = TypeEmitter::begin_type(
        Access::PUBLIC | Access::INTERFACE | Access::ABSTRACT,
        CONVERTER,
        None,
        vec![],
        Some("kiln_beans"),
    );
    te.declare_method(Access::PUBLIC, &convert_signature(), &[]);
    match system.define(te.end_type()?) {
        Ok(class) => Ok(class),
        // Lost a race with another thread defining it.
        Err(DefineError::Duplicate { name }) => system.find_class(&name).ok_or_else(|| {
            GenError::invalid_spec(format!("`{name}` vanished from the system scope")).into()
        }),
        Err(source) => Err(GenError::Define {
            name: CONVERTER.to_owned(),
            source,
        }
        .into()),
    }
}
