//! The core class library, defined natively into the system scope.
//!
//! | Class                             | Members                                   |
//! |-----------------------------------|-------------------------------------------|
//! | `core/Object`                     | `<init>`, `hashCode`, `equals`, `toString` |
//! | `core/String`                     | `hashCode`, `equals`, `length`, `toString` |
//! | `core/Number`                     | `intValue`, `longValue`, `floatValue`, `doubleValue` |
//! | box classes                       | field `value`, `<init>(P)V`, `hashCode`, `equals`, `toString` |
//! | `core/Throwable` and subclasses   | fields `message`, `cause`; `getMessage`, `getCause` |
//! | `core/IndexedMemberException`     | field `index`; `getIndex`                  |

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use kiln_ir::{string_hash, well_known as wk, Access, ConstantPool, MethodDesc, Signature, Type};

use crate::class::{Class, ClassParts, FieldInfo, Method, NativeFn};
use crate::scope::ModuleScope;
use crate::value::{ObjRef, Object, ObjectKind, Value};
use crate::VmError;

pub(crate) struct Core {
    pub(crate) scope: ModuleScope,
    object: Arc<Class>,
    string: Arc<Class>,
}

static CORE: OnceLock<Core> = OnceLock::new();

pub(crate) fn core() -> &'static Core {
    CORE.get_or_init(build)
}

// ── Native helpers ──────────────────────────────────────────────────

fn receiver(args: &[Value]) -> Result<&ObjRef, VmError> {
    args.first()
        .and_then(Value::as_object)
        .ok_or_else(|| throw(wk::NULL_POINTER, "null receiver"))
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn bool_value(b: bool) -> Option<Value> {
    Some(Value::Int(i32::from(b)))
}

fn string_value(s: &str) -> Option<Value> {
    Some(Value::object(new_string(s)))
}

/// A new `core/String`.
pub fn new_string(s: &str) -> ObjRef {
    Object::new(
        Arc::clone(&core().string),
        ObjectKind::Str(Arc::from(s)),
    )
}

/// A new array of `elem` holding `items`.
pub fn new_array(elem: Type, items: Vec<Value>) -> ObjRef {
    Object::new(
        Arc::clone(&core().object),
        ObjectKind::Array {
            elem,
            items: Mutex::new(items),
        },
    )
}

/// Build a guest exception of core class `class_name` carrying `message`.
pub(crate) fn throw(class_name: &str, message: &str) -> VmError {
    let Some(class) = core().scope.find_class(class_name) else {
        return VmError::link(format!("missing core class {class_name}"));
    };
    match class.allocate() {
        Ok(obj) => {
            if let Err(err) = obj.set_field("message", Value::object(new_string(message))) {
                return err;
            }
            VmError::Thrown(obj)
        }
        Err(err) => err,
    }
}

/// `getMessage()` of a throwable, without running guest code.
pub fn throwable_message(obj: &ObjRef) -> Option<String> {
    let message = obj.get_field("message")?;
    message.as_object()?.as_str().map(str::to_owned)
}

/// `getCause()` of a throwable, without running guest code.
pub fn throwable_cause(obj: &ObjRef) -> Option<ObjRef> {
    obj.get_field("cause")?.as_object().cloned()
}

/// Box a primitive value into its core box class.
pub fn box_value(ty: &Type, value: Value) -> Result<ObjRef, VmError> {
    let name = ty
        .boxed_class()
        .ok_or_else(|| VmError::link(format!("{ty} has no box class")))?;
    let class = core()
        .scope
        .find_class(name)
        .ok_or_else(|| VmError::link(format!("missing core class {name}")))?;
    let obj = class.allocate()?;
    obj.set_field("value", value)?;
    Ok(obj)
}

/// The primitive inside a core box, `None` for other objects.
pub fn unbox(obj: &ObjRef) -> Option<Value> {
    let name = obj.class().name();
    if BOXES.iter().any(|(_, box_name, _)| *box_name == name) {
        obj.get_field("value")
    } else {
        None
    }
}

// ── Natives ─────────────────────────────────────────────────────────

fn object_init(_: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(None)
}

fn object_hash(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(Some(Value::Int(receiver(args)?.identity_hash())))
}

fn object_equals(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    let same = arg(args, 1).as_object().is_some_and(|o| Arc::ptr_eq(o, this));
    Ok(bool_value(same))
}

fn object_to_string(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    Ok(string_value(&format!(
        "{}@{:x}",
        this.class().name(),
        this.identity_hash()
    )))
}

fn string_hash_code(args: &[Value]) -> Result<Option<Value>, VmError> {
    let s = receiver(args)?.as_str().unwrap_or_default();
    Ok(Some(Value::Int(string_hash(s))))
}

fn string_equals(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?.as_str();
    let other = arg(args, 1);
    let other = other.as_object().and_then(|o| o.as_str());
    Ok(bool_value(this.is_some() && this == other))
}

fn string_length(args: &[Value]) -> Result<Option<Value>, VmError> {
    let s = receiver(args)?.as_str().unwrap_or_default();
    let len = i32::try_from(s.encode_utf16().count()).unwrap_or(i32::MAX);
    Ok(Some(Value::Int(len)))
}

fn identity(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(Some(Value::object(Arc::clone(receiver(args)?))))
}

fn boxed(args: &[Value]) -> Result<Value, VmError> {
    receiver(args)?
        .get_field("value")
        .ok_or_else(|| VmError::link("receiver is not a box"))
}

fn number_int(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(Some(Value::Int(match boxed(args)? {
        Value::Long(v) => v as i32,
        Value::Float(v) => v as i32,
        Value::Double(v) => v as i32,
        Value::Int(v) => v,
        _ => 0,
    })))
}

fn number_long(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(Some(Value::Long(match boxed(args)? {
        Value::Int(v) => i64::from(v),
        Value::Float(v) => v as i64,
        Value::Double(v) => v as i64,
        Value::Long(v) => v,
        _ => 0,
    })))
}

fn number_float(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(Some(Value::Float(match boxed(args)? {
        Value::Int(v) => v as f32,
        Value::Long(v) => v as f32,
        Value::Double(v) => v as f32,
        Value::Float(v) => v,
        _ => 0.0,
    })))
}

fn number_double(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(Some(Value::Double(match boxed(args)? {
        Value::Int(v) => f64::from(v),
        Value::Long(v) => v as f64,
        Value::Float(v) => f64::from(v),
        Value::Double(v) => v,
        _ => 0.0,
    })))
}

fn box_init(args: &[Value]) -> Result<Option<Value>, VmError> {
    receiver(args)?.set_field("value", arg(args, 1))?;
    Ok(None)
}

fn box_get(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(Some(boxed(args)?))
}

fn box_hash(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    let hash = match boxed(args)? {
        Value::Int(v) if this.class().name() == wk::BOOLEAN => {
            if v != 0 {
                1231
            } else {
                1237
            }
        }
        Value::Int(v) => v,
        Value::Long(v) => (v ^ ((v as u64) >> 32) as i64) as i32,
        Value::Float(v) => v.to_bits() as i32,
        Value::Double(v) => {
            let bits = v.to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        _ => 0,
    };
    Ok(Some(Value::Int(hash)))
}

fn box_equals(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    let other = arg(args, 1);
    let equal = match other.as_object() {
        Some(other) if other.class().name() == this.class().name() => {
            other.get_field("value") == this.get_field("value")
        }
        _ => false,
    };
    Ok(bool_value(equal))
}

fn box_to_string(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    let text = match boxed(args)? {
        Value::Int(v) if this.class().name() == wk::BOOLEAN => (v != 0).to_string(),
        Value::Int(v) if this.class().name() == wk::CHARACTER => u32::try_from(v)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        _ => String::new(),
    };
    Ok(string_value(&text))
}

fn throwable_init(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    if args.len() > 1 {
        this.set_field("message", arg(args, 1))?;
    }
    if args.len() > 2 {
        this.set_field("cause", arg(args, 2))?;
    }
    Ok(None)
}

fn throwable_get_message(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(receiver(args)?.get_field("message"))
}

fn throwable_get_cause(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(receiver(args)?.get_field("cause"))
}

fn throwable_to_string(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    let text = match throwable_message(this) {
        Some(message) => format!("{}: {message}", this.class().name()),
        None => this.class().name().to_owned(),
    };
    Ok(string_value(&text))
}

fn indexed_init(args: &[Value]) -> Result<Option<Value>, VmError> {
    let this = receiver(args)?;
    this.set_field("message", arg(args, 1))?;
    this.set_field("index", arg(args, 2))?;
    this.set_field("cause", arg(args, 3))?;
    Ok(None)
}

fn indexed_get_index(args: &[Value]) -> Result<Option<Value>, VmError> {
    Ok(receiver(args)?.get_field("index"))
}

// ── Assembly ────────────────────────────────────────────────────────

/// (primitive, box class, extends Number)
const BOXES: [(Type, &str, bool); 8] = [
    (Type::Boolean, wk::BOOLEAN, false),
    (Type::Char, wk::CHARACTER, false),
    (Type::Byte, wk::BYTE, true),
    (Type::Short, wk::SHORT, true),
    (Type::Int, wk::INTEGER, true),
    (Type::Long, wk::LONG, true),
    (Type::Float, wk::FLOAT, true),
    (Type::Double, wk::DOUBLE, true),
];

fn sig(name: &str, params: &[Type], ret: Type) -> Signature {
    Signature::new(name, MethodDesc::new(params.iter().cloned(), ret))
}

fn public(name: &str, params: &[Type], ret: Type, f: NativeFn) -> Method {
    Method::native(Access::PUBLIC, sig(name, params, ret), f)
}

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo {
        access: Access::PRIVATE,
        name: name.to_owned(),
        ty,
    }
}

fn define(
    scope: &ModuleScope,
    name: &str,
    access: Access,
    super_class: Option<&Arc<Class>>,
    fields: Vec<FieldInfo>,
    methods: Vec<Method>,
) -> Arc<Class> {
    let parts = ClassParts {
        name: name.to_owned(),
        access: Access::PUBLIC | access,
        super_class: super_class.cloned(),
        interfaces: Vec::new(),
        source: Some("core".to_owned()),
        pool: ConstantPool::new(),
        fields,
        static_values: Vec::new(),
        methods,
    };
    let class = Arc::new(Class::assemble(parts, scope.weak()));
    scope.insert(Arc::clone(&class));
    class
}

fn build() -> Core {
    let scope = ModuleScope::root("system");
    let obj_ty = Type::object_root;
    let str_ty = Type::string;
    let throwable_ty = || Type::object(wk::THROWABLE);

    let object = define(
        &scope,
        wk::OBJECT,
        Access::empty(),
        None,
        Vec::new(),
        vec![
            public(wk::CONSTRUCTOR, &[], Type::Void, object_init),
            public("hashCode", &[], Type::Int, object_hash),
            public("equals", &[obj_ty()], Type::Boolean, object_equals),
            public("toString", &[], str_ty(), object_to_string),
        ],
    );

    let string = define(
        &scope,
        wk::STRING,
        Access::FINAL,
        Some(&object),
        Vec::new(),
        vec![
            public("hashCode", &[], Type::Int, string_hash_code),
            public("equals", &[obj_ty()], Type::Boolean, string_equals),
            public("length", &[], Type::Int, string_length),
            public("toString", &[], str_ty(), identity),
        ],
    );

    let number = define(
        &scope,
        wk::NUMBER,
        Access::ABSTRACT,
        Some(&object),
        Vec::new(),
        vec![
            public("intValue", &[], Type::Int, number_int),
            public("longValue", &[], Type::Long, number_long),
            public("floatValue", &[], Type::Float, number_float),
            public("doubleValue", &[], Type::Double, number_double),
        ],
    );

    for (prim, name, is_number) in BOXES {
        let mut methods = vec![
            public(wk::CONSTRUCTOR, &[prim.clone()], Type::Void, box_init),
            public("hashCode", &[], Type::Int, box_hash),
            public("equals", &[obj_ty()], Type::Boolean, box_equals),
            public("toString", &[], str_ty(), box_to_string),
        ];
        match prim {
            Type::Boolean => methods.push(public("booleanValue", &[], Type::Boolean, box_get)),
            Type::Char => methods.push(public("charValue", &[], Type::Char, box_get)),
            _ => {}
        }
        let parent = if is_number { &number } else { &object };
        define(
            &scope,
            name,
            Access::FINAL,
            Some(parent),
            vec![field("value", prim)],
            methods,
        );
    }

    let throwable = define(
        &scope,
        wk::THROWABLE,
        Access::empty(),
        Some(&object),
        vec![field("message", str_ty()), field("cause", throwable_ty())],
        vec![
            public(wk::CONSTRUCTOR, &[], Type::Void, throwable_init),
            public(wk::CONSTRUCTOR, &[str_ty()], Type::Void, throwable_init),
            public(
                wk::CONSTRUCTOR,
                &[str_ty(), throwable_ty()],
                Type::Void,
                throwable_init,
            ),
            public("getMessage", &[], str_ty(), throwable_get_message),
            public("getCause", &[], throwable_ty(), throwable_get_cause),
            public("toString", &[], str_ty(), throwable_to_string),
        ],
    );
    let leaf = |name: &str, parent: &Arc<Class>| {
        define(&scope, name, Access::empty(), Some(parent), Vec::new(), Vec::new())
    };
    let exception = leaf(wk::EXCEPTION, &throwable);
    let runtime = leaf(wk::RUNTIME_EXCEPTION, &exception);
    for name in [
        wk::NULL_POINTER,
        wk::CLASS_CAST,
        wk::ARITHMETIC,
        wk::INDEX_OUT_OF_BOUNDS,
        wk::NEGATIVE_ARRAY_SIZE,
        wk::ILLEGAL_ARGUMENT,
        wk::ILLEGAL_STATE,
    ] {
        leaf(name, &runtime);
    }
    leaf(wk::NO_SUCH_MEMBER, &throwable);
    leaf(wk::STACK_OVERFLOW, &throwable);
    define(
        &scope,
        wk::INDEXED_MEMBER,
        Access::empty(),
        Some(&runtime),
        vec![field("index", Type::Int)],
        vec![
            public(
                wk::CONSTRUCTOR,
                &[str_ty(), Type::Int, throwable_ty()],
                Type::Void,
                indexed_init,
            ),
            public("getIndex", &[], Type::Int, indexed_get_index),
        ],
    );

    Core {
        scope,
        object,
        string,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
