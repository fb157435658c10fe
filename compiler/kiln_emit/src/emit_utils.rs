//! Higher-level emission helpers built on the instruction emitter.

use std::collections::BTreeMap;

use kiln_ir::{string_hash, well_known, Access, MethodDesc, Signature, Type};

use crate::code::CmpMode;
use crate::{CodeEmitter, EmitError, Label, SwitchCallback, TypeEmitter};

/// Case and default bodies of [`string_switch`].
pub trait StringSwitchCallback {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: &str,
        end: Label,
    ) -> Result<(), EmitError>;

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError>;
}

fn hash_code_sig() -> Signature {
    Signature::new("hashCode", MethodDesc::new([], Type::Int))
}

fn equals_sig() -> Signature {
    Signature::new("equals", MethodDesc::new([Type::object_root()], Type::Boolean))
}

struct HashBuckets<'a> {
    buckets: BTreeMap<i32, Vec<&'a str>>,
    def: Label,
    end: Label,
    inner: &'a mut dyn StringSwitchCallback,
}

impl SwitchCallback for HashBuckets<'_> {
    // Stack on entry: [s]. Each candidate but the last is tested on a copy;
    // the last consumes `s`, so every case body starts with an empty stack.
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: i32,
        _switch_end: Label,
    ) -> Result<(), EmitError> {
        let Some(bucket) = self.buckets.get(&key) else {
            e.pop();
            e.goto(self.def);
            return Ok(());
        };
        let mut next: Option<Label> = None;
        for (i, &candidate) in bucket.iter().enumerate() {
            let last = i + 1 == bucket.len();
            if let Some(next) = next.take() {
                e.mark(next);
            }
            if !last {
                e.dup();
            }
            e.push_string(candidate);
            e.invoke_virtual(&Type::object_root(), &equals_sig());
            if last {
                e.if_jump(CmpMode::Eq, self.def);
            } else {
                let miss = e.make_label();
                e.if_jump(CmpMode::Eq, miss);
                e.pop();
                next = Some(miss);
            }
            self.inner.process_case(e, candidate, self.end)?;
        }
        Ok(())
    }

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError> {
        e.pop();
        Ok(())
    }
}

/// Switch on the string on top of the stack: dispatch on its hash code,
/// then confirm with `equals` within each hash bucket. Null is not allowed.
pub fn string_switch(
    e: &mut CodeEmitter<'_>,
    strings: &[&str],
    callback: &mut dyn StringSwitchCallback,
) -> Result<(), EmitError> {
    let mut buckets: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
    for &s in strings {
        let bucket = buckets.entry(string_hash(s)).or_default();
        if !bucket.contains(&s) {
            bucket.push(s);
        }
    }
    let keys: Vec<i32> = buckets.keys().copied().collect();
    let def = e.make_label();
    let end = e.make_label();

    e.dup();
    e.invoke_virtual(&Type::object_root(), &hash_code_sig());
    let mut hashed = HashBuckets {
        buckets,
        def,
        end,
        inner: callback,
    };
    e.process_switch(&keys, &mut hashed)?;
    e.mark(def);
    hashed.inner.process_default(e)?;
    e.mark(end);
    Ok(())
}

/// Push a new `core/String[]` holding `strings`.
pub fn push_string_array(e: &mut CodeEmitter<'_>, strings: &[&str]) {
    push_array(e, &Type::string(), strings.len(), |e, i| e.push_string(strings[i]));
}

/// Push a new array of `elem` with `len` elements, each produced by `value`.
pub fn push_array(
    e: &mut CodeEmitter<'_>,
    elem: &Type,
    len: usize,
    mut value: impl FnMut(&mut CodeEmitter<'_>, usize),
) {
    e.push_int(i32::try_from(len).unwrap_or(i32::MAX));
    e.new_array(elem);
    for i in 0..len {
        e.dup();
        e.push_int(i32::try_from(i).unwrap_or(i32::MAX));
        value(e, i);
        e.array_store(elem);
    }
}

/// Public no-argument constructor calling the supertype's.
pub fn null_constructor(te: &mut TypeEmitter) -> Result<(), EmitError> {
    let mut e = te.begin_method(Access::PUBLIC, &Signature::constructor([]), &[]);
    e.load_this();
    e.super_invoke_constructor();
    e.return_value();
    e.end_method()
}

/// `name` with its first character upper-cased.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Field backing the property `name` in [`add_property`].
pub fn property_field(name: &str) -> String {
    format!("$kiln_prop_{name}")
}

/// Private field plus public `getX`/`setX` accessors for each property.
pub fn add_properties(te: &mut TypeEmitter, props: &[(&str, Type)]) -> Result<(), EmitError> {
    for (name, ty) in props {
        add_property(te, name, ty)?;
    }
    Ok(())
}

pub fn add_property(te: &mut TypeEmitter, name: &str, ty: &Type) -> Result<(), EmitError> {
    let field = property_field(name);
    te.declare_field(Access::PRIVATE, &field, ty.clone(), None)?;
    let cap = capitalize(name);

    let getter = Signature::new(&format!("get{cap}"), MethodDesc::new([], ty.clone()));
    let mut e = te.begin_method(Access::PUBLIC, &getter, &[]);
    e.load_this();
    e.get_own_field(&field)?;
    e.return_value();
    e.end_method()?;

    let setter = Signature::new(&format!("set{cap}"), MethodDesc::new([ty.clone()], Type::Void));
    let mut e = te.begin_method(Access::PUBLIC, &setter, &[]);
    e.load_this();
    e.load_arg(0);
    e.put_own_field(&field)?;
    e.return_value();
    e.end_method()
}

/// `throw new core/IllegalArgumentException(message)`.
pub fn throw_illegal_argument(e: &mut CodeEmitter<'_>, message: &str) {
    e.throw_exception(&Type::object(well_known::ILLEGAL_ARGUMENT), message);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
