//! Symbolic references to methods and fields of other types.

use kiln_ir::{Access, MethodDesc, Signature, Type};

/// A method as seen from a call site: owner, access and signature.
///
/// The access flags and the owner's interface bit decide which invocation
/// form [`CodeEmitter::invoke`](crate::CodeEmitter::invoke) emits.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: Type,
    pub owner_is_interface: bool,
    pub access: Access,
    pub sig: Signature,
}

impl MethodRef {
    pub fn new(owner: Type, owner_is_interface: bool, access: Access, sig: Signature) -> Self {
        Self {
            owner,
            owner_is_interface,
            access,
            sig,
        }
    }

    /// Public instance method of a class.
    pub fn virtual_method(owner: Type, sig: Signature) -> Self {
        Self::new(owner, false, Access::PUBLIC, sig)
    }

    /// Public static method of a class.
    pub fn static_method(owner: Type, sig: Signature) -> Self {
        Self::new(owner, false, Access::PUBLIC | Access::STATIC, sig)
    }

    /// Abstract method of an interface.
    pub fn interface_method(owner: Type, sig: Signature) -> Self {
        Self::new(owner, true, Access::PUBLIC | Access::ABSTRACT, sig)
    }

    /// Constructor of `owner` taking `params`.
    pub fn constructor(owner: Type, params: impl IntoIterator<Item = Type>) -> Self {
        Self::new(owner, false, Access::PUBLIC, Signature::constructor(params))
    }

    pub fn desc(&self) -> &MethodDesc {
        self.sig.desc()
    }

    /// Slots consumed from the operand stack by a call, receiver included.
    pub(crate) fn pops(&self) -> u16 {
        let receiver = u16::from(!self.access.is_static());
        self.sig.desc().arg_size() + receiver
    }
}

/// A field as seen from an access site.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: Type,
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
}

impl FieldRef {
    pub fn instance(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            owner,
            name: name.to_owned(),
            ty,
            is_static: false,
        }
    }

    pub fn of_static(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            owner,
            name: name.to_owned(),
            ty,
            is_static: true,
        }
    }
}
