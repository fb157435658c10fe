//! Internal names of the core classes every module scope can see.

pub const OBJECT: &str = "core/Object";
pub const STRING: &str = "core/String";
pub const NUMBER: &str = "core/Number";

pub const BOOLEAN: &str = "core/Boolean";
pub const BYTE: &str = "core/Byte";
pub const CHARACTER: &str = "core/Character";
pub const SHORT: &str = "core/Short";
pub const INTEGER: &str = "core/Integer";
pub const LONG: &str = "core/Long";
pub const FLOAT: &str = "core/Float";
pub const DOUBLE: &str = "core/Double";

pub const THROWABLE: &str = "core/Throwable";
pub const EXCEPTION: &str = "core/Exception";
pub const RUNTIME_EXCEPTION: &str = "core/RuntimeException";
pub const NULL_POINTER: &str = "core/NullPointerException";
pub const CLASS_CAST: &str = "core/ClassCastException";
pub const ARITHMETIC: &str = "core/ArithmeticException";
pub const INDEX_OUT_OF_BOUNDS: &str = "core/IndexOutOfBoundsException";
pub const NEGATIVE_ARRAY_SIZE: &str = "core/NegativeArraySizeException";
pub const ILLEGAL_ARGUMENT: &str = "core/IllegalArgumentException";
pub const ILLEGAL_STATE: &str = "core/IllegalStateException";
pub const NO_SUCH_MEMBER: &str = "core/NoSuchMemberError";
pub const STACK_OVERFLOW: &str = "core/StackOverflowError";
/// Wraps a failure raised while processing the n-th member of a generated
/// adapter; carries the 0-based member index.
pub const INDEXED_MEMBER: &str = "core/IndexedMemberException";

pub const CONSTRUCTOR: &str = "<init>";
pub const STATIC_INIT: &str = "<clinit>";
