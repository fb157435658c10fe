//! Opcode table.
//!
//! Opcode byte values follow the classic stack-machine numbering so
//! disassembly reads familiarly. Only the subset the emitter produces is
//! defined.

/// How the bytes following an opcode are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// One signed byte (`BIPUSH`).
    I8,
    /// One signed 16-bit value (`SIPUSH`).
    I16,
    /// 16-bit local slot.
    Local,
    /// 16-bit local slot followed by a signed 16-bit delta (`IINC`).
    Iinc,
    /// 16-bit constant pool index.
    Pool,
    /// Signed 32-bit branch offset relative to the opcode position.
    Branch,
    /// One array type code byte (`NEWARRAY`).
    ArrayType,
    /// `default, low, high, offsets[high - low + 1]`, all 32-bit.
    TableSwitch,
    /// `default, npairs, (key, offset) * npairs`, all 32-bit.
    LookupSwitch,
}

macro_rules! opcodes {
    ($($variant:ident = $byte:literal, $mnemonic:literal, $kind:ident;)*) => {
        /// A single instruction opcode.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            /// Decode an opcode byte.
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            /// Lowercase mnemonic used by the disassembler.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            /// Operand layout following the opcode byte.
            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $(Opcode::$variant => OperandKind::$kind,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None;
    AconstNull = 0x01, "aconst_null", None;
    IconstM1 = 0x02, "iconst_m1", None;
    Iconst0 = 0x03, "iconst_0", None;
    Iconst1 = 0x04, "iconst_1", None;
    Iconst2 = 0x05, "iconst_2", None;
    Iconst3 = 0x06, "iconst_3", None;
    Iconst4 = 0x07, "iconst_4", None;
    Iconst5 = 0x08, "iconst_5", None;
    Lconst0 = 0x09, "lconst_0", None;
    Lconst1 = 0x0a, "lconst_1", None;
    Fconst0 = 0x0b, "fconst_0", None;
    Fconst1 = 0x0c, "fconst_1", None;
    Fconst2 = 0x0d, "fconst_2", None;
    Dconst0 = 0x0e, "dconst_0", None;
    Dconst1 = 0x0f, "dconst_1", None;
    Bipush = 0x10, "bipush", I8;
    Sipush = 0x11, "sipush", I16;
    Ldc = 0x13, "ldc", Pool;
    Ldc2 = 0x14, "ldc2", Pool;
    Iload = 0x15, "iload", Local;
    Lload = 0x16, "lload", Local;
    Fload = 0x17, "fload", Local;
    Dload = 0x18, "dload", Local;
    Aload = 0x19, "aload", Local;
    Iaload = 0x2e, "iaload", None;
    Laload = 0x2f, "laload", None;
    Faload = 0x30, "faload", None;
    Daload = 0x31, "daload", None;
    Aaload = 0x32, "aaload", None;
    Baload = 0x33, "baload", None;
    Caload = 0x34, "caload", None;
    Saload = 0x35, "saload", None;
    Istore = 0x36, "istore", Local;
    Lstore = 0x37, "lstore", Local;
    Fstore = 0x38, "fstore", Local;
    Dstore = 0x39, "dstore", Local;
    Astore = 0x3a, "astore", Local;
    Iastore = 0x4f, "iastore", None;
    Lastore = 0x50, "lastore", None;
    Fastore = 0x51, "fastore", None;
    Dastore = 0x52, "dastore", None;
    Aastore = 0x53, "aastore", None;
    Bastore = 0x54, "bastore", None;
    Castore = 0x55, "castore", None;
    Sastore = 0x56, "sastore", None;
    Pop = 0x57, "pop", None;
    Pop2 = 0x58, "pop2", None;
    Dup = 0x59, "dup", None;
    DupX1 = 0x5a, "dup_x1", None;
    DupX2 = 0x5b, "dup_x2", None;
    Dup2 = 0x5c, "dup2", None;
    Dup2X1 = 0x5d, "dup2_x1", None;
    Dup2X2 = 0x5e, "dup2_x2", None;
    Swap = 0x5f, "swap", None;
    Iadd = 0x60, "iadd", None;
    Ladd = 0x61, "ladd", None;
    Fadd = 0x62, "fadd", None;
    Dadd = 0x63, "dadd", None;
    Isub = 0x64, "isub", None;
    Lsub = 0x65, "lsub", None;
    Fsub = 0x66, "fsub", None;
    Dsub = 0x67, "dsub", None;
    Imul = 0x68, "imul", None;
    Lmul = 0x69, "lmul", None;
    Fmul = 0x6a, "fmul", None;
    Dmul = 0x6b, "dmul", None;
    Idiv = 0x6c, "idiv", None;
    Ldiv = 0x6d, "ldiv", None;
    Fdiv = 0x6e, "fdiv", None;
    Ddiv = 0x6f, "ddiv", None;
    Irem = 0x70, "irem", None;
    Lrem = 0x71, "lrem", None;
    Frem = 0x72, "frem", None;
    Drem = 0x73, "drem", None;
    Ineg = 0x74, "ineg", None;
    Lneg = 0x75, "lneg", None;
    Fneg = 0x76, "fneg", None;
    Dneg = 0x77, "dneg", None;
    Ishl = 0x78, "ishl", None;
    Lshl = 0x79, "lshl", None;
    Ishr = 0x7a, "ishr", None;
    Lshr = 0x7b, "lshr", None;
    Iushr = 0x7c, "iushr", None;
    Lushr = 0x7d, "lushr", None;
    Iand = 0x7e, "iand", None;
    Land = 0x7f, "land", None;
    Ior = 0x80, "ior", None;
    Lor = 0x81, "lor", None;
    Ixor = 0x82, "ixor", None;
    Lxor = 0x83, "lxor", None;
    Iinc = 0x84, "iinc", Iinc;
    I2l = 0x85, "i2l", None;
    I2f = 0x86, "i2f", None;
    I2d = 0x87, "i2d", None;
    L2i = 0x88, "l2i", None;
    L2f = 0x89, "l2f", None;
    L2d = 0x8a, "l2d", None;
    F2i = 0x8b, "f2i", None;
    F2l = 0x8c, "f2l", None;
    F2d = 0x8d, "f2d", None;
    D2i = 0x8e, "d2i", None;
    D2l = 0x8f, "d2l", None;
    D2f = 0x90, "d2f", None;
    I2b = 0x91, "i2b", None;
    I2c = 0x92, "i2c", None;
    I2s = 0x93, "i2s", None;
    Lcmp = 0x94, "lcmp", None;
    Fcmpl = 0x95, "fcmpl", None;
    Fcmpg = 0x96, "fcmpg", None;
    Dcmpl = 0x97, "dcmpl", None;
    Dcmpg = 0x98, "dcmpg", None;
    Ifeq = 0x99, "ifeq", Branch;
    Ifne = 0x9a, "ifne", Branch;
    Iflt = 0x9b, "iflt", Branch;
    Ifge = 0x9c, "ifge", Branch;
    Ifgt = 0x9d, "ifgt", Branch;
    Ifle = 0x9e, "ifle", Branch;
    IfIcmpeq = 0x9f, "if_icmpeq", Branch;
    IfIcmpne = 0xa0, "if_icmpne", Branch;
    IfIcmplt = 0xa1, "if_icmplt", Branch;
    IfIcmpge = 0xa2, "if_icmpge", Branch;
    IfIcmpgt = 0xa3, "if_icmpgt", Branch;
    IfIcmple = 0xa4, "if_icmple", Branch;
    IfAcmpeq = 0xa5, "if_acmpeq", Branch;
    IfAcmpne = 0xa6, "if_acmpne", Branch;
    Goto = 0xa7, "goto", Branch;
    Tableswitch = 0xaa, "tableswitch", TableSwitch;
    Lookupswitch = 0xab, "lookupswitch", LookupSwitch;
    Ireturn = 0xac, "ireturn", None;
    Lreturn = 0xad, "lreturn", None;
    Freturn = 0xae, "freturn", None;
    Dreturn = 0xaf, "dreturn", None;
    Areturn = 0xb0, "areturn", None;
    Return = 0xb1, "return", None;
    Getstatic = 0xb2, "getstatic", Pool;
    Putstatic = 0xb3, "putstatic", Pool;
    Getfield = 0xb4, "getfield", Pool;
    Putfield = 0xb5, "putfield", Pool;
    Invokevirtual = 0xb6, "invokevirtual", Pool;
    Invokespecial = 0xb7, "invokespecial", Pool;
    Invokestatic = 0xb8, "invokestatic", Pool;
    Invokeinterface = 0xb9, "invokeinterface", Pool;
    New = 0xbb, "new", Pool;
    Newarray = 0xbc, "newarray", ArrayType;
    Anewarray = 0xbd, "anewarray", Pool;
    Arraylength = 0xbe, "arraylength", None;
    Athrow = 0xbf, "athrow", None;
    Checkcast = 0xc0, "checkcast", Pool;
    Instanceof = 0xc1, "instanceof", Pool;
    Ifnull = 0xc6, "ifnull", Branch;
    Ifnonnull = 0xc7, "ifnonnull", Branch;
}

impl Opcode {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Control never falls through to the next instruction.
    pub fn is_unconditional(self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::Tableswitch
                | Opcode::Lookupswitch
                | Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
                | Opcode::Athrow
        )
    }
}
