//! Access flags for units, fields and methods.

use bitflags::bitflags;

bitflags! {
    /// Access and property flags.
    ///
    /// The same bit layout is used for units, fields and methods; not every
    /// flag is meaningful on every item.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Access: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
    }
}

impl Access {
    pub fn is_static(self) -> bool {
        self.contains(Access::STATIC)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Access::INTERFACE)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Access::ABSTRACT)
    }

    /// Space-separated lowercase keywords, for disassembly.
    pub fn keywords(self) -> String {
        let names = [
            (Access::PUBLIC, "public"),
            (Access::PRIVATE, "private"),
            (Access::PROTECTED, "protected"),
            (Access::STATIC, "static"),
            (Access::FINAL, "final"),
            (Access::SYNCHRONIZED, "synchronized"),
            (Access::INTERFACE, "interface"),
            (Access::ABSTRACT, "abstract"),
            (Access::SYNTHETIC, "synthetic"),
        ];
        names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
