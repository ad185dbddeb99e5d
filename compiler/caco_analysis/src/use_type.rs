//! How a function uses a variable.

use bitflags::bitflags;

bitflags! {
    /// Read/write usage of a variable inside one function.
    ///
    /// The empty set is "unused". Usage only grows: combining two
    /// observations is a bitwise union, so `READ | WRITE == READ_WRITE`.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct UseType: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl UseType {
    pub const UNUSED: UseType = UseType::empty();
}
