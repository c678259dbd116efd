//! Declaration modifier bitmask and visibility resolution

use std::fmt;

pub mod flags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const INTERNAL: u16 = 0x0008;
    pub const STATIC: u16 = 0x0010;
    pub const FINAL: u16 = 0x0020;
    pub const ABSTRACT: u16 = 0x0040;
    pub const OVERRIDE: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const SYNTHETIC: u16 = 0x0200;
    pub const NO_GETTER: u16 = 0x0400;
    pub const NO_SETTER: u16 = 0x0800;

    pub const VISIBILITY_MASK: u16 = PUBLIC | PRIVATE | PROTECTED | INTERNAL;
}

/// Modifier bitmask carried by every declaration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn has(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn with(self, flag: u16) -> Self {
        Self(self.0 | flag)
    }

    pub fn without(self, flag: u16) -> Self {
        Self(self.0 & !flag)
    }

    pub fn is_static(self) -> bool {
        self.has(flags::STATIC)
    }

    pub fn is_final(self) -> bool {
        self.has(flags::FINAL)
    }

    pub fn is_abstract(self) -> bool {
        self.has(flags::ABSTRACT)
    }

    /// Explicitly declared visibility, if any
    pub fn visibility(self) -> Option<Visibility> {
        match self.0 & flags::VISIBILITY_MASK {
            flags::PUBLIC => Some(Visibility::Public),
            flags::PROTECTED => Some(Visibility::Protected),
            flags::INTERNAL => Some(Visibility::Internal),
            flags::PRIVATE => Some(Visibility::Private),
            _ => None,
        }
    }

    /// Replace the visibility bits
    pub fn with_visibility(self, visibility: Visibility) -> Self {
        Self((self.0 & !flags::VISIBILITY_MASK) | visibility.flag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Visibility {
    Private,
    Internal,
    Protected,
    Public,
}

impl Visibility {
    pub fn flag(self) -> u16 {
        match self {
            Visibility::Public => flags::PUBLIC,
            Visibility::Protected => flags::PROTECTED,
            Visibility::Internal => flags::INTERNAL,
            Visibility::Private => flags::PRIVATE,
        }
    }

    /// Common visibility resolution: an explicit declaration wins, then the
    /// visibility inherited from the enclosing declaration, then the default
    /// for the owning scope (members of interfaces and traits are public,
    /// everything else is internal).
    pub fn resolve(declared: Option<Visibility>, inherited: Option<Visibility>, owner_is_interface: bool) -> Self {
        declared.or(inherited).unwrap_or(if owner_is_interface {
            Visibility::Public
        } else {
            Visibility::Internal
        })
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_bits() {
        let m = Modifiers::from_bits(flags::PROTECTED | flags::STATIC);
        assert_eq!(m.visibility(), Some(Visibility::Protected));
        assert!(m.is_static());
        let m = m.with_visibility(Visibility::Private);
        assert_eq!(m.visibility(), Some(Visibility::Private));
        assert!(m.is_static());
    }

    #[test]
    fn test_common_visibility_rule() {
        assert_eq!(Visibility::resolve(Some(Visibility::Private), Some(Visibility::Public), false), Visibility::Private);
        assert_eq!(Visibility::resolve(None, Some(Visibility::Protected), false), Visibility::Protected);
        assert_eq!(Visibility::resolve(None, None, true), Visibility::Public);
        assert_eq!(Visibility::resolve(None, None, false), Visibility::Internal);
    }
}
