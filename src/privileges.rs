//! Privilege kinds and privilege bitmasks.
//!
//! [`Privilege`] is the closed, ordered vocabulary of PostgreSQL object
//! privileges. [`PrivilegeSet`] is a bitmask over it whose bit positions equal
//! the declaration index, so the order below is a persisted-format contract:
//! new kinds may only be appended.

use std::fmt;
use std::ops::ControlFlow;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of privileges held on one object.
    ///
    /// | Flag | Native code |
    /// |------|-------------|
    /// | [`INSERT`](Self::INSERT) | `a` |
    /// | [`SELECT`](Self::SELECT) | `r` |
    /// | [`UPDATE`](Self::UPDATE) | `w` |
    /// | [`DELETE`](Self::DELETE) | `d` |
    /// | [`TRUNCATE`](Self::TRUNCATE) | `D` |
    /// | [`REFERENCES`](Self::REFERENCES) | `x` |
    /// | [`TRIGGER`](Self::TRIGGER) | `t` |
    /// | [`EXECUTE`](Self::EXECUTE) | `X` |
    /// | [`USAGE`](Self::USAGE) | `U` |
    /// | [`CREATE`](Self::CREATE) | `C` |
    /// | [`TEMPORARY`](Self::TEMPORARY) | `T` |
    /// | [`CONNECT`](Self::CONNECT) | `c` |
    /// | [`SET`](Self::SET) | `s` |
    /// | [`ALTER_SYSTEM`](Self::ALTER_SYSTEM) | `A` |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PrivilegeSet: u64 {
        const INSERT       = 1 << 0;
        const SELECT       = 1 << 1;
        const UPDATE       = 1 << 2;
        const DELETE       = 1 << 3;
        const TRUNCATE     = 1 << 4;
        const REFERENCES   = 1 << 5;
        const TRIGGER      = 1 << 6;
        const EXECUTE      = 1 << 7;
        const USAGE        = 1 << 8;
        const CREATE       = 1 << 9;
        const TEMPORARY    = 1 << 10;
        const CONNECT      = 1 << 11;
        const SET          = 1 << 12;
        const ALTER_SYSTEM = 1 << 13;
    }
}

/// A single privilege kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    Insert,
    Select,
    Update,
    Delete,
    Truncate,
    References,
    Trigger,
    Execute,
    Usage,
    Create,
    Temporary,
    Connect,
    Set,
    AlterSystem,
}

impl Privilege {
    /// Every kind, in declaration order.
    pub const ALL: [Privilege; 14] = [
        Privilege::Insert,
        Privilege::Select,
        Privilege::Update,
        Privilege::Delete,
        Privilege::Truncate,
        Privilege::References,
        Privilege::Trigger,
        Privilege::Execute,
        Privilege::Usage,
        Privilege::Create,
        Privilege::Temporary,
        Privilege::Connect,
        Privilege::Set,
        Privilege::AlterSystem,
    ];

    /// The single-flag set for this kind.
    pub fn bit(self) -> PrivilegeSet {
        PrivilegeSet::from_bits_retain(1u64 << (self as u32))
    }

    /// Canonical display name, as written in GRANT statements.
    pub fn name(self) -> &'static str {
        match self {
            Privilege::Insert => "INSERT",
            Privilege::Select => "SELECT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Truncate => "TRUNCATE",
            Privilege::References => "REFERENCES",
            Privilege::Trigger => "TRIGGER",
            Privilege::Execute => "EXECUTE",
            Privilege::Usage => "USAGE",
            Privilege::Create => "CREATE",
            Privilege::Temporary => "TEMPORARY",
            Privilege::Connect => "CONNECT",
            Privilege::Set => "SET",
            Privilege::AlterSystem => "ALTER SYSTEM",
        }
    }

    /// Native single-character code used in `aclitem` text.
    pub fn code(self) -> char {
        match self {
            Privilege::Insert => 'a',
            Privilege::Select => 'r',
            Privilege::Update => 'w',
            Privilege::Delete => 'd',
            Privilege::Truncate => 'D',
            Privilege::References => 'x',
            Privilege::Trigger => 't',
            Privilege::Execute => 'X',
            Privilege::Usage => 'U',
            Privilege::Create => 'C',
            Privilege::Temporary => 'T',
            Privilege::Connect => 'c',
            Privilege::Set => 's',
            Privilege::AlterSystem => 'A',
        }
    }

    pub fn from_code(code: char) -> Option<Privilege> {
        Privilege::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Lower-cased display name, used as the entitlement slug.
    pub fn slug(self) -> String {
        self.name().to_ascii_lowercase()
    }

    /// Inverse of [`slug`](Self::slug). Also accepts the display name, with
    /// `-`/`_` standing in for the space (`alter-system`, `ALTER_SYSTEM`).
    /// Double quotes are stripped first.
    pub fn from_slug(name: &str) -> Option<Privilege> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '"')
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect::<String>()
            .to_ascii_uppercase();

        Privilege::ALL
            .into_iter()
            .find(|p| p.name() == normalized)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Privilege> for PrivilegeSet {
    fn from(privilege: Privilege) -> Self {
        privilege.bit()
    }
}

impl PrivilegeSet {
    /// No privileges.
    pub const NONE: PrivilegeSet = PrivilegeSet::empty();

    /// Union with `other`. Unlike `|`, takes a single [`Privilege`] too.
    #[must_use]
    pub fn with(self, other: impl Into<PrivilegeSet>) -> PrivilegeSet {
        self | other.into()
    }

    pub fn has(self, privilege: Privilege) -> bool {
        self.contains(privilege.bit())
    }

    /// Visits each held kind in declaration order until `visit` breaks.
    pub fn range<B, F>(self, mut visit: F) -> ControlFlow<B>
    where
        F: FnMut(Privilege) -> ControlFlow<B>,
    {
        for privilege in Privilege::ALL {
            if !self.has(privilege) {
                continue;
            }
            if let ControlFlow::Break(value) = visit(privilege) {
                return ControlFlow::Break(value);
            }
        }
        ControlFlow::Continue(())
    }

    /// Held kinds in declaration order.
    pub fn privileges(self) -> impl Iterator<Item = Privilege> {
        Privilege::ALL.into_iter().filter(move |p| self.has(*p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_follow_declaration_order() {
        for (index, privilege) in Privilege::ALL.into_iter().enumerate() {
            assert_eq!(privilege.bit().bits(), 1u64 << index);
        }
        assert_eq!(Privilege::Select.bit(), PrivilegeSet::SELECT);
        assert_eq!(Privilege::AlterSystem.bit(), PrivilegeSet::ALTER_SYSTEM);
    }

    #[test]
    fn test_with_is_union() {
        let set = PrivilegeSet::SELECT.with(PrivilegeSet::INSERT | PrivilegeSet::UPDATE);
        assert_eq!(
            set,
            PrivilegeSet::SELECT | PrivilegeSet::INSERT | PrivilegeSet::UPDATE
        );
        assert_eq!(PrivilegeSet::NONE.with(PrivilegeSet::NONE), PrivilegeSet::NONE);
    }

    #[test]
    fn test_has() {
        assert!(!PrivilegeSet::NONE.has(Privilege::Select));
        assert!(PrivilegeSet::SELECT.has(Privilege::Select));
        let both = PrivilegeSet::SELECT | PrivilegeSet::INSERT;
        assert!(both.has(Privilege::Insert));
        assert!(!both.has(Privilege::Update));
    }

    #[test]
    fn test_codes_are_unique_and_invertible() {
        for privilege in Privilege::ALL {
            assert_eq!(Privilege::from_code(privilege.code()), Some(privilege));
        }
        assert_eq!(Privilege::from_code('r'), Some(Privilege::Select));
        assert_eq!(Privilege::from_code('*'), None);
        assert_eq!(Privilege::from_code('m'), None);
    }

    #[test]
    fn test_range_visits_in_order_and_short_circuits() {
        let set = PrivilegeSet::CONNECT | PrivilegeSet::INSERT | PrivilegeSet::SELECT;

        let mut seen = Vec::new();
        let flow: ControlFlow<()> = set.range(|p| {
            seen.push(p);
            ControlFlow::Continue(())
        });
        assert!(flow.is_continue());
        assert_eq!(
            seen,
            vec![Privilege::Insert, Privilege::Select, Privilege::Connect]
        );

        let mut visited = 0;
        let flow = set.range(|p| {
            visited += 1;
            if p == Privilege::Select {
                ControlFlow::Break(p)
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(flow, ControlFlow::Break(Privilege::Select));
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_names_and_slugs() {
        assert_eq!(Privilege::AlterSystem.name(), "ALTER SYSTEM");
        assert_eq!(Privilege::AlterSystem.slug(), "alter system");
        assert_eq!(Privilege::from_slug("select"), Some(Privilege::Select));
        assert_eq!(Privilege::from_slug("alter-system"), Some(Privilege::AlterSystem));
        assert_eq!(Privilege::from_slug("\"TEMPORARY\""), Some(Privilege::Temporary));
        assert_eq!(Privilege::from_slug("superuser"), None);
    }
}
