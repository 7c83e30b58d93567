//! Native ACL entries (`aclitem` text) and the capability every ACL-bearing
//! catalog object provides to grant resolution.
//!
//! The textual form is `grantee=<codes>/grantor`, where each code is a
//! [`Privilege::code`] optionally followed by `*` for the grant option. An empty
//! grantee is the PUBLIC pseudo-role. Names that are not plain
//! alphanumeric/underscore identifiers are double-quoted, with embedded quotes
//! doubled, exactly as the server prints them.

use std::fmt::{self, Write};
use std::ops::ControlFlow;
use std::str::FromStr;

use crate::error::{AccessError, AccessResult};
use crate::privileges::{Privilege, PrivilegeSet};

/// One principal's recorded privileges on one object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AclEntry {
    grantee: String,
    grantor: String,
    privileges: PrivilegeSet,
    grant_privileges: PrivilegeSet,
}

impl AclEntry {
    /// Builds an entry. Grant-option privileges are folded into the held set
    /// so that `grant_privileges ⊆ privileges` always holds.
    pub fn new(
        grantee: impl Into<String>,
        grantor: impl Into<String>,
        privileges: PrivilegeSet,
        grant_privileges: PrivilegeSet,
    ) -> Self {
        Self {
            grantee: grantee.into(),
            grantor: grantor.into(),
            privileges: privileges | grant_privileges,
            grant_privileges,
        }
    }

    /// A PUBLIC entry with no grantor, used for an object's implicit defaults.
    pub fn from_privilege_sets(privileges: PrivilegeSet, grant_privileges: PrivilegeSet) -> Self {
        Self::new("", "", privileges, grant_privileges)
    }

    pub fn parse(s: &str) -> AccessResult<Self> {
        s.parse()
    }

    pub fn grantee(&self) -> &str {
        &self.grantee
    }

    /// The grantee as shown to people: `PUBLIC` for the empty grantee.
    pub fn display_grantee(&self) -> &str {
        if self.is_public() {
            "PUBLIC"
        } else {
            &self.grantee
        }
    }

    pub fn grantor(&self) -> &str {
        &self.grantor
    }

    pub fn privileges(&self) -> PrivilegeSet {
        self.privileges
    }

    pub fn grant_privileges(&self) -> PrivilegeSet {
        self.grant_privileges
    }

    pub fn is_public(&self) -> bool {
        self.grantee.is_empty()
    }

    /// Whether every privilege in `privileges` is held, and held grantable.
    pub fn check(&self, privileges: PrivilegeSet) -> (bool, bool) {
        (
            self.privileges.contains(privileges),
            self.grant_privileges.contains(privileges),
        )
    }
}

impl FromStr for AclEntry {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AccessError::MalformedAcl(s.to_string());

        let (grantee, rest) = if s.starts_with('"') {
            let (name, consumed) = read_quoted(s).ok_or_else(malformed)?;
            let rest = s[consumed..].strip_prefix('=').ok_or_else(malformed)?;
            (name, rest)
        } else {
            let (grantee, rest) = s.split_once('=').ok_or_else(malformed)?;
            (grantee.to_string(), rest)
        };

        let (codes, grantor) = if rest.ends_with('"') {
            let separator = rest.find("/\"").ok_or_else(malformed)?;
            let (name, consumed) = read_quoted(&rest[separator + 1..]).ok_or_else(malformed)?;
            if separator + 1 + consumed != rest.len() {
                return Err(malformed());
            }
            (&rest[..separator], name)
        } else {
            let (codes, grantor) = rest.rsplit_once('/').ok_or_else(malformed)?;
            (codes, grantor.to_string())
        };

        let mut privileges = PrivilegeSet::NONE;
        let mut grant_privileges = PrivilegeSet::NONE;
        let mut pending: Option<Privilege> = None;

        for c in codes.chars() {
            if c == '*' {
                let privilege = pending.take().ok_or_else(malformed)?;
                grant_privileges = grant_privileges.with(privilege);
            } else if let Some(privilege) = Privilege::from_code(c) {
                pending = Some(privilege);
                privileges = privileges.with(privilege);
            }
            // Codes this crate does not model yet are skipped and leave the
            // pending privilege in place.
        }

        Ok(AclEntry {
            grantee,
            grantor,
            privileges,
            grant_privileges,
        })
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.privileges.is_empty() {
            return Ok(());
        }

        write_identifier(f, &self.grantee)?;
        f.write_char('=')?;

        let flow = self.privileges.range(|privilege| {
            let written = f.write_char(privilege.code()).and_then(|_| {
                if self.grant_privileges.has(privilege) {
                    f.write_char('*')
                } else {
                    Ok(())
                }
            });
            match written {
                Ok(()) => ControlFlow::Continue(()),
                Err(err) => ControlFlow::Break(err),
            }
        });
        if let ControlFlow::Break(err) = flow {
            return Err(err);
        }

        f.write_char('/')?;
        write_identifier(f, &self.grantor)
    }
}

/// Reads a double-quoted identifier at the start of `s`, returning the
/// unescaped name and the number of bytes consumed.
fn read_quoted(s: &str) -> Option<(String, usize)> {
    let mut chars = s.char_indices().peekable();
    match chars.next() {
        Some((_, '"')) => {}
        _ => return None,
    }

    let mut name = String::new();
    while let Some((index, c)) = chars.next() {
        if c != '"' {
            name.push(c);
            continue;
        }
        if let Some((_, '"')) = chars.peek() {
            chars.next();
            name.push('"');
            continue;
        }
        return Some((name, index + 1));
    }
    None
}

fn needs_quoting(name: &str) -> bool {
    name.chars().any(|c| !c.is_ascii_alphanumeric() && c != '_')
}

fn write_identifier(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if !needs_quoting(name) {
        return f.write_str(name);
    }
    f.write_char('"')?;
    for c in name.chars() {
        if c == '"' {
            f.write_char('"')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

/// Capability of a catalog object that participates in grant resolution.
pub trait AclResource {
    /// OID of the owning role.
    fn owner_id(&self) -> i64;

    /// Raw ACL strings in catalog order. Empty when the catalog column is NULL.
    fn acl_entries(&self) -> &[String];

    /// Every privilege that is meaningful for this kind of object.
    fn all_privileges(&self) -> PrivilegeSet;

    /// Privileges held by every role that has no explicit entry.
    fn default_privileges(&self) -> PrivilegeSet;

    /// Parses [`acl_entries`](Self::acl_entries), failing on the first
    /// malformed entry.
    fn parse_acl_entries(&self) -> AccessResult<Vec<AclEntry>> {
        self.acl_entries()
            .iter()
            .map(|raw| AclEntry::parse(raw))
            .collect()
    }
}
