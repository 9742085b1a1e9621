//! The name registry: `"<kind> <name>"` keys mapped to types or macro
//! values, accumulated across parse calls and handed to the compiler as one
//! unit.

use std::cmp::Ordering;
use std::fmt;

use hashbrown::{HashMap, HashSet};
use log::debug;

use crate::error::DeclarationError;
use crate::model::TypeRef;
use crate::StringId;

/// The kind half of a registry key. Variant order is the deterministic
/// iteration order of the registry, matching the alphabetic order of the
/// kind names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclarationKind {
    /// Alias key for an anonymous tag reachable through a typedef, as in
    /// `anonymous foo_t`.
    Anonymous,
    Constant,
    Enum,
    Function,
    Macro,
    Struct,
    Typedef,
    Union,
    Variable,
}

impl DeclarationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Anonymous => "anonymous",
            DeclarationKind::Constant => "constant",
            DeclarationKind::Enum => "enum",
            DeclarationKind::Function => "function",
            DeclarationKind::Macro => "macro",
            DeclarationKind::Struct => "struct",
            DeclarationKind::Typedef => "typedef",
            DeclarationKind::Union => "union",
            DeclarationKind::Variable => "variable",
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclKey {
    pub kind: DeclarationKind,
    pub name: StringId,
}

impl DeclKey {
    pub fn new(kind: DeclarationKind, name: StringId) -> DeclKey {
        DeclKey { kind, name }
    }
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

impl Ord for DeclKey {
    fn cmp(&self, other: &DeclKey) -> Ordering {
        // Interned ids order by creation, so compare the spellings.
        (self.kind, self.name.as_str()).cmp(&(other.kind, other.name.as_str()))
    }
}

impl PartialOrd for DeclKey {
    fn partial_cmp(&self, other: &DeclKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclValue {
    Type(TypeRef),
    /// `#define` constant; `None` when declared with `...`.
    Macro(Option<i64>),
}

#[derive(Debug, Default)]
pub struct DeclarationRegistry {
    entries: HashMap<DeclKey, DeclValue>,
    /// Types imported from another interface rather than declared here.
    included: HashSet<TypeRef>,
}

impl DeclarationRegistry {
    pub fn new() -> DeclarationRegistry {
        DeclarationRegistry::default()
    }

    /// Register `key`. Redeclaring with an identical value is a no-op;
    /// anything else is an error unless `override_existing` replaces the
    /// previous entry wholesale.
    pub fn declare(
        &mut self,
        key: DeclKey,
        value: DeclValue,
        override_existing: bool,
    ) -> Result<(), DeclarationError> {
        if let Some(existing) = self.entries.get(&key) {
            if *existing == value {
                return Ok(());
            }
            if !override_existing {
                return Err(DeclarationError::MultipleDeclarations {
                    key: key.to_string(),
                });
            }
        }
        debug!("declare {key}");
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn lookup(&self, key: DeclKey) -> Option<DeclValue> {
        self.entries.get(&key).copied()
    }

    pub fn contains(&self, key: DeclKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// The type a typedef name resolves to, if one is registered.
    pub fn typedef(&self, name: StringId) -> Option<TypeRef> {
        match self.lookup(DeclKey::new(DeclarationKind::Typedef, name)) {
            Some(DeclValue::Type(ty)) => Some(ty),
            _ => None,
        }
    }

    pub fn typedef_names(&self) -> impl Iterator<Item = StringId> + '_ {
        self.entries.keys().filter_map(|key| {
            (key.kind == DeclarationKind::Typedef).then_some(key.name)
        })
    }

    /// All entries in deterministic order: kind first, then name.
    pub fn sorted_entries(&self) -> Vec<(DeclKey, DeclValue)> {
        let mut all: Vec<(DeclKey, DeclValue)> =
            self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark a type as imported from another interface. The compiler flags
    /// records on this list as externally owned.
    pub fn mark_included(&mut self, ty: TypeRef) {
        self.included.insert(ty);
    }

    pub fn is_included(&self, ty: TypeRef) -> bool {
        self.included.contains(&ty)
    }
}
