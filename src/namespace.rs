//! Namespace tables
//!
//! An ordered name → entry mapping used by every scope: the program-wide
//! package table (keyed by full names), class member tables and function
//! parameter lists (keyed by simple names). Tables that hold functions also
//! group overloads under their common name, so a call site can find one
//! candidate by simple name and then widen to every overload sharing it.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::program::{ClassId, FieldId, FunctionId, PackageId, ParamId};

/// Separator between a function's common name and its signature suffix
pub const DISAMBIGUATION_MARKER: char = '#';

/// Whether a query name is already a disambiguated (unique) function name
pub fn is_disambiguated(name: &str) -> bool {
    name.contains(DISAMBIGUATION_MARKER)
}

/// Entry stored in a [`NamespaceTable`]
pub trait NamespaceEntry: Clone {
    fn name(&self) -> &str;
    fn full_name(&self) -> &str;
    /// Overload-group key; `Some` only for functions
    fn common_name(&self) -> Option<&str>;
    fn is_package(&self) -> bool;
    /// Referential identity
    fn same_entry(&self, other: &Self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolTarget {
    Package(PackageId),
    Class(ClassId),
    Function(FunctionId),
    Field(FieldId),
    Param(ParamId),
}

/// Named reference to a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub full_name: String,
    pub common_name: Option<String>,
    pub target: SymbolTarget,
}

impl Symbol {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>, target: SymbolTarget) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            common_name: None,
            target,
        }
    }

    pub fn function(
        name: impl Into<String>,
        full_name: impl Into<String>,
        common_name: impl Into<String>,
        id: FunctionId,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            common_name: Some(common_name.into()),
            target: SymbolTarget::Function(id),
        }
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self.target {
            SymbolTarget::Class(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionId> {
        match self.target {
            SymbolTarget::Function(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<FieldId> {
        match self.target {
            SymbolTarget::Field(id) => Some(id),
            _ => None,
        }
    }
}

impl NamespaceEntry for Symbol {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    fn is_package(&self) -> bool {
        matches!(self.target, SymbolTarget::Package(_))
    }

    fn same_entry(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

/// Ordered symbol container with optional overload grouping
#[derive(Debug, Clone)]
pub struct NamespaceTable<T> {
    by_full_name: bool,
    map: HashMap<String, T>,
    /// Common name → all functions sharing it; `None` in full-name mode
    by_common_name: Option<HashMap<String, Vec<T>>>,
    entries: Vec<T>,
}

impl<T: NamespaceEntry> Default for NamespaceTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NamespaceEntry> NamespaceTable<T> {
    /// Table keyed by simple names, with overload grouping for functions
    pub fn new() -> Self {
        Self {
            by_full_name: false,
            map: HashMap::new(),
            by_common_name: Some(HashMap::new()),
            entries: Vec::new(),
        }
    }

    /// Table keyed by full names; never tracks overloads
    pub fn by_full_name() -> Self {
        Self {
            by_full_name: true,
            map: HashMap::new(),
            by_common_name: None,
            entries: Vec::new(),
        }
    }

    pub fn is_full_name_mode(&self) -> bool {
        self.by_full_name
    }

    fn key_of<'e>(&self, element: &'e T) -> &'e str {
        if self.by_full_name {
            element.full_name()
        } else {
            element.name()
        }
    }

    /// Insert an element under its primary key.
    ///
    /// A key already bound to a different entry is a duplicate. The only
    /// permitted re-insertion is the identical package entry, which is a
    /// silent no-op.
    pub fn add(&mut self, element: T) -> Result<()> {
        let key = self.key_of(&element).to_string();
        if let Some(existing) = self.map.get(&key) {
            if existing.is_package() && existing.same_entry(&element) {
                return Ok(());
            }
            return Err(Error::duplicate_key(key));
        }
        log::trace!("namespace add '{}'", key);
        self.map.insert(key, element.clone());

        if let (Some(groups), Some(common)) = (self.by_common_name.as_mut(), element.common_name()) {
            if !self.map.contains_key(common) {
                self.map.insert(common.to_string(), element.clone());
            }
            groups.entry(common.to_string()).or_default().push(element.clone());
        }

        debug_assert!(
            !self.entries.iter().any(|e| e.same_entry(&element)),
            "namespace entry inserted twice"
        );
        self.entries.push(element);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// All functions sharing a common name; `None` when the table never
    /// tracked functions (full-name mode)
    pub fn get_functions_by_common_name(&self, name: &str) -> Option<&[T]> {
        self.by_common_name
            .as_ref()
            .and_then(|groups| groups.get(name))
            .map(|v| v.as_slice())
    }

    /// Look a name up, widening an unqualified function hit to its whole
    /// overload set. Qualified (disambiguated) names return the single match.
    pub fn search(&self, name: &str) -> Vec<&T> {
        let Some(found) = self.map.get(name) else {
            return Vec::new();
        };
        if !is_disambiguated(name) {
            if let Some(group) = found.common_name().and_then(|c| self.get_functions_by_common_name(c)) {
                return group.iter().collect();
            }
        }
        vec![found]
    }

    /// Distinct entries in insertion order
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, id: u32) -> Symbol {
        Symbol::new(name, format!("pkg.{}", name), SymbolTarget::Class(ClassId::new(id)))
    }

    fn func(unique: &str, common: &str, id: u32) -> Symbol {
        Symbol::function(unique, format!("pkg.{}", unique), common, FunctionId::new(id))
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut table = NamespaceTable::new();
        table.add(class("A", 0)).unwrap();
        let err = table.add(class("A", 1)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref key } if key == "A"));
        // identical non-package entries are duplicates too
        assert!(table.add(class("A", 0)).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_package_reinsert_is_silent() {
        let mut table = NamespaceTable::by_full_name();
        let pkg = Symbol::new("app", "app", SymbolTarget::Package(PackageId::new(3)));
        table.add(pkg.clone()).unwrap();
        table.add(pkg).unwrap();
        assert_eq!(table.len(), 1);

        let other = Symbol::new("app", "app", SymbolTarget::Package(PackageId::new(4)));
        assert!(table.add(other).is_err());
    }

    #[test]
    fn test_full_name_mode_keys() {
        let mut table = NamespaceTable::by_full_name();
        table.add(class("A", 0)).unwrap();
        assert!(table.get("pkg.A").is_some());
        assert!(table.get("A").is_none());
        table.add(func("f#int", "f", 1)).unwrap();
        assert!(table.get_functions_by_common_name("f").is_none());
    }

    #[test]
    fn test_overload_grouping() {
        let mut table = NamespaceTable::new();
        table.add(func("f#int", "f", 0)).unwrap();
        table.add(func("f#string", "f", 1)).unwrap();

        let group = table.get_functions_by_common_name("f").unwrap();
        assert_eq!(group.len(), 2);

        let found = table.search("f");
        assert_eq!(found.len(), 2);

        let found = table.search("f#int");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_function(), Some(FunctionId::new(0)));

        assert!(table.search("g").is_empty());
        // distinct entries never include the common-name alias
        assert_eq!(table.entries().len(), 2);
    }

    #[test]
    fn test_search_non_function_returns_single() {
        let mut table = NamespaceTable::new();
        table.add(Symbol::new("x", "x", SymbolTarget::Field(FieldId::new(0)))).unwrap();
        let found = table.search("x");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_field(), Some(FieldId::new(0)));
    }
}
