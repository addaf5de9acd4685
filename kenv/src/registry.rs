//! Registered-type capability resolution.
//!
//! The bootstrap does not own the typed-object registry of the system under
//! test; it consumes a snapshot of it. Each registered type carries an
//! explicit capability marker recorded at registration time, so resolving
//! which types support bidirectional hub/spoke conversion is a single pass
//! over the table with no runtime introspection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A fully qualified registered type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Drops the version, yielding the key convertibility is resolved by.
    pub fn group_kind(&self) -> GroupKind {
        GroupKind {
            group: self.group.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// A version-independent type identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.kind)
    }
}

/// Capabilities a registered type declares at registration time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCapabilities {
    /// The type supports bidirectional hub/spoke version conversion.
    pub hub_conversion: bool,
}

impl TypeCapabilities {
    /// Marker for a type whose versions convert losslessly both ways.
    pub fn convertible() -> Self {
        Self {
            hub_conversion: true,
        }
    }
}

/// A snapshot of the registered types the bootstrap resolves against.
///
/// Assumed internally consistent: every entry was registered with its
/// capabilities by the owning crate, so resolution cannot fail per-type.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: BTreeMap<GroupVersionKind, TypeCapabilities>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a type with default (no) capabilities.
    pub fn register(&mut self, gvk: GroupVersionKind) -> &mut Self {
        self.register_with(gvk, TypeCapabilities::default())
    }

    /// Records a type with explicit capabilities. Re-registering a type
    /// replaces its previous capabilities.
    pub fn register_with(&mut self, gvk: GroupVersionKind, caps: TypeCapabilities) -> &mut Self {
        self.types.insert(gvk, caps);
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn capabilities(&self, gvk: &GroupVersionKind) -> Option<TypeCapabilities> {
        self.types.get(gvk).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupVersionKind, &TypeCapabilities)> {
        self.types.iter()
    }
}

/// Returns the set of (group, kind) pairs whose registered type supports
/// bidirectional conversion. Computed once per registry snapshot.
pub fn convertible_group_kinds(registry: &TypeRegistry) -> BTreeSet<GroupKind> {
    registry
        .iter()
        .filter(|(_, caps)| caps.hub_conversion)
        .map(|(gvk, _)| gvk.group_kind())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convertible_group_kinds_selects_marked_types() {
        let mut registry = TypeRegistry::new();
        registry
            .register_with(
                GroupVersionKind::new("example.com", "v1", "Widget"),
                TypeCapabilities::convertible(),
            )
            .register_with(
                GroupVersionKind::new("example.com", "v2", "Widget"),
                TypeCapabilities::convertible(),
            )
            .register(GroupVersionKind::new("example.com", "v1", "Gadget"));

        let convertibles = convertible_group_kinds(&registry);
        assert_eq!(convertibles.len(), 1);
        assert!(convertibles.contains(&GroupKind::new("example.com", "Widget")));
        assert!(!convertibles.contains(&GroupKind::new("example.com", "Gadget")));
    }

    #[test]
    fn test_empty_registry_resolves_to_empty_set() {
        let registry = TypeRegistry::new();
        assert!(convertible_group_kinds(&registry).is_empty());
    }

    #[test]
    fn test_reregistration_replaces_capabilities() {
        let mut registry = TypeRegistry::new();
        let gvk = GroupVersionKind::new("example.com", "v1", "Widget");
        registry.register_with(gvk.clone(), TypeCapabilities::convertible());
        registry.register(gvk.clone());

        assert_eq!(
            registry.capabilities(&gvk),
            Some(TypeCapabilities::default())
        );
        assert!(convertible_group_kinds(&registry).is_empty());
    }
}
