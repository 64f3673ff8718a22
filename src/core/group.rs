//! Purpose: Build and register descriptors for logical groups of compiled units.
//! Exports: `GroupFields`, `GroupDescriptor`, `GroupRegistry`, `Registration`, `merge_fields`.
//! Role: Metadata merge engine invoked the first time a unit of a group resolves.
//! Invariants: Scoped record values win; the same layer's main record fills the gaps.
//! Invariants: A group is registered at most once; later registrations return the stored value.
//! Invariants: `seal_base` is never derived and stays `None`.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::core::archive::Layer;
use crate::core::layout::group_path;
use crate::core::manifest::Attributes;

pub const SPECIFICATION_TITLE: &str = "Specification-Title";
pub const SPECIFICATION_VERSION: &str = "Specification-Version";
pub const SPECIFICATION_VENDOR: &str = "Specification-Vendor";
pub const IMPLEMENTATION_TITLE: &str = "Implementation-Title";
pub const IMPLEMENTATION_VERSION: &str = "Implementation-Version";
pub const IMPLEMENTATION_VENDOR: &str = "Implementation-Vendor";
pub const SEALED: &str = "Sealed";

/// The seven optional group fields exactly as one metadata record states them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroupFields {
    pub spec_title: Option<String>,
    pub spec_version: Option<String>,
    pub spec_vendor: Option<String>,
    pub impl_title: Option<String>,
    pub impl_version: Option<String>,
    pub impl_vendor: Option<String>,
    pub sealed: Option<String>,
}

impl GroupFields {
    pub fn from_attributes(attrs: &Attributes) -> Self {
        let field = |key: &str| attrs.get(key).map(str::to_string);
        Self {
            spec_title: field(SPECIFICATION_TITLE),
            spec_version: field(SPECIFICATION_VERSION),
            spec_vendor: field(SPECIFICATION_VENDOR),
            impl_title: field(IMPLEMENTATION_TITLE),
            impl_version: field(IMPLEMENTATION_VERSION),
            impl_vendor: field(IMPLEMENTATION_VENDOR),
            sealed: field(SEALED),
        }
    }
}

/// Field-by-field merge: `scoped` wins, `global` fills what `scoped` leaves unset.
pub fn merge_fields(scoped: GroupFields, global: GroupFields) -> GroupFields {
    GroupFields {
        spec_title: scoped.spec_title.or(global.spec_title),
        spec_version: scoped.spec_version.or(global.spec_version),
        spec_vendor: scoped.spec_vendor.or(global.spec_vendor),
        impl_title: scoped.impl_title.or(global.impl_title),
        impl_version: scoped.impl_version.or(global.impl_version),
        impl_vendor: scoped.impl_vendor.or(global.impl_vendor),
        sealed: scoped.sealed.or(global.sealed),
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ProductInfo {
    pub title: Option<String>,
    pub version: Option<String>,
    pub vendor: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GroupDescriptor {
    pub name: String,
    pub specification: ProductInfo,
    pub implementation: ProductInfo,
    pub sealed: Option<bool>,
    /// Location sealing is anchored to. No source for it exists, so it is always `None`
    /// even for sealed groups.
    pub seal_base: Option<PathBuf>,
}

impl GroupDescriptor {
    pub fn new(name: impl Into<String>, fields: GroupFields) -> Self {
        Self {
            name: name.into(),
            specification: ProductInfo {
                title: fields.spec_title,
                version: fields.spec_version,
                vendor: fields.spec_vendor,
            },
            implementation: ProductInfo {
                title: fields.impl_title,
                version: fields.impl_version,
                vendor: fields.impl_vendor,
            },
            sealed: fields.sealed.map(|value| value.eq_ignore_ascii_case("true")),
            seal_base: None,
        }
    }

    /// Descriptor for `group` as described by the layer that supplied the unit.
    ///
    /// A layer without a manifest yields a descriptor with every field unset.
    pub fn describe(group: &str, layer: &dyn Layer) -> Self {
        let scoped = layer
            .scoped_metadata(&group_path(group))
            .map(GroupFields::from_attributes)
            .unwrap_or_default();
        let global = layer
            .global_metadata()
            .map(GroupFields::from_attributes)
            .unwrap_or_default();
        Self::new(group, merge_fields(scoped, global))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Registration {
    Defined,
    AlreadyDefined,
}

#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<GroupDescriptor>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<GroupDescriptor>> {
        let groups = self.groups.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        groups.get(name).cloned()
    }

    /// Registers `name` with the descriptor `build` produces, unless it is already known.
    ///
    /// `build` runs only for the first registration of a name.
    pub fn register_with(
        &self,
        name: &str,
        build: impl FnOnce() -> GroupDescriptor,
    ) -> (Arc<GroupDescriptor>, Registration) {
        if let Some(existing) = self.get(name) {
            return (existing, Registration::AlreadyDefined);
        }
        let mut groups = self.groups.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another reader may have registered between the two lock acquisitions.
        if let Some(existing) = groups.get(name) {
            return (Arc::clone(existing), Registration::AlreadyDefined);
        }
        let descriptor = Arc::new(build());
        groups.insert(name.to_string(), Arc::clone(&descriptor));
        (descriptor, Registration::Defined)
    }

    pub fn len(&self) -> usize {
        self.groups.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registered descriptor, ordered by group name.
    pub fn snapshot(&self) -> Vec<Arc<GroupDescriptor>> {
        let groups = self.groups.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut all: Vec<_> = groups.values().cloned().collect();
        all.sort_by(|left, right| left.name.cmp(&right.name));
        all
    }
}
