//! Purpose: Resolve compiled units and resources across a primary archive and its subordinates.
//! Exports: `Resolver`, `LayeredResolver`, `ResolvedUnit`, `ResourceLocation`.
//! Role: The caller-facing lookup surface; owns the immutable resolution chain.
//! Invariants: Chain is `[primary, opened subordinates in declaration order]`, fixed after construction.
//! Invariants: Single lookups stop at the first layer that has the entry; later layers are not queried.
//! Invariants: Primary lookups use the layout prefix; subordinate lookups use bare paths.
//! Invariants: Only a missing unit is an error; missing resources are `None` or empty.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::archive::{Archive, Layer};
use crate::core::error::{Error, ErrorKind};
use crate::core::extract::{SubordinateOutcome, declared_subordinates, extract_subordinates};
use crate::core::group::{GroupDescriptor, GroupRegistry, Registration};
use crate::core::layout::{Layout, group_name};

/// Lookup contract shared by layered resolvers and whatever a host chains them to.
pub trait Resolver: Send + Sync {
    fn resolve_unit(&self, name: &str) -> Result<ResolvedUnit, Error>;

    fn resolve_resource(&self, name: &str) -> Option<ResourceLocation>;

    fn resolve_all_resources(&self, name: &str) -> Vec<ResourceLocation>;
}

#[derive(Clone, Debug)]
pub struct ResolvedUnit {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Chain position of the supplying layer; 0 is the primary archive.
    pub layer: usize,
    pub origin: PathBuf,
    /// `None` for units whose name has no group component.
    pub group: Option<Arc<GroupDescriptor>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ResourceLocation {
    pub archive: PathBuf,
    pub entry: String,
}

impl ResourceLocation {
    pub fn new(archive: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self {
            archive: archive.into(),
            entry: entry.into(),
        }
    }

    /// `jar:file:///<archive>!/<entry>` with `\` separators turned into `/`.
    pub fn url(&self) -> String {
        let archive = self.archive.to_string_lossy().replace('\\', "/");
        let archive = archive.trim_start_matches('/');
        format!("jar:file:///{archive}!/{}", self.entry)
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

pub struct LayeredResolver {
    layout: Layout,
    primary: Box<dyn Layer>,
    subordinates: Vec<Box<dyn Layer>>,
    declared: Vec<String>,
    outcomes: Vec<SubordinateOutcome>,
    groups: GroupRegistry,
    parent: Option<Arc<dyn Resolver>>,
}

impl LayeredResolver {
    /// Opens the primary archive at `path` and extracts its subordinates into `cache_dir`.
    ///
    /// Only a primary archive that cannot be opened is an error.
    pub fn open(
        path: impl AsRef<Path>,
        cache_dir: impl AsRef<Path>,
        layout: Layout,
    ) -> Result<Self, Error> {
        let primary = Archive::open(path)?;
        Ok(Self::from_archive(primary, cache_dir, layout))
    }

    pub fn from_archive(primary: Archive, cache_dir: impl AsRef<Path>, layout: Layout) -> Self {
        let declared = declared_subordinates(primary.manifest(), &layout);
        let extraction = extract_subordinates(&primary, cache_dir.as_ref(), &layout);
        let subordinates = extraction
            .archives
            .into_iter()
            .map(|archive| Box::new(archive) as Box<dyn Layer>)
            .collect();
        let resolver = Self {
            layout,
            primary: Box::new(primary),
            subordinates,
            declared,
            outcomes: extraction.outcomes,
            groups: GroupRegistry::new(),
            parent: None,
        };
        debug!(
            archive = %resolver.primary.origin().display(),
            chain_len = resolver.chain_len(),
            declared = resolver.declared.len(),
            "resolution chain built"
        );
        resolver
    }

    /// Assembles a chain from layers that are already open; no extraction takes place.
    pub fn from_layers(
        primary: Box<dyn Layer>,
        subordinates: Vec<Box<dyn Layer>>,
        layout: Layout,
    ) -> Self {
        Self {
            layout,
            primary,
            subordinates,
            declared: Vec::new(),
            outcomes: Vec::new(),
            groups: GroupRegistry::new(),
            parent: None,
        }
    }

    /// Consults `parent` before this resolver's own chain.
    pub fn with_parent(mut self, parent: Arc<dyn Resolver>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn chain_len(&self) -> usize {
        1 + self.subordinates.len()
    }

    /// Origins of the chain members, primary first.
    pub fn chain(&self) -> Vec<&Path> {
        self.layers().map(|layer| layer.origin()).collect()
    }

    /// Normalized subordinate tokens the primary manifest declares.
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    /// Per-token results of subordinate extraction, in declaration order.
    pub fn outcomes(&self) -> &[SubordinateOutcome] {
        &self.outcomes
    }

    pub fn group(&self, name: &str) -> Option<Arc<GroupDescriptor>> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> Vec<Arc<GroupDescriptor>> {
        self.groups.snapshot()
    }

    /// Looks a unit up in this resolver's own chain, ignoring any parent.
    pub fn find_unit(&self, name: &str) -> Result<ResolvedUnit, Error> {
        for (index, layer) in self.layers().enumerate() {
            let path = if index == 0 {
                self.layout.primary_unit_path(name)
            } else {
                self.layout.subordinate_unit_path(name)
            };
            let bytes = match layer.read_entry(&path) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    warn!(unit = %name, layer = index, error = %err, "unit read failed; trying next layer");
                    continue;
                }
            };
            debug!(unit = %name, layer = index, origin = %layer.origin().display(), "unit resolved");
            let group = self.register_group(name, &**layer);
            return Ok(ResolvedUnit {
                name: name.to_string(),
                bytes,
                layer: index,
                origin: layer.origin().to_path_buf(),
                group,
            });
        }
        Err(Error::new(ErrorKind::NotFound)
            .with_message("unit not found in any layer")
            .with_name(name)
            .with_path(self.primary.origin()))
    }

    pub fn find_resource(&self, name: &str) -> Option<ResourceLocation> {
        self.layers().enumerate().find_map(|(index, layer)| {
            let path = self.resource_path(index, name);
            layer
                .has_entry(&path)
                .then(|| ResourceLocation::new(layer.origin(), path))
        })
    }

    pub fn find_all_resources(&self, name: &str) -> Vec<ResourceLocation> {
        self.layers()
            .enumerate()
            .filter_map(|(index, layer)| {
                let path = self.resource_path(index, name);
                layer
                    .has_entry(&path)
                    .then(|| ResourceLocation::new(layer.origin(), path))
            })
            .collect()
    }

    /// Bytes of the first resource named `name`, in the same order as `resolve_resource`.
    pub fn read_resource(&self, name: &str) -> Option<Vec<u8>> {
        for (index, layer) in self.layers().enumerate() {
            let path = self.resource_path(index, name);
            match layer.read_entry(&path) {
                Ok(Some(bytes)) => return Some(bytes),
                Ok(None) => {}
                Err(err) => {
                    warn!(resource = %name, layer = index, error = %err, "resource read failed; trying next layer");
                }
            }
        }
        None
    }

    fn layers(&self) -> impl Iterator<Item = &Box<dyn Layer>> {
        std::iter::once(&self.primary).chain(self.subordinates.iter())
    }

    fn resource_path(&self, index: usize, name: &str) -> String {
        if index == 0 {
            self.layout.primary_resource_path(name)
        } else {
            name.to_string()
        }
    }

    fn register_group(&self, unit: &str, layer: &dyn Layer) -> Option<Arc<GroupDescriptor>> {
        let group = group_name(unit)?;
        let (descriptor, registration) = self
            .groups
            .register_with(group, || GroupDescriptor::describe(group, layer));
        if registration == Registration::Defined {
            debug!(group = %group, origin = %layer.origin().display(), "group defined");
        }
        Some(descriptor)
    }
}

impl Resolver for LayeredResolver {
    fn resolve_unit(&self, name: &str) -> Result<ResolvedUnit, Error> {
        if let Some(parent) = &self.parent {
            match parent.resolve_unit(name) {
                Ok(unit) => return Ok(unit),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(unit = %name, error = %err, "parent resolver failed; searching own chain");
                }
            }
        }
        self.find_unit(name)
    }

    fn resolve_resource(&self, name: &str) -> Option<ResourceLocation> {
        self.parent
            .as_ref()
            .and_then(|parent| parent.resolve_resource(name))
            .or_else(|| self.find_resource(name))
    }

    fn resolve_all_resources(&self, name: &str) -> Vec<ResourceLocation> {
        let mut locations = self
            .parent
            .as_ref()
            .map(|parent| parent.resolve_all_resources(name))
            .unwrap_or_default();
        locations.extend(self.find_all_resources(name));
        locations
    }
}

impl fmt::Debug for LayeredResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredResolver")
            .field("chain", &self.chain())
            .field("outcomes", &self.outcomes)
            .field("groups", &self.groups.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
