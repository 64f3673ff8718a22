//! Purpose: Internal naming conventions of a primary archive and the path math built on them.
//! Exports: `Layout`, `group_name`, `group_path`, `unit_path`.
//! Role: Single source for every prefix, suffix, and metadata key the resolver consults.
//! Invariants: Primary lookups are prefixed; subordinate lookups use bare paths.
//! Invariants: Token normalization is idempotent.

pub const DEFAULT_UNIT_PREFIX: &str = "STAF-INF/classes/";
pub const DEFAULT_BUNDLE_PREFIX: &str = "STAF-INF/jars/";
pub const MONITOR_UNIT_PREFIX: &str = "STAX-INF/classes/";
pub const UNIT_SUFFIX: &str = ".class";
pub const ARCHIVE_SUFFIX: &str = ".jar";
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const DECLARATION_SECTION: &str = "staf/service/info";
pub const LEGACY_DECLARATION_SECTION: &str = "staf/service/";
pub const DEPENDENCY_KEY: &str = "Packaged-Jars";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Layout {
    unit_prefix: String,
    bundle_prefix: String,
    unit_suffix: String,
    archive_suffix: String,
    declaration_sections: Vec<String>,
    dependency_key: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            unit_prefix: DEFAULT_UNIT_PREFIX.to_string(),
            bundle_prefix: DEFAULT_BUNDLE_PREFIX.to_string(),
            unit_suffix: UNIT_SUFFIX.to_string(),
            archive_suffix: ARCHIVE_SUFFIX.to_string(),
            declaration_sections: vec![
                DECLARATION_SECTION.to_string(),
                LEGACY_DECLARATION_SECTION.to_string(),
            ],
            dependency_key: DEPENDENCY_KEY.to_string(),
        }
    }
}

impl Layout {
    /// Layout of monitor extension archives: units live under `STAX-INF/classes/`.
    pub fn monitor_extension() -> Self {
        Self::default().with_unit_prefix(MONITOR_UNIT_PREFIX)
    }

    pub fn with_unit_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.unit_prefix = normalize_prefix(prefix.into());
        self
    }

    pub fn with_bundle_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bundle_prefix = normalize_prefix(prefix.into());
        self
    }

    pub fn unit_prefix(&self) -> &str {
        &self.unit_prefix
    }

    pub fn bundle_prefix(&self) -> &str {
        &self.bundle_prefix
    }

    pub fn declaration_sections(&self) -> &[String] {
        &self.declaration_sections
    }

    pub fn dependency_key(&self) -> &str {
        &self.dependency_key
    }

    /// Entry path of a unit inside the primary archive.
    pub fn primary_unit_path(&self, name: &str) -> String {
        format!("{}{}", self.unit_prefix, self.subordinate_unit_path(name))
    }

    /// Entry path of a unit inside a subordinate archive.
    pub fn subordinate_unit_path(&self, name: &str) -> String {
        format!("{}{}", unit_path(name), self.unit_suffix)
    }

    pub fn primary_resource_path(&self, name: &str) -> String {
        format!("{}{}", self.unit_prefix, name)
    }

    pub fn bundle_entry_path(&self, token: &str) -> String {
        format!("{}{}", self.bundle_prefix, token)
    }

    /// Appends the archive suffix unless the token already ends with it (any case).
    pub fn normalize_token(&self, token: &str) -> String {
        let suffix = self.archive_suffix.as_bytes();
        let bytes = token.as_bytes();
        let has_suffix = bytes.len() >= suffix.len()
            && bytes[bytes.len() - suffix.len()..].eq_ignore_ascii_case(suffix);
        if has_suffix {
            token.to_string()
        } else {
            format!("{token}{}", self.archive_suffix)
        }
    }
}

fn normalize_prefix(prefix: String) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// `a.b.C` becomes `a/b/C`.
pub fn unit_path(name: &str) -> String {
    name.replace('.', "/")
}

/// Logical group of a unit: everything before the last `.`; `None` for ungrouped names.
pub fn group_name(unit: &str) -> Option<&str> {
    unit.rfind('.').map(|index| &unit[..index])
}

/// Key of the manifest record scoped to a group: `a.b` becomes `a/b/`.
pub fn group_path(group: &str) -> String {
    format!("{}/", unit_path(group))
}
