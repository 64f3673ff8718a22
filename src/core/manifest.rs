//! Purpose: Parse archive manifests into a main record plus named, path-scoped records.
//! Exports: `Manifest`, `Attributes`.
//! Role: Metadata source for subordinate discovery and group descriptors.
//! Invariants: Attribute keys compare ASCII-case-insensitively; section names compare exactly.
//! Invariants: Any format violation rejects the whole manifest with `ErrorKind::Corrupt`.
use crate::core::error::{Error, ErrorKind};

const NAME_KEY: &str = "Name";

/// One key/value record: the main section or a named section of a manifest.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces a value; the key keeps its first-seen position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&key))
        {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Manifest {
    main: Attributes,
    sections: Vec<(String, Attributes)>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("manifest is not valid utf-8")
                .with_source(err)
        })?;

        let mut manifest = Manifest::default();
        // None while reading the main section; Some(index) once inside a named section.
        let mut current: Option<usize> = None;
        // True between a blank line and the first header of the next section.
        let mut awaiting_section = false;
        // Header whose value may still grow through continuation lines.
        let mut pending: Option<(String, String)> = None;

        for (line_no, line) in split_lines(text).enumerate() {
            let line_no = line_no + 1;
            if line.is_empty() {
                manifest.store(current, pending.take());
                awaiting_section = true;
                continue;
            }

            if let Some(continuation) = line.strip_prefix(' ') {
                match pending.as_mut() {
                    Some((_, value)) => value.push_str(continuation),
                    None => return Err(corrupt(line_no, "continuation line without a header")),
                }
                continue;
            }

            manifest.store(current, pending.take());
            let (key, value) =
                parse_header(line).ok_or_else(|| corrupt(line_no, "invalid header field"))?;

            if awaiting_section {
                if !key.eq_ignore_ascii_case(NAME_KEY) {
                    return Err(corrupt(line_no, "section does not start with Name"));
                }
                manifest.sections.push((String::new(), Attributes::new()));
                current = Some(manifest.sections.len() - 1);
                awaiting_section = false;
            }
            pending = Some((key.to_string(), value.to_string()));
        }
        manifest.store(current, pending.take());

        manifest.merge_repeated_sections();
        Ok(manifest)
    }

    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    /// Record scoped to `name` (an internal path prefix such as `pkg/util/`).
    pub fn section(&self, name: &str) -> Option<&Attributes> {
        self.sections
            .iter()
            .find(|(section, _)| section == name)
            .map(|(_, attrs)| attrs)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    // Commits a fully continued header; the opening `Name` of a section also names it.
    fn store(&mut self, section: Option<usize>, header: Option<(String, String)>) {
        let Some((key, value)) = header else {
            return;
        };
        match section {
            Some(index) => {
                let (name, attrs) = &mut self.sections[index];
                if attrs.is_empty() && key.eq_ignore_ascii_case(NAME_KEY) {
                    *name = value.clone();
                }
                attrs.insert(key, value);
            }
            None => self.main.insert(key, value),
        }
    }

    fn merge_repeated_sections(&mut self) {
        let mut merged: Vec<(String, Attributes)> = Vec::with_capacity(self.sections.len());
        for (name, attrs) in self.sections.drain(..) {
            match merged.iter_mut().find(|(existing, _)| *existing == name) {
                Some((_, target)) => {
                    for (key, value) in attrs.iter() {
                        target.insert(key, value);
                    }
                }
                None => merged.push((name, attrs)),
            }
        }
        self.sections = merged;
    }
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(['\r', '\n']) {
            Some(index) => {
                let line = &rest[..index];
                let skip = if rest[index..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[index + skip..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}

fn parse_header(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(": ")?;
    let valid_key = !key.is_empty()
        && key
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    valid_key.then_some((key, value))
}

fn corrupt(line_no: usize, message: &str) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(format!("manifest line {line_no}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::Manifest;
    use crate::core::error::ErrorKind;

    #[test]
    fn parses_main_and_named_sections() {
        let text = "Manifest-Version: 1.0\r\n\
                    Implementation-Title: Widgets\r\n\
                    \r\n\
                    Name: staf/service/info\r\n\
                    Packaged-Jars: alpha beta\r\n\
                    \r\n\
                    Name: pkg/util/\r\n\
                    Specification-Title: Util\r\n";
        let manifest = Manifest::parse(text.as_bytes()).expect("parse");

        assert_eq!(manifest.main_attributes().get("Manifest-Version"), Some("1.0"));
        assert_eq!(
            manifest.main_attributes().get("implementation-title"),
            Some("Widgets")
        );
        let info = manifest.section("staf/service/info").expect("info section");
        assert_eq!(info.get("Packaged-Jars"), Some("alpha beta"));
        assert_eq!(
            manifest.section("pkg/util/").and_then(|attrs| attrs.get("Specification-Title")),
            Some("Util")
        );
        assert!(manifest.section("pkg/").is_none());
        assert_eq!(
            manifest.section_names().collect::<Vec<_>>(),
            vec!["staf/service/info", "pkg/util/"]
        );
    }

    #[test]
    fn continuation_lines_extend_values() {
        let text = "Manifest-Version: 1.0\n\nName: staf/service/\nPackaged-Jars: one two thr\n ee four\n";
        let manifest = Manifest::parse(text.as_bytes()).expect("parse");
        assert_eq!(
            manifest
                .section("staf/service/")
                .and_then(|attrs| attrs.get("Packaged-Jars")),
            Some("one two three four")
        );
    }

    #[test]
    fn continued_section_name_is_joined() {
        let text = "Manifest-Version: 1.0\n\nName: com/example/very/long/pack\n age/\nSealed: true\n";
        let manifest = Manifest::parse(text.as_bytes()).expect("parse");
        let attrs = manifest
            .section("com/example/very/long/package/")
            .expect("joined section name");
        assert_eq!(attrs.get("Sealed"), Some("true"));
    }

    #[test]
    fn repeated_keys_and_sections_merge() {
        let text = "Manifest-Version: 1.0\nX-Flag: old\nx-flag: new\n\n\
                    Name: pkg/\nA: 1\n\nName: pkg/\nB: 2\nA: 3\n";
        let manifest = Manifest::parse(text.as_bytes()).expect("parse");
        assert_eq!(manifest.main_attributes().get("X-Flag"), Some("new"));
        assert_eq!(manifest.main_attributes().len(), 2);
        let pkg = manifest.section("pkg/").expect("pkg section");
        assert_eq!(pkg.get("A"), Some("3"));
        assert_eq!(pkg.get("B"), Some("2"));
        assert_eq!(manifest.section_names().count(), 1);
    }

    #[test]
    fn continuation_extends_the_repeated_key_it_follows() {
        let text = "Manifest-Version: 1.0\n\nName: staf/service/info\nPackaged-Jars: old\n\
                    Service-Class: Demo\nPackaged-Jars: alpha be\n ta\n";
        let manifest = Manifest::parse(text.as_bytes()).expect("parse");
        let info = manifest.section("staf/service/info").expect("info section");
        assert_eq!(info.get("Packaged-Jars"), Some("alpha beta"));
        assert_eq!(info.get("Service-Class"), Some("Demo"));
        assert_eq!(info.len(), 3);
    }

    #[test]
    fn malformed_manifests_are_rejected() {
        let cases: [&[u8]; 5] = [
            b"Manifest-Version 1.0\n",
            b"Manifest-Version: 1.0\n\nSealed: true\n",
            b" orphan continuation\n",
            b"Bad Key: value\n",
            b"Manifest-Version: \xff\n",
        ];
        for case in cases {
            let err = Manifest::parse(case).expect_err("malformed");
            assert_eq!(err.kind(), ErrorKind::Corrupt);
        }
    }

    #[test]
    fn empty_manifest_has_empty_main_section() {
        let manifest = Manifest::parse(b"").expect("parse");
        assert!(manifest.main_attributes().is_empty());
        assert_eq!(manifest.section_names().count(), 0);
    }

    #[test]
    fn extra_blank_lines_between_sections_are_allowed() {
        let text = "Manifest-Version: 1.0\n\n\n\nName: pkg/\nA: 1\n\n";
        let manifest = Manifest::parse(text.as_bytes()).expect("parse");
        assert!(manifest.has_section("pkg/"));
    }
}
