// Zip fixture builders shared by the core unit tests.
use std::io::{Cursor, Write};
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::core::layout::MANIFEST_PATH;

#[derive(Default)]
pub(crate) struct ZipFixture {
    entries: Vec<(String, Vec<u8>)>,
}

impl ZipFixture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entry(mut self, name: &str, bytes: impl AsRef<[u8]>) -> Self {
        self.entries.push((name.to_string(), bytes.as_ref().to_vec()));
        self
    }

    pub(crate) fn manifest(self, text: impl AsRef<str>) -> Self {
        self.entry(MANIFEST_PATH, text.as_ref())
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in &self.entries {
            writer
                .start_file(name.as_str(), SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(bytes).expect("write entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    pub(crate) fn write_to(&self, path: &Path) {
        std::fs::write(path, self.build()).expect("write fixture");
    }
}

/// Manifest text with a main section followed by `Name:` sections.
pub(crate) fn manifest_text(main: &str, sections: &[(&str, &str)]) -> String {
    let mut text = format!("Manifest-Version: 1.0\n{main}");
    for (name, body) in sections {
        text.push_str(&format!("\nName: {name}\n{body}"));
    }
    text
}

/// Primary manifest declaring `tokens` under the current declaration section.
pub(crate) fn declaring_manifest(tokens: &str) -> String {
    let body = format!("Packaged-Jars: {tokens}\n");
    manifest_text("", &[("staf/service/info", body.as_str())])
}
