//! Section-level editing of a decoded binary.
//!
//! Untouched sections are copied byte for byte; edited sections are replaced
//! with new contents. Vector sections can have entries appended or prepended
//! without re-encoding the entries already there, which keeps every existing
//! index stable.

use std::borrow::Cow;

use wasm_encoder::{Encode, RawSection, SectionId};

use wasm_bundle_common::BundleError;

use crate::decoder::DecodedModule;

/// Known sections, in the order they must appear in a module.
const SECTION_ORDER: [(SectionId, &str); 13] = [
    (SectionId::Type, "type"),
    (SectionId::Import, "import"),
    (SectionId::Function, "function"),
    (SectionId::Table, "table"),
    (SectionId::Memory, "memory"),
    (SectionId::Tag, "tag"),
    (SectionId::Global, "global"),
    (SectionId::Export, "export"),
    (SectionId::Start, "start"),
    (SectionId::Element, "element"),
    (SectionId::DataCount, "data count"),
    (SectionId::Code, "code"),
    (SectionId::Data, "data"),
];

fn rank(id: u8) -> Option<usize> {
    SECTION_ORDER.iter().position(|(s, _)| *s as u8 == id)
}

pub(crate) fn section_name(id: SectionId) -> &'static str {
    rank(id as u8).map_or("custom", |i| SECTION_ORDER[i].1)
}

/// Read an unsigned LEB128 `u32`, returning the value and its encoded length.
pub(crate) fn read_var_u32(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (i, byte) in bytes.iter().take(5).enumerate() {
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Bytes following a length-prefixed name at the start of `entry`.
pub(crate) fn skip_name(entry: &[u8]) -> Option<&[u8]> {
    let (len, prefix) = read_var_u32(entry)?;
    let end = prefix.checked_add(usize::try_from(len).ok()?)?;
    entry.get(end..)
}

/// Encoded entries of a vector section, without the leading count.
#[derive(Debug, Clone, Default)]
pub(crate) struct Entries {
    count: u32,
    bytes: Vec<u8>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: &[u8]) {
        self.count += 1;
        self.bytes.extend_from_slice(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Entries of a section built with `wasm-encoder`.
    pub fn from_encoded(section: &impl Encode) -> Result<Self, BundleError> {
        let mut buf = Vec::new();
        section.encode(&mut buf);

        let malformed = || BundleError::malformed("encoded", "missing size or count prefix");
        let (_, size_len) = read_var_u32(&buf).ok_or_else(malformed)?;
        let rest = &buf[size_len..];
        let (count, count_len) = read_var_u32(rest).ok_or_else(malformed)?;

        Ok(Self {
            count,
            bytes: rest[count_len..].to_vec(),
        })
    }

    fn into_vector(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + 5);
        self.count.encode(&mut out);
        out.extend_from_slice(&self.bytes);
        out
    }
}

struct EditedSection<'a> {
    id: u8,
    contents: Cow<'a, [u8]>,
}

/// Rewrites a module section by section.
pub(crate) struct SectionEditor<'a> {
    sections: Vec<EditedSection<'a>>,
}

impl<'a> SectionEditor<'a> {
    /// Start editing `bytes`, which `module` was decoded from.
    pub fn new(bytes: &'a [u8], module: &DecodedModule) -> Self {
        let sections = module
            .sections
            .iter()
            .map(|span| EditedSection {
                id: span.id,
                contents: Cow::Borrowed(&bytes[span.range.clone()]),
            })
            .collect();
        Self { sections }
    }

    fn position(&self, id: SectionId) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id as u8)
    }

    pub fn contents(&self, id: SectionId) -> Option<&[u8]> {
        self.position(id).map(|i| self.sections[i].contents.as_ref())
    }

    /// Remove a section. Returns `false` if it was not present.
    pub fn remove(&mut self, id: SectionId) -> bool {
        match self.position(id) {
            Some(i) => {
                self.sections.remove(i);
                true
            }
            None => false,
        }
    }

    /// Replace a section's contents, inserting it at its canonical position
    /// if the module does not have it yet.
    pub fn replace(&mut self, id: SectionId, contents: Vec<u8>) {
        if let Some(i) = self.position(id) {
            self.sections[i].contents = Cow::Owned(contents);
            return;
        }

        let at = self.insert_position(id as u8);
        self.sections.insert(
            at,
            EditedSection {
                id: id as u8,
                contents: Cow::Owned(contents),
            },
        );
    }

    /// Replace a vector section's entries; an empty vector drops the section.
    pub fn replace_entries(&mut self, id: SectionId, entries: Entries) {
        if entries.is_empty() {
            self.remove(id);
        } else {
            self.replace(id, entries.into_vector());
        }
    }

    /// Add entries after the existing ones.
    pub fn append_entries(&mut self, id: SectionId, entries: Entries) -> Result<(), BundleError> {
        self.merge_entries(id, entries, false)
    }

    /// Add entries before the existing ones.
    pub fn prepend_entries(&mut self, id: SectionId, entries: Entries) -> Result<(), BundleError> {
        self.merge_entries(id, entries, true)
    }

    fn merge_entries(
        &mut self,
        id: SectionId,
        entries: Entries,
        front: bool,
    ) -> Result<(), BundleError> {
        let merged = match self.contents(id) {
            Some(contents) => {
                let (count, prefix) = read_var_u32(contents).ok_or_else(|| {
                    BundleError::malformed(section_name(id), "missing entry count")
                })?;
                let existing = &contents[prefix..];
                let count = count.checked_add(entries.count).ok_or_else(|| {
                    BundleError::malformed(section_name(id), "too many entries")
                })?;

                let mut bytes = Vec::with_capacity(existing.len() + entries.bytes.len());
                if front {
                    bytes.extend_from_slice(&entries.bytes);
                    bytes.extend_from_slice(existing);
                } else {
                    bytes.extend_from_slice(existing);
                    bytes.extend_from_slice(&entries.bytes);
                }
                Entries { count, bytes }
            }
            None => entries,
        };

        self.replace(id, merged.into_vector());
        Ok(())
    }

    fn insert_position(&self, id: u8) -> usize {
        let target = rank(id);
        let preceding = self
            .sections
            .iter()
            .rposition(|s| matches!((rank(s.id), target), (Some(r), Some(t)) if r < t));

        match preceding {
            Some(i) => i + 1,
            None => self
                .sections
                .iter()
                .position(|s| rank(s.id).is_some())
                .unwrap_or(self.sections.len()),
        }
    }

    /// Encode the edited module.
    pub fn finish(self) -> Vec<u8> {
        let mut module = wasm_encoder::Module::new();
        for section in &self.sections {
            module.section(&RawSection {
                id: section.id,
                data: section.contents.as_ref(),
            });
        }
        module.finish()
    }
}
