//! Sections and notes for the multi-note annotation layout
//!
//! A [`SectionBook`] is an ordered list of sections, each holding an ordered
//! list of notes. After every mutation:
//! - section `order` values are exactly `0..n` matching their position
//! - note `order` values are exactly `0..m` within their section
//! - every note's `section_id` names the section that holds it
//! - at least one section exists (a fresh book starts with "General")

use crate::error::SectionError;
use crate::text::is_present;
use annotate_host::{ObjectId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Name of the section every book starts with
pub const DEFAULT_SECTION_NAME: &str = "General";

/// Section identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub String);

impl SectionId {
    /// Generate new section ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl Default for SectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Note identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub String);

impl NoteId {
    /// Generate new note ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A note bound to a canvas object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique note id
    pub id: NoteId,
    /// Short plain-text title
    pub heading: String,
    /// Opaque rich text
    pub body: String,
    /// Canvas object the note is about
    pub item_id: ObjectId,
    /// Display name of that object
    pub item_name: String,
    /// Host type of that object
    pub item_type: String,
    /// Owning section
    pub section_id: SectionId,
    /// Position within the section
    pub order: u32,
    /// Creation time (ms since epoch)
    pub created_at: i64,
    /// Last edit time (ms since epoch)
    pub updated_at: i64,
    /// Author, when known
    pub author_id: Option<UserId>,
}

impl Note {
    /// True when heading or body is non-empty after trimming
    #[must_use]
    pub fn has_content(&self) -> bool {
        is_present(&self.heading) || is_present(&self.body)
    }
}

/// Fields supplied when creating a note
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    /// Note title
    pub heading: String,
    /// Rich-text body
    pub body: String,
    /// Object the note is about
    pub item_id: ObjectId,
    /// Display name of the object
    pub item_name: String,
    /// Host type of the object
    pub item_type: String,
    /// Author, when known
    pub author_id: Option<UserId>,
}

/// A named, ordered group of notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Unique section id
    pub id: SectionId,
    /// Display name
    pub name: String,
    /// Position within the book
    pub order: u32,
    /// Notes in display order
    pub notes: Vec<Note>,
    /// Creation time (ms since epoch)
    pub created_at: i64,
    /// Last change time (ms since epoch)
    pub updated_at: i64,
}

impl Section {
    fn named(name: impl Into<String>, now: i64) -> Self {
        Self {
            id: SectionId::new(),
            name: name.into(),
            order: 0,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ordered sections of notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionBook {
    sections: Vec<Section>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_order(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

impl SectionBook {
    /// Book with a single "General" section
    #[must_use]
    pub fn new() -> Self {
        Self {
            sections: vec![Section::named(DEFAULT_SECTION_NAME, now_ms())],
        }
    }

    /// Build from decoded sections, restoring the ordering invariants
    ///
    /// Sections and notes are sorted by their stored `order` (stable, so ties
    /// keep array position) and renumbered.
    #[must_use]
    pub fn from_sections(mut sections: Vec<Section>) -> Self {
        sections.sort_by_key(|s| s.order);
        for section in &mut sections {
            section.notes.sort_by_key(|n| n.order);
        }
        let mut book = Self { sections };
        book.normalize();
        book
    }

    /// Take the sections out of the book
    #[must_use]
    pub fn into_sections(self) -> Vec<Section> {
        self.sections
    }

    /// Sections in display order
    #[inline]
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Section by id
    #[must_use]
    pub fn section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    /// Note by id
    #[must_use]
    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.sections
            .iter()
            .flat_map(|s| s.notes.iter())
            .find(|n| &n.id == id)
    }

    /// Every note bound to a canvas object, in display order
    #[must_use]
    pub fn notes_for_item(&self, item: &ObjectId) -> Vec<&Note> {
        self.sections
            .iter()
            .flat_map(|s| s.notes.iter())
            .filter(|n| &n.item_id == item)
            .collect()
    }

    /// Total number of notes
    #[must_use]
    pub fn note_count(&self) -> usize {
        self.sections.iter().map(|s| s.notes.len()).sum()
    }

    /// True when any note has content
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.sections
            .iter()
            .flat_map(|s| s.notes.iter())
            .any(Note::has_content)
    }

    /// Append a section
    ///
    /// # Errors
    /// `SectionError::EmptyName` for blank names
    pub fn add_section(&mut self, name: &str) -> Result<SectionId, SectionError> {
        let name = checked_name(name)?;
        let section = Section::named(name, now_ms());
        let id = section.id.clone();
        self.sections.push(section);
        self.normalize();
        Ok(id)
    }

    /// Rename a section
    ///
    /// # Errors
    /// `SectionError::EmptyName`, `SectionError::UnknownSection`
    pub fn rename_section(&mut self, id: &SectionId, name: &str) -> Result<(), SectionError> {
        let name = checked_name(name)?;
        let section = self.section_mut(id)?;
        section.name = name;
        section.updated_at = now_ms();
        Ok(())
    }

    /// Delete a section together with its notes
    ///
    /// Deleting the last section leaves a fresh "General" section behind.
    ///
    /// # Errors
    /// `SectionError::UnknownSection`
    pub fn delete_section(&mut self, id: &SectionId) -> Result<Section, SectionError> {
        let index = self.section_index(id)?;
        let removed = self.sections.remove(index);
        if self.sections.is_empty() {
            self.sections.push(Section::named(DEFAULT_SECTION_NAME, now_ms()));
        }
        self.normalize();
        Ok(removed)
    }

    /// Move the section at `from` so it ends up at `to`
    ///
    /// # Errors
    /// `SectionError::IndexOutOfRange`
    pub fn move_section(&mut self, from: usize, to: usize) -> Result<(), SectionError> {
        let len = self.sections.len();
        for index in [from, to] {
            if index >= len {
                return Err(SectionError::IndexOutOfRange { index, len });
            }
        }
        let section = self.sections.remove(from);
        self.sections.insert(to, section);
        self.normalize();
        Ok(())
    }

    /// Swap two sections' positions
    ///
    /// # Errors
    /// `SectionError::UnknownSection`
    pub fn swap_sections(&mut self, a: &SectionId, b: &SectionId) -> Result<(), SectionError> {
        let ia = self.section_index(a)?;
        let ib = self.section_index(b)?;
        self.sections.swap(ia, ib);
        self.normalize();
        Ok(())
    }

    /// Append a note to a section
    ///
    /// # Errors
    /// `SectionError::UnknownSection`
    pub fn add_note(&mut self, section: &SectionId, draft: NoteDraft) -> Result<NoteId, SectionError> {
        let now = now_ms();
        let target = self.section_mut(section)?;
        let note = Note {
            id: NoteId::new(),
            heading: draft.heading,
            body: draft.body,
            item_id: draft.item_id,
            item_name: draft.item_name,
            item_type: draft.item_type,
            section_id: target.id.clone(),
            order: 0,
            created_at: now,
            updated_at: now,
            author_id: draft.author_id,
        };
        let id = note.id.clone();
        target.notes.push(note);
        target.updated_at = now;
        self.normalize();
        Ok(id)
    }

    /// Replace a note's heading and body
    ///
    /// # Errors
    /// `SectionError::UnknownNote`
    pub fn update_note(&mut self, id: &NoteId, heading: &str, body: &str) -> Result<(), SectionError> {
        let note = self.note_mut(id)?;
        note.heading = heading.to_string();
        note.body = body.to_string();
        note.updated_at = now_ms();
        Ok(())
    }

    /// Delete a note
    ///
    /// # Errors
    /// `SectionError::UnknownNote`
    pub fn delete_note(&mut self, id: &NoteId) -> Result<Note, SectionError> {
        let (si, ni) = self.note_position(id)?;
        let removed = self.sections[si].notes.remove(ni);
        self.sections[si].updated_at = now_ms();
        self.normalize();
        Ok(removed)
    }

    /// Move a note into `target` at position `index`
    ///
    /// `index` may equal the target's note count to append.
    ///
    /// # Errors
    /// `SectionError::UnknownNote`, `SectionError::UnknownSection`,
    /// `SectionError::IndexOutOfRange`
    pub fn move_note(&mut self, id: &NoteId, target: &SectionId, index: usize) -> Result<(), SectionError> {
        let (si, ni) = self.note_position(id)?;
        let ti = self.section_index(target)?;
        let len = self.sections[ti].notes.len() - usize::from(si == ti);
        if index > len {
            return Err(SectionError::IndexOutOfRange { index, len });
        }
        let mut note = self.sections[si].notes.remove(ni);
        note.updated_at = now_ms();
        self.sections[ti].notes.insert(index, note);
        self.normalize();
        Ok(())
    }

    fn section_index(&self, id: &SectionId) -> Result<usize, SectionError> {
        self.sections
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| SectionError::UnknownSection(id.clone()))
    }

    fn section_mut(&mut self, id: &SectionId) -> Result<&mut Section, SectionError> {
        let index = self.section_index(id)?;
        Ok(&mut self.sections[index])
    }

    fn note_position(&self, id: &NoteId) -> Result<(usize, usize), SectionError> {
        self.sections
            .iter()
            .enumerate()
            .find_map(|(si, s)| s.notes.iter().position(|n| &n.id == id).map(|ni| (si, ni)))
            .ok_or_else(|| SectionError::UnknownNote(id.clone()))
    }

    fn note_mut(&mut self, id: &NoteId) -> Result<&mut Note, SectionError> {
        let (si, ni) = self.note_position(id)?;
        Ok(&mut self.sections[si].notes[ni])
    }

    /// Renumber orders from array positions and re-point note owners
    fn normalize(&mut self) {
        if self.sections.is_empty() {
            self.sections.push(Section::named(DEFAULT_SECTION_NAME, now_ms()));
        }
        for (si, section) in self.sections.iter_mut().enumerate() {
            section.order = to_order(si);
            for (ni, note) in section.notes.iter_mut().enumerate() {
                note.order = to_order(ni);
                note.section_id = section.id.clone();
            }
        }
    }
}

impl Default for SectionBook {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_name(name: &str) -> Result<String, SectionError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SectionError::EmptyName);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn draft(item: &str, body: &str) -> NoteDraft {
        NoteDraft {
            heading: String::new(),
            body: body.to_string(),
            item_id: ObjectId::new(item),
            item_name: "Sticky".to_string(),
            item_type: "sticky_note".to_string(),
            author_id: Some(UserId::new("u-1")),
        }
    }

    fn assert_dense(book: &SectionBook) {
        for (si, section) in book.sections().iter().enumerate() {
            assert_eq!(section.order as usize, si);
            for (ni, note) in section.notes.iter().enumerate() {
                assert_eq!(note.order as usize, ni);
                assert_eq!(note.section_id, section.id);
            }
        }
    }

    #[test]
    fn new_book_has_general_section() {
        let book = SectionBook::new();
        assert_eq!(book.sections().len(), 1);
        assert_eq!(book.sections()[0].name, DEFAULT_SECTION_NAME);
        assert!(!book.has_content());
    }

    #[test]
    fn swap_sections_swaps_orders() {
        let mut book = SectionBook::new();
        let general = book.sections()[0].id.clone();
        let ideas = book.add_section("Ideas").unwrap();

        book.swap_sections(&general, &ideas).unwrap();

        assert_eq!(book.section(&ideas).unwrap().order, 0);
        assert_eq!(book.section(&general).unwrap().order, 1);
        assert_dense(&book);
    }

    #[test]
    fn blank_section_name_rejected() {
        let mut book = SectionBook::new();
        assert_eq!(book.add_section("   "), Err(SectionError::EmptyName));
    }

    #[test]
    fn deleting_last_section_recreates_general() {
        let mut book = SectionBook::new();
        let general = book.sections()[0].id.clone();
        book.add_note(&general, draft("o-1", "hi")).unwrap();

        let removed = book.delete_section(&general).unwrap();
        assert_eq!(removed.notes.len(), 1);
        assert_eq!(book.sections().len(), 1);
        assert_eq!(book.sections()[0].name, DEFAULT_SECTION_NAME);
        assert_ne!(book.sections()[0].id, general);
        assert_eq!(book.note_count(), 0);
    }

    #[test]
    fn notes_stay_dense_after_delete() {
        let mut book = SectionBook::new();
        let general = book.sections()[0].id.clone();
        let a = book.add_note(&general, draft("o-1", "a")).unwrap();
        let _b = book.add_note(&general, draft("o-1", "b")).unwrap();
        let _c = book.add_note(&general, draft("o-2", "c")).unwrap();

        book.delete_note(&a).unwrap();
        assert_eq!(book.note_count(), 2);
        assert_dense(&book);
        assert_eq!(book.notes_for_item(&ObjectId::new("o-1")).len(), 1);
    }

    #[test]
    fn move_note_across_sections() {
        let mut book = SectionBook::new();
        let general = book.sections()[0].id.clone();
        let later = book.add_section("Later").unwrap();
        let note = book.add_note(&general, draft("o-1", "move me")).unwrap();

        book.move_note(&note, &later, 0).unwrap();

        assert_eq!(book.note(&note).unwrap().section_id, later);
        assert!(book.section(&general).unwrap().notes.is_empty());
        assert_dense(&book);
    }

    #[test]
    fn move_note_rejects_bad_index() {
        let mut book = SectionBook::new();
        let general = book.sections()[0].id.clone();
        let note = book.add_note(&general, draft("o-1", "x")).unwrap();

        let err = book.move_note(&note, &general, 1).unwrap_err();
        assert_eq!(err, SectionError::IndexOutOfRange { index: 1, len: 0 });
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut book = SectionBook::new();
        let missing = SectionId::new();
        assert_eq!(
            book.rename_section(&missing, "x"),
            Err(SectionError::UnknownSection(missing.clone()))
        );
        let note = NoteId::new();
        assert_eq!(
            book.update_note(&note, "h", "b"),
            Err(SectionError::UnknownNote(note))
        );
    }

    #[test]
    fn content_presence_uses_trimmed_fields() {
        let mut book = SectionBook::new();
        let general = book.sections()[0].id.clone();
        let note = book.add_note(&general, draft("o-1", "  ")).unwrap();
        assert!(!book.has_content());

        book.update_note(&note, "", "<p><img src=\"a.png\"></p>").unwrap();
        assert!(book.has_content());

        book.update_note(&note, " Heading ", "").unwrap();
        assert!(book.has_content());

        book.update_note(&note, " ", "\n").unwrap();
        assert!(!book.has_content());
    }

    #[test]
    fn from_sections_restores_invariants() {
        let mut book = SectionBook::new();
        let general = book.sections()[0].id.clone();
        book.add_section("Second").unwrap();
        book.add_note(&general, draft("o-1", "x")).unwrap();

        let mut raw = book.sections().to_vec();
        raw.reverse();
        raw[0].order = 7;
        raw[1].order = 3;
        raw[1].notes[0].section_id = SectionId::new();

        let restored = SectionBook::from_sections(raw);
        assert_eq!(restored.sections()[0].id, general);
        assert_dense(&restored);
    }

    proptest! {
        #[test]
        fn prop_moves_keep_orders_dense(
            extra in 1usize..6,
            moves in proptest::collection::vec((0usize..8, 0usize..8), 0..12),
        ) {
            let mut book = SectionBook::new();
            for i in 0..extra {
                book.add_section(&format!("S{i}")).unwrap();
            }
            let ids: Vec<_> = book.sections().iter().map(|s| s.id.clone()).collect();

            for (from, to) in moves {
                let _ = book.move_section(from, to);
            }

            prop_assert_eq!(book.sections().len(), extra + 1);
            for (i, section) in book.sections().iter().enumerate() {
                prop_assert_eq!(section.order as usize, i);
            }
            for id in ids {
                prop_assert!(book.section(&id).is_some());
            }
        }
    }
}
