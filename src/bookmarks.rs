//! PDF outline (the viewer's bookmark panel) for exported reports.
//!
//! Every [`SectionMark`] becomes a top-level outline item that opens the
//! section's first page fitted to the window. The catalog is switched to
//! `/PageMode /UseOutlines` so viewers show the panel on open.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::export::{ExportedDocument, SectionMark};

#[derive(Debug, thiserror::Error)]
pub enum BookmarkError {
    #[error("failed to process PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to write PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF has no usable document catalog")]
    Catalog,

    #[error("section '{title}' starts on page {} but the document has {pages} page(s)", .page + 1)]
    PageOutOfRange {
        title: String,
        /// Zero-based page recorded for the section.
        page: usize,
        pages: usize,
    },
}

/// Returns a copy of `pdf_bytes` with one outline item per section.
///
/// No sections means no outline; the bytes are returned unchanged.
pub fn apply_section_bookmarks(
    pdf_bytes: &[u8],
    sections: &[SectionMark],
) -> Result<Vec<u8>, BookmarkError> {
    if sections.is_empty() {
        return Ok(pdf_bytes.to_vec());
    }

    let mut document = Document::load_mem(pdf_bytes)?;
    let targets = page_targets(&document, sections)?;
    let outline = write_outline(&mut document, &targets);
    attach_to_catalog(&mut document, outline)?;

    let mut bookmarked = Vec::new();
    document.save_to(&mut bookmarked)?;
    Ok(bookmarked)
}

impl ExportedDocument {
    /// Replaces the document bytes with a copy carrying the section outline.
    pub fn with_bookmarks(mut self) -> Result<Self, BookmarkError> {
        self.bytes = apply_section_bookmarks(&self.bytes, &self.sections)?;
        Ok(self)
    }
}

/// Pairs each section title with the page object it points at.
fn page_targets<'a>(
    document: &Document,
    sections: &'a [SectionMark],
) -> Result<Vec<(&'a str, ObjectId)>, BookmarkError> {
    let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
    sections
        .iter()
        .map(|section| {
            pages
                .get(section.page)
                .map(|page| (section.title.as_str(), *page))
                .ok_or_else(|| BookmarkError::PageOutOfRange {
                    title: section.title.clone(),
                    page: section.page,
                    pages: pages.len(),
                })
        })
        .collect()
}

fn write_outline(document: &mut Document, targets: &[(&str, ObjectId)]) -> ObjectId {
    let root = document.new_object_id();
    let items: Vec<ObjectId> = targets.iter().map(|_| document.new_object_id()).collect();

    for (index, (&(title, page), &item)) in targets.iter().zip(&items).enumerate() {
        let mut entry = Dictionary::new();
        entry.set("Title", Object::string_literal(title));
        entry.set("Parent", Object::Reference(root));
        entry.set(
            "Dest",
            Object::Array(vec![Object::Reference(page), Object::Name(b"Fit".to_vec())]),
        );
        if index > 0 {
            entry.set("Prev", Object::Reference(items[index - 1]));
        }
        if let Some(&next) = items.get(index + 1) {
            entry.set("Next", Object::Reference(next));
        }
        document.objects.insert(item, Object::Dictionary(entry));
    }

    let mut outlines = Dictionary::new();
    outlines.set("Type", Object::Name(b"Outlines".to_vec()));
    outlines.set("Count", Object::Integer(items.len() as i64));
    if let (Some(&first), Some(&last)) = (items.first(), items.last()) {
        outlines.set("First", Object::Reference(first));
        outlines.set("Last", Object::Reference(last));
    }
    document.objects.insert(root, Object::Dictionary(outlines));
    root
}

fn attach_to_catalog(document: &mut Document, outline: ObjectId) -> Result<(), BookmarkError> {
    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| BookmarkError::Catalog)?;
    let catalog = document
        .get_object_mut(catalog_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| BookmarkError::Catalog)?;
    catalog.set("Outlines", Object::Reference(outline));
    catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));
    Ok(())
}
