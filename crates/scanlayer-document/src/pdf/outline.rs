// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table of contents — flatten a source document's /Outlines tree into
// (level, title, page) entries and rebuild it in an output document.

use std::collections::BTreeSet;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat, dictionary};
use tracing::{debug, warn};

/// Deepest outline nesting followed when reading.
const MAX_OUTLINE_DEPTH: u32 = 32;

/// One table-of-contents row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    /// Nesting level, 1 for top-level entries.
    pub level: u32,
    /// Raw PDF text string (PDFDocEncoding or UTF-16BE with BOM), kept as-is.
    pub title: Vec<u8>,
    /// 0-based target page, if the destination could be resolved.
    pub page_index: Option<usize>,
}

impl OutlineEntry {
    pub fn new(level: u32, title: impl Into<Vec<u8>>, page_index: Option<usize>) -> Self {
        Self {
            level,
            title: title.into(),
            page_index,
        }
    }
}

/// Flatten the document outline in reading order. Returns an empty list when
/// the document has none or it is unreadable.
pub fn read_outline(document: &Document, page_ids: &[ObjectId]) -> Vec<OutlineEntry> {
    let root = document
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Outlines").ok())
        .and_then(|outlines| document.dereference(outlines).ok())
        .and_then(|(_, obj)| obj.as_dict().ok());

    let Some(root) = root else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut visited = BTreeSet::new();
    collect_items(document, root, 1, page_ids, &mut visited, &mut entries);
    debug!(entries = entries.len(), "Outline read");
    entries
}

fn collect_items(
    document: &Document,
    parent: &Dictionary,
    level: u32,
    page_ids: &[ObjectId],
    visited: &mut BTreeSet<ObjectId>,
    entries: &mut Vec<OutlineEntry>,
) {
    if level > MAX_OUTLINE_DEPTH {
        warn!(level, "Outline nested too deeply, truncating");
        return;
    }

    let mut next = parent
        .get(b"First")
        .ok()
        .and_then(|obj| obj.as_reference().ok());

    while let Some(item_id) = next {
        if !visited.insert(item_id) {
            warn!(?item_id, "Outline loops back on itself, stopping");
            break;
        }
        let Ok(item) = document.get_dictionary(item_id) else {
            break;
        };

        let title = item
            .get(b"Title")
            .ok()
            .and_then(|obj| document.dereference(obj).ok())
            .and_then(|(_, obj)| match obj {
                Object::String(bytes, _) => Some(bytes.clone()),
                _ => None,
            })
            .unwrap_or_default();

        entries.push(OutlineEntry {
            level,
            title,
            page_index: destination_page(document, item, page_ids),
        });

        collect_items(document, item, level + 1, page_ids, visited, entries);

        next = item
            .get(b"Next")
            .ok()
            .and_then(|obj| obj.as_reference().ok());
    }
}

/// Resolve an outline item's /Dest (or /A GoTo action) to a page index.
fn destination_page(document: &Document, item: &Dictionary, page_ids: &[ObjectId]) -> Option<usize> {
    let destination = match item.get(b"Dest") {
        Ok(dest) => dest,
        Err(_) => {
            let action = item
                .get(b"A")
                .ok()
                .and_then(|obj| document.dereference(obj).ok())
                .and_then(|(_, obj)| obj.as_dict().ok())?;
            if action.get(b"S").ok()?.as_name().ok()? != b"GoTo" {
                return None;
            }
            action.get(b"D").ok()?
        }
    };

    let resolved = match document.dereference(destination).ok()?.1 {
        Object::Name(name) => named_destination(document, name)?,
        other => other,
    };
    // A destination dictionary wraps the array in /D.
    let array = match resolved {
        Object::Dictionary(dict) => document.dereference(dict.get(b"D").ok()?).ok()?.1.as_array().ok()?,
        other => other.as_array().ok()?,
    };

    let page_id = array.first()?.as_reference().ok()?;
    page_ids.iter().position(|id| *id == page_id)
}

/// Look up an old-style named destination in the catalog's /Dests dictionary.
fn named_destination<'a>(document: &'a Document, name: &[u8]) -> Option<&'a Object> {
    let dests = document.catalog().ok()?.get(b"Dests").ok()?;
    let dests = document.dereference(dests).ok()?.1.as_dict().ok()?;
    let target = dests.get(name).ok()?;
    document.dereference(target).ok().map(|(_, obj)| obj)
}

// -- Writing ------------------------------------------------------------------

struct OutlineNode<'a> {
    entry: &'a OutlineEntry,
    children: Vec<OutlineNode<'a>>,
}

/// Rebuild a nested outline from flat entries. A level that jumps by more than
/// one is attached to the nearest open parent.
fn build_tree<'a>(entries: &'a [OutlineEntry], pos: &mut usize, level: u32) -> Vec<OutlineNode<'a>> {
    let mut nodes = Vec::new();
    while let Some(entry) = entries.get(*pos) {
        if entry.level.max(1) < level {
            break;
        }
        *pos += 1;
        let children = build_tree(entries, pos, level + 1);
        nodes.push(OutlineNode { entry, children });
    }
    nodes
}

/// Write `entries` into `document` as an /Outlines tree whose destinations
/// point at `page_ids`. Returns the outline root, or `None` for an empty list.
pub fn write_outline(
    document: &mut Document,
    entries: &[OutlineEntry],
    page_ids: &[ObjectId],
) -> Option<ObjectId> {
    let mut pos = 0;
    let tree = build_tree(entries, &mut pos, 1);
    if tree.is_empty() {
        return None;
    }

    let root_id = document.new_object_id();
    let (first, last, count) = write_nodes(document, &tree, root_id, page_ids);
    let mut root = dictionary! {
        "Type" => "Outlines",
        "Count" => count,
    };
    if let (Some(first), Some(last)) = (first, last) {
        root.set("First", first);
        root.set("Last", last);
    }
    document.objects.insert(root_id, Object::Dictionary(root));
    Some(root_id)
}

fn write_nodes(
    document: &mut Document,
    nodes: &[OutlineNode<'_>],
    parent_id: ObjectId,
    page_ids: &[ObjectId],
) -> (Option<ObjectId>, Option<ObjectId>, i64) {
    let ids: Vec<ObjectId> = nodes.iter().map(|_| document.new_object_id()).collect();
    let mut total: i64 = 0;

    for (i, node) in nodes.iter().enumerate() {
        let mut item = dictionary! {
            "Title" => Object::String(node.entry.title.clone(), StringFormat::Literal),
            "Parent" => parent_id,
        };
        if i > 0 {
            item.set("Prev", ids[i - 1]);
        }
        if let Some(next) = ids.get(i + 1) {
            item.set("Next", *next);
        }
        if let Some(page_id) = node.entry.page_index.and_then(|index| page_ids.get(index)) {
            item.set(
                "Dest",
                vec![Object::Reference(*page_id), Object::Name(b"Fit".to_vec())],
            );
        }

        let (first, last, count) = write_nodes(document, &node.children, ids[i], page_ids);
        if let (Some(first), Some(last)) = (first, last) {
            item.set("First", first);
            item.set("Last", last);
            item.set("Count", count);
        }

        document.objects.insert(ids[i], Object::Dictionary(item));
        total += 1 + count;
    }

    (ids.first().copied(), ids.last().copied(), total)
}
