// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — assemble composed pages into a new document with `lopdf`.
//
// Pass-through pages are copied object by object from the engine's PDF and
// wrapped in a scaling transform. Recomposed pages are written directly: a
// DCT-encoded image XObject for the background and one BT/ET block of
// invisible (render mode 3) Helvetica runs on top.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, info, instrument, warn};

use super::outline::{OutlineEntry, write_outline};
use super::reader::{SourceDocument, inherited_attribute};
use super::real;
use crate::compose::{ComposedPage, ImportedPage, OutputPage};

const FONT_RESOURCE: &[u8] = b"F1";
const IMAGE_RESOURCE: &[u8] = b"Im0";
/// Text rendering mode 3: neither fill nor stroke.
const INVISIBLE_TEXT: i64 = 3;

/// A PDF under construction.
///
/// `Document::with_version` gives an empty object table, so the catalog and
/// page tree are created here and pages are appended to `/Kids` as they arrive.
pub struct OutputDocument {
    document: Document,
    pages_id: ObjectId,
    catalog_id: ObjectId,
    page_ids: Vec<ObjectId>,
    font_id: Option<ObjectId>,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDocument {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        document.trailer.set("Root", catalog_id);

        Self {
            document,
            pages_id,
            catalog_id,
            page_ids: Vec::new(),
            font_id: None,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Append a composed page. Returns the new page's object id.
    #[instrument(skip_all, fields(index = self.page_ids.len()))]
    pub fn add_page(&mut self, page: ComposedPage) -> Result<ObjectId> {
        let size = page.size();
        debug!(width = size.width, height = size.height, "Adding page");
        let page_id = match page {
            ComposedPage::PassThrough(imported) => self.add_imported_page(imported)?,
            ComposedPage::Recomposed(output) => self.add_recomposed_page(output)?,
        };
        self.attach(page_id)?;
        Ok(page_id)
    }

    /// Copy the source's /Info dictionary.
    pub fn copy_metadata(&mut self, source: &SourceDocument) {
        let Some(info) = source.metadata() else {
            return;
        };
        let mut importer = ObjectImporter::new(source.document());
        let info = importer.import_dictionary(&mut self.document, info);
        let info_id = self.document.add_object(info);
        self.document.trailer.set("Info", info_id);
    }

    /// Rebuild a table of contents over the pages added so far. Entries whose
    /// page is not in this document lose their destination but keep their place.
    pub fn copy_outline(&mut self, entries: &[OutlineEntry]) -> Result<()> {
        let Some(root_id) = write_outline(&mut self.document, entries, &self.page_ids) else {
            return Ok(());
        };
        let catalog = self.catalog_mut()?;
        catalog.set("Outlines", root_id);
        catalog.set("PageMode", "UseOutlines");
        Ok(())
    }

    /// Serialise to memory.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.finish();
        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to serialise output PDF: {}", err))
        })?;
        Ok(output)
    }

    /// Write to `path` through a temporary file in the same directory, so
    /// `path` either keeps its old contents or holds the complete document.
    #[instrument(skip(self), fields(path = %path.display(), pages = self.page_ids.len()))]
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.finish();
        let directory = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(directory)?;
        self.document.save_to(temp.as_file_mut()).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to write {}: {}", path.display(), err))
        })?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|err| ScanlayerError::Io(err.error))?;
        info!("Output PDF saved");
        Ok(())
    }

    // -- Helpers --------------------------------------------------------------

    fn finish(&mut self) {
        self.document.prune_objects();
        self.document.compress();
    }

    fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        self.document
            .get_object_mut(self.catalog_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| ScanlayerError::PdfError(format!("output catalog missing: {}", err)))
    }

    fn attach(&mut self, page_id: ObjectId) -> Result<()> {
        let pages = self
            .document
            .get_object_mut(self.pages_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| ScanlayerError::PdfError(format!("output page tree missing: {}", err)))?;
        if let Ok(Object::Array(kids)) = pages.get_mut(b"Kids") {
            kids.push(Object::Reference(page_id));
        }
        self.page_ids.push(page_id);
        pages.set("Count", self.page_ids.len() as i64);
        Ok(())
    }

    fn font(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = self.document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        id
    }

    fn add_content(&mut self, operations: Vec<Operation>) -> Result<ObjectId> {
        let content = Content { operations };
        let bytes = content.encode().map_err(|err| {
            ScanlayerError::PdfError(format!("failed to encode content stream: {}", err))
        })?;
        Ok(self.document.add_object(Stream::new(Dictionary::new(), bytes)))
    }

    fn add_imported_page(&mut self, page: ImportedPage) -> Result<ObjectId> {
        let ImportedPage {
            document: source,
            page_id: source_page,
            media_box,
            scale,
            size,
        } = page;
        let mut importer = ObjectImporter::new(&source);

        let resources = inherited_attribute(&source, source_page, b"Resources")
            .map(|obj| importer.import(&mut self.document, obj))
            .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));

        let mut contents = vec![Object::Reference(self.add_content(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(scale),
                    real(0.0),
                    real(0.0),
                    real(scale),
                    real(-media_box[0] * scale),
                    real(-media_box[1] * scale),
                ],
            ),
        ])?)];
        let page_dict = source
            .get_dictionary(source_page)
            .map_err(|err| ScanlayerError::CompositeError(format!("OCR page unreadable: {}", err)))?;
        match page_dict.get(b"Contents") {
            Ok(Object::Array(items)) => {
                for item in items {
                    contents.push(importer.import(&mut self.document, item));
                }
            }
            Ok(item) => contents.push(importer.import(&mut self.document, item)),
            Err(_) => warn!("OCR page has no content stream"),
        }
        contents.push(Object::Reference(
            self.add_content(vec![Operation::new("Q", vec![])])?,
        ));

        debug!(scale, imported_objects = importer.imported(), "Pass-through page added");
        Ok(self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(size.width), real(size.height)],
            "Resources" => resources,
            "Contents" => contents,
        }))
    }

    fn add_recomposed_page(&mut self, page: OutputPage) -> Result<ObjectId> {
        let background = &page.background;
        let image_id = self.document.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => background.width as i64,
                    "Height" => background.height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                background.data.clone(),
            )
            .with_compression(false),
        );
        let font_id = self.font();

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(page.size.width),
                    real(0.0),
                    real(0.0),
                    real(page.size.height),
                    real(0.0),
                    real(0.0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.to_vec())]),
            Operation::new("Q", vec![]),
        ];

        if !page.text_layer.is_empty() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tr", vec![Object::Integer(INVISIBLE_TEXT)]));
            for run in &page.text_layer {
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(FONT_RESOURCE.to_vec()), real(run.span.font_size)],
                ));
                operations.push(Operation::new("Tz", vec![real(run.horizontal_scale)]));
                operations.push(Operation::new(
                    "Tm",
                    vec![
                        real(1.0),
                        real(0.0),
                        real(0.0),
                        real(1.0),
                        real(run.span.x),
                        real(run.span.y),
                    ],
                ));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(run.encoded.clone(), StringFormat::Literal)],
                ));
            }
            operations.push(Operation::new("ET", vec![]));
        }
        let content_id = self.add_content(operations)?;

        debug!(runs = page.text_layer.len(), "Recomposed page added");
        Ok(self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(page.size.width), real(page.size.height)],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        }))
    }
}

/// Copies objects from one document into another, giving each source object
/// exactly one copy so shared resources stay shared and cycles terminate.
struct ObjectImporter<'a> {
    source: &'a Document,
    copied: BTreeMap<ObjectId, ObjectId>,
}

impl<'a> ObjectImporter<'a> {
    fn new(source: &'a Document) -> Self {
        Self {
            source,
            copied: BTreeMap::new(),
        }
    }

    fn imported(&self) -> usize {
        self.copied.len()
    }

    fn import(&mut self, target: &mut Document, object: &Object) -> Object {
        match object {
            Object::Reference(id) => Object::Reference(self.import_reference(target, *id)),
            Object::Dictionary(dict) => Object::Dictionary(self.import_dictionary(target, dict)),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.import(target, item)).collect())
            }
            Object::Stream(stream) => {
                let dict = self.import_dictionary(target, &stream.dict);
                let mut copy = Stream::new(dict, stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    /// Page-tree back links are dropped; the writer sets its own. Any other
    /// /Parent (form fields, outline items) is copied like any other key.
    fn import_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Dictionary {
        let page_tree_node = matches!(
            dict.get(b"Type").and_then(Object::as_name),
            Ok(b"Page") | Ok(b"Pages")
        );
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if page_tree_node && key.as_slice() == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.import(target, value));
        }
        copy
    }

    fn import_reference(&mut self, target: &mut Document, id: ObjectId) -> ObjectId {
        if let Some(copied) = self.copied.get(&id) {
            return *copied;
        }
        let new_id = target.new_object_id();
        self.copied.insert(id, new_id);
        let object = match self.source.get_object(id) {
            Ok(object) => self.import(target, object),
            Err(err) => {
                warn!(?id, %err, "Cannot resolve reference, using Null");
                Object::Null
            }
        };
        target.objects.insert(new_id, object);
        new_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{InvisibleRun, JpegBackground};
    use crate::testing::{PageFixture, PdfFixture, ocr_page_pdf};
    use scanlayer_core::{PageSize, PlacedSpan};

    fn recomposed(width: f64, height: f64, text: &str) -> ComposedPage {
        let jpeg = crate::image::processor::ImageProcessor::from_rgb(image::RgbImage::from_pixel(
            8,
            8,
            image::Rgb([255, 255, 255]),
        ))
        .to_jpeg_bytes(75)
        .unwrap();
        ComposedPage::Recomposed(OutputPage {
            size: PageSize::new(width, height),
            background: JpegBackground {
                data: jpeg,
                width: 8,
                height: 8,
            },
            text_layer: vec![InvisibleRun {
                span: PlacedSpan {
                    text: text.to_string(),
                    x: 72.0,
                    y: 700.0,
                    width: 200.0,
                    height: 14.0,
                    font_size: 12.0,
                },
                encoded: text.as_bytes().to_vec(),
                horizontal_scale: 100.0,
            }],
            skipped_spans: 0,
        })
    }

    fn imported(page_size: PageSize, engine_w: f64, engine_h: f64) -> ComposedPage {
        let document = Document::load_mem(&ocr_page_pdf(engine_w, engine_h, "Engine text")).unwrap();
        let page_id = *document.get_pages().values().next().unwrap();
        ComposedPage::PassThrough(ImportedPage {
            document,
            page_id,
            media_box: [0.0, 0.0, engine_w, engine_h],
            scale: page_size.width / engine_w,
            size: page_size,
        })
    }

    #[test]
    fn recomposed_page_has_searchable_text() {
        let mut output = OutputDocument::new();
        output.add_page(recomposed(595.0, 842.0, "Invoice 2024")).unwrap();
        let bytes = output.to_bytes().unwrap();

        let source = SourceDocument::from_bytes(&bytes).unwrap();
        assert_eq!(source.page_count(), 1);
        assert_eq!(source.page(0).unwrap().size, PageSize::new(595.0, 842.0));
        assert!(source.page_text(0).unwrap().contains("Invoice 2024"));
    }

    #[test]
    fn recomposed_text_is_invisible() {
        let mut output = OutputDocument::new();
        let page_id = output.add_page(recomposed(595.0, 842.0, "hidden")).unwrap();
        let content = output.document().get_and_decode_page_content(page_id).unwrap();
        let tr = content
            .operations
            .iter()
            .find(|op| op.operator == "Tr")
            .expect("render mode set");
        assert_eq!(tr.operands, vec![Object::Integer(3)]);
    }

    #[test]
    fn pass_through_page_is_scaled_to_original_size() {
        let mut output = OutputDocument::new();
        output
            .add_page(imported(PageSize::new(595.0, 842.0), 1190.0, 1684.0))
            .unwrap();
        let bytes = output.to_bytes().unwrap();

        let source = SourceDocument::from_bytes(&bytes).unwrap();
        let page = source.page(0).unwrap();
        assert_eq!(page.size, PageSize::new(595.0, 842.0));
        assert_eq!(page.rotation, 0);
        assert!(source.page_text(0).unwrap().contains("Engine text"));

        let content = source
            .document()
            .get_and_decode_page_content(page.object_id)
            .unwrap();
        let cm = content.operations.iter().find(|op| op.operator == "cm").unwrap();
        assert_eq!(cm.operands[0].as_float().unwrap(), 0.5);
    }

    #[test]
    fn pages_keep_insertion_order() {
        let mut output = OutputDocument::new();
        output.add_page(recomposed(100.0, 100.0, "one")).unwrap();
        output
            .add_page(imported(PageSize::new(200.0, 200.0), 200.0, 200.0))
            .unwrap();
        output.add_page(recomposed(300.0, 300.0, "three")).unwrap();
        let bytes = output.to_bytes().unwrap();

        let source = SourceDocument::from_bytes(&bytes).unwrap();
        let widths: Vec<f64> = (0..3).map(|i| source.page(i).unwrap().size.width).collect();
        assert_eq!(widths, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn metadata_and_outline_are_carried_over() {
        let source_bytes = PdfFixture::new()
            .title("Annual report")
            .page(PageFixture::blank(100.0, 100.0))
            .page(PageFixture::blank(100.0, 100.0))
            .outline(vec![
                OutlineEntry::new(1, "Intro", Some(0)),
                OutlineEntry::new(1, "Numbers", Some(1)),
            ])
            .to_bytes();
        let source = SourceDocument::from_bytes(&source_bytes).unwrap();

        let mut output = OutputDocument::new();
        output.add_page(recomposed(100.0, 100.0, "a")).unwrap();
        output.add_page(recomposed(100.0, 100.0, "b")).unwrap();
        output.copy_metadata(&source);
        output.copy_outline(&source.outline()).unwrap();
        let bytes = output.to_bytes().unwrap();

        let result = SourceDocument::from_bytes(&bytes).unwrap();
        let title = result.metadata().unwrap().get(b"Title").unwrap();
        assert_eq!(title.as_str().unwrap(), b"Annual report");
        assert_eq!(result.outline(), source.outline());
    }

    #[test]
    fn importer_keeps_non_page_parent_links() {
        let mut source = Document::with_version("1.7");
        let field_id = source.add_object(dictionary! { "T" => Object::string_literal("group") });
        let widget = dictionary! {
            "Subtype" => "Widget",
            "Parent" => field_id,
        };
        let pages_id = source.add_object(dictionary! { "Type" => "Pages" });
        let page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        };

        let mut target = Document::with_version("1.7");
        let mut importer = ObjectImporter::new(&source);
        let widget_copy = importer.import_dictionary(&mut target, &widget);
        let page_copy = importer.import_dictionary(&mut target, &page);

        let parent = widget_copy.get(b"Parent").unwrap().as_reference().unwrap();
        let field = target.get_dictionary(parent).unwrap();
        assert_eq!(field.get(b"T").unwrap().as_str().unwrap(), b"group");
        assert!(page_copy.get(b"Parent").is_err());
        assert_eq!(importer.imported(), 1);
    }

    #[test]
    fn save_replaces_target_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"old contents").unwrap();

        let mut output = OutputDocument::new();
        output.add_page(recomposed(100.0, 100.0, "new")).unwrap();
        output.save(&path).unwrap();

        let saved = SourceDocument::open(&path).unwrap();
        assert_eq!(saved.page_count(), 1);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
