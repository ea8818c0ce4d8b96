//! Output document assembly
//!
//! Wraps a `lopdf::Document` with the handful of operations the merge
//! pipeline needs: importing pages from another document, adding image
//! pages, scaling pages and serializing the result.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::PdfToolsError;
use crate::image::RasterImage;

/// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Page boundary boxes rescaled along with the page
const PAGE_BOXES: [&[u8]; 5] = [b"MediaBox", b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox"];

/// US Letter, used when a page carries no MediaBox at all
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Load a source PDF, rejecting encrypted documents
pub fn load_source(bytes: &[u8]) -> Result<Document, PdfToolsError> {
    let doc = Document::load_mem(bytes).map_err(|e| {
        let message = e.to_string();
        if message.to_ascii_lowercase().contains("encrypt") {
            PdfToolsError::Encrypted
        } else {
            PdfToolsError::ParseError(message)
        }
    })?;

    if doc.is_encrypted() {
        return Err(PdfToolsError::Encrypted);
    }

    Ok(doc)
}

/// The document being assembled
pub struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl OutputDocument {
    /// Create an empty document with a catalog and an empty page tree
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(0)),
            ("Kids", Object::Array(vec![])),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Number of pages appended so far
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Add a page of exactly `width` x `height` points with the image
    /// stretched over the whole page
    pub fn add_image_page(
        &mut self,
        raster: RasterImage,
        width: f64,
        height: f64,
    ) -> Result<ObjectId, PdfToolsError> {
        let RasterImage {
            image, soft_mask, ..
        } = raster;

        let mut image = image;
        if let Some(mask) = soft_mask {
            let mask_id = self.doc.add_object(mask);
            image.dict.set("SMask", Object::Reference(mask_id));
        }
        let image_id = self.doc.add_object(image);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(width as f32),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(height as f32),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| PdfToolsError::OperationError(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let xobjects = Dictionary::from_iter(vec![("Im0", Object::Reference(image_id))]);
        let resources = Dictionary::from_iter(vec![("XObject", Object::Dictionary(xobjects))]);

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            ("MediaBox", box_object([0.0, 0.0, width, height])),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);
        let page_id = self.doc.add_object(page);
        self.kids.push(page_id);

        Ok(page_id)
    }

    /// Copy every page of `source` into this document, in original order
    ///
    /// The copied pages are owned by this document but not yet part of its
    /// page tree; call [`OutputDocument::append_page`] for each of them.
    pub fn import_pages(&mut self, mut source: Document) -> Result<Vec<ObjectId>, PdfToolsError> {
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();

        for &page_id in &source_pages {
            materialize_inherited(&mut source, page_id)?;
        }

        // Shift every source object id past our own to avoid collisions
        let id_offset = self.doc.max_id;
        for (old_id, object) in std::mem::take(&mut source.objects) {
            let new_id = (old_id.0 + id_offset, old_id.1);
            self.doc
                .objects
                .insert(new_id, remap_object_refs(object, id_offset));
        }
        self.doc.max_id = self.doc.max_id.max(source.max_id + id_offset);

        let imported: Vec<ObjectId> = source_pages
            .into_iter()
            .map(|(num, gen)| (num + id_offset, gen))
            .collect();

        let pages_id = self.pages_id;
        for &page_id in &imported {
            self.page_dict_mut(page_id)?
                .set("Parent", Object::Reference(pages_id));
        }

        Ok(imported)
    }

    /// Attach an imported page at the end of the page tree
    pub fn append_page(&mut self, page_id: ObjectId) {
        self.kids.push(page_id);
    }

    /// Width and height of a page's MediaBox, in points
    pub fn page_size(&self, page_id: ObjectId) -> Result<(f64, f64), PdfToolsError> {
        let page = self
            .doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|_| PdfToolsError::OperationError(format!("Page {:?} not found", page_id)))?;

        let media_box = match page.get(b"MediaBox") {
            Ok(obj) => parse_box(&self.doc, obj)?,
            Err(_) => DEFAULT_MEDIA_BOX,
        };
        Ok((media_box[2] - media_box[0], media_box[3] - media_box[1]))
    }

    /// Scale a page uniformly: its boxes, its content and its annotations
    pub fn scale_page(&mut self, page_id: ObjectId, factor: f64) -> Result<(), PdfToolsError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(PdfToolsError::OperationError(format!(
                "Invalid scale factor {}",
                factor
            )));
        }

        // Boxes and annotations may be indirect; resolve before mutating
        let mut boxes = Vec::new();
        let mut annotations = Vec::new();
        let contents;
        {
            let page = self
                .doc
                .get_object(page_id)
                .and_then(Object::as_dict)
                .map_err(|_| {
                    PdfToolsError::OperationError(format!("Page {:?} not found", page_id))
                })?;

            for key in PAGE_BOXES {
                if let Ok(obj) = page.get(key) {
                    boxes.push((key, parse_box(&self.doc, obj)?));
                }
            }
            if boxes.iter().all(|(key, _)| *key != b"MediaBox") {
                boxes.push((b"MediaBox".as_slice(), DEFAULT_MEDIA_BOX));
            }

            if let Ok(annots) = page.get(b"Annots") {
                let annots = match annots {
                    Object::Reference(id) => self.doc.get_object(*id)?,
                    other => other,
                };
                if let Ok(list) = annots.as_array() {
                    annotations = list
                        .iter()
                        .filter_map(|a| a.as_reference().ok())
                        .collect();
                }
            }

            contents = page.get(b"Contents").ok().cloned();
        }

        let f = factor as f32;
        let prefix = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(f),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(f),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
            ],
        };
        let suffix = Content {
            operations: vec![Operation::new("Q", vec![])],
        };
        let prefix_id = self.doc.add_object(Stream::new(
            Dictionary::new(),
            prefix
                .encode()
                .map_err(|e| PdfToolsError::OperationError(e.to_string()))?,
        ));
        let suffix_id = self.doc.add_object(Stream::new(
            Dictionary::new(),
            suffix
                .encode()
                .map_err(|e| PdfToolsError::OperationError(e.to_string()))?,
        ));

        let mut wrapped = vec![Object::Reference(prefix_id)];
        match contents {
            Some(Object::Reference(id)) => match self.doc.get_object(id) {
                // An indirect array of content streams
                Ok(Object::Array(parts)) => wrapped.extend(parts.iter().cloned()),
                _ => wrapped.push(Object::Reference(id)),
            },
            Some(Object::Array(parts)) => wrapped.extend(parts),
            _ => {}
        }
        wrapped.push(Object::Reference(suffix_id));

        for annot_id in annotations {
            if let Ok(Object::Dictionary(annot)) = self.doc.get_object_mut(annot_id) {
                let rect = annot
                    .get(b"Rect")
                    .and_then(Object::as_array)
                    .ok()
                    .and_then(|rect| parse_box_array(rect).ok());
                if let Some(values) = rect {
                    annot.set("Rect", box_object(values.map(|v| v * factor)));
                }
            }
        }

        let page = self.page_dict_mut(page_id)?;
        for (key, values) in boxes {
            page.set(key.to_vec(), box_object(values.map(|v| v * factor)));
        }
        page.set("Contents", Object::Array(wrapped));

        Ok(())
    }

    /// Finalize the page tree and serialize the document
    pub fn save(mut self) -> Result<Vec<u8>, PdfToolsError> {
        let kids = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        let count = self.kids.len() as i64;
        let pages = self.page_dict_mut(self.pages_id)?;
        pages.set("Kids", Object::Array(kids));
        pages.set("Count", Object::Integer(count));

        // Source catalogs and page trees are unreachable now
        self.doc.prune_objects();
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfToolsError::SerializationError(e.to_string()))?;
        Ok(buffer)
    }

    fn page_dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary, PdfToolsError> {
        self.doc
            .get_object_mut(id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| PdfToolsError::OperationError(format!("Object {:?} is not a dictionary", id)))
    }
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy attributes inherited from the page tree onto the page itself so the
/// page survives being re-parented
fn materialize_inherited(doc: &mut Document, page_id: ObjectId) -> Result<(), PdfToolsError> {
    let mut inherited = Vec::new();
    {
        let page = doc.get_object(page_id).and_then(Object::as_dict)?;
        for key in INHERITABLE {
            if page.has(key) {
                continue;
            }
            let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
            // Bounded walk; malformed files can contain parent cycles
            let mut depth = 0;
            while let Some(parent_id) = parent {
                if depth > 64 {
                    break;
                }
                depth += 1;
                let Ok(node) = doc.get_object(parent_id).and_then(Object::as_dict) else {
                    break;
                };
                if let Ok(value) = node.get(key) {
                    inherited.push((key, value.clone()));
                    break;
                }
                parent = node.get(b"Parent").and_then(Object::as_reference).ok();
            }
        }
    }

    if !inherited.is_empty() {
        let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        for (key, value) in inherited {
            page.set(key.to_vec(), value);
        }
    }
    Ok(())
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            remap_dict(&mut dict, offset);
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            remap_dict(&mut stream.dict, offset);
            Object::Stream(stream)
        }
        other => other,
    }
}

fn remap_dict(dict: &mut Dictionary, offset: u32) {
    for (_, value) in dict.iter_mut() {
        let object = std::mem::replace(value, Object::Null);
        *value = remap_object_refs(object, offset);
    }
}

/// Resolve a box entry (possibly indirect) into four numbers
fn parse_box(doc: &Document, obj: &Object) -> Result<[f64; 4], PdfToolsError> {
    let obj = match obj {
        Object::Reference(id) => doc.get_object(*id)?,
        other => other,
    };
    let array = obj
        .as_array()
        .map_err(|_| PdfToolsError::OperationError("Page box is not an array".into()))?;
    parse_box_array(array)
}

/// Parse a box array [x1, y1, x2, y2]
fn parse_box_array(array: &[Object]) -> Result<[f64; 4], PdfToolsError> {
    if array.len() != 4 {
        return Err(PdfToolsError::OperationError(
            "Page box must have 4 elements".into(),
        ));
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => {
                return Err(PdfToolsError::OperationError(format!(
                    "Page box element {} is not a number",
                    i
                )))
            }
        };
    }

    Ok(result)
}

fn box_object(values: [f64; 4]) -> Object {
    Object::Array(values.iter().map(|&v| Object::Real(v as f32)).collect())
}
