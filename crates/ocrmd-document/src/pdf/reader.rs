// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open scanned-book PDFs and pull the page scan out of each page
// using the `lopdf` crate.
//
// Scanner-produced PDFs carry one full-page image XObject per page. The
// reader returns that image decoded; it does not rasterize vector content.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use ocrmd_core::error::OcrmdError;
use tracing::{debug, info, instrument};

use crate::image::ImageProcessor;

/// Page tree levels walked looking for inherited `/Resources`.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Reads page scans from an existing PDF file.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OcrmdError> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            OcrmdError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self { document })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, OcrmdError> {
        let document = Document::load_mem(data).map_err(|err| {
            OcrmdError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    // -- Extraction -----------------------------------------------------------

    /// Decode the scan image of page `page_number` (1-indexed).
    ///
    /// When a page references several images the largest one is taken.
    #[instrument(skip(self))]
    pub fn page_image(&self, page_number: u32) -> Result<DynamicImage, OcrmdError> {
        let pages = self.document.get_pages();
        let page_id: ObjectId = *pages.get(&page_number).ok_or_else(|| {
            OcrmdError::PdfError(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })?;

        let resources = self.page_resources(page_id)?;
        let xobjects = match resources.get(b"XObject") {
            Ok(obj) => self.resolve_dict(obj)?,
            Err(_) => {
                return Err(OcrmdError::PdfError(format!(
                    "page {} has no XObject resources",
                    page_number
                )));
            }
        };

        let mut best: Option<(u64, &lopdf::Stream)> = None;
        for (_, value) in xobjects.iter() {
            let Ok(stream) = self.resolve(value).and_then(|obj| match obj {
                Object::Stream(stream) => Ok(stream),
                _ => Err(OcrmdError::PdfError("XObject is not a stream".into())),
            }) else {
                continue;
            };
            if !has_name(&stream.dict, b"Subtype", b"Image") {
                continue;
            }
            let area = dimension(&stream.dict, b"Width")? as u64
                * dimension(&stream.dict, b"Height")? as u64;
            if best.is_none_or(|(best_area, _)| area > best_area) {
                best = Some((area, stream));
            }
        }

        let (_, stream) = best.ok_or_else(|| {
            OcrmdError::PdfError(format!(
                "page {} carries no embedded scan image",
                page_number
            ))
        })?;
        let image = decode_image_stream(stream)?;
        debug!(
            page_number,
            width = image.width(),
            height = image.height(),
            "Page scan extracted"
        );
        Ok(image)
    }

    /// `/Resources` of a page, following `/Parent` for inherited entries.
    fn page_resources(&self, page_id: ObjectId) -> Result<&Dictionary, OcrmdError> {
        let page = self.document.get_object(page_id).map_err(|err| {
            OcrmdError::PdfError(format!("cannot read page object {:?}: {}", page_id, err))
        })?;
        let mut node = self.resolve_dict(page)?;
        for _ in 0..MAX_PAGE_TREE_DEPTH {
            if let Ok(res) = node.get(b"Resources") {
                return self.resolve_dict(res);
            }
            match node.get(b"Parent") {
                Ok(parent) => node = self.resolve_dict(parent)?,
                Err(_) => {
                    return Err(OcrmdError::PdfError(format!(
                        "page {:?} has no resources",
                        page_id
                    )));
                }
            }
        }
        Err(OcrmdError::PdfError(format!(
            "page {:?}: /Parent chain deeper than {} levels",
            page_id, MAX_PAGE_TREE_DEPTH
        )))
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object, OcrmdError> {
        match object {
            Object::Reference(id) => self.document.get_object(*id).map_err(|err| {
                OcrmdError::PdfError(format!("cannot read object {:?}: {}", id, err))
            }),
            other => Ok(other),
        }
    }

    fn resolve_dict<'a>(&'a self, object: &'a Object) -> Result<&'a Dictionary, OcrmdError> {
        match self.resolve(object)? {
            Object::Dictionary(dict) => Ok(dict),
            Object::Stream(stream) => Ok(&stream.dict),
            _ => Err(OcrmdError::PdfError("expected a dictionary".into())),
        }
    }
}

fn has_name(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    matches!(dict.get(key), Ok(Object::Name(name)) if name.as_slice() == expected)
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, OcrmdError> {
    match dict.get(key) {
        Ok(Object::Integer(value)) => match u32::try_from(*value) {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(OcrmdError::PdfError(format!(
                "image /{} of {} is out of range",
                String::from_utf8_lossy(key),
                value
            ))),
        },
        _ => Err(OcrmdError::PdfError(format!(
            "image has no valid /{}",
            String::from_utf8_lossy(key)
        ))),
    }
}

/// Names listed under `/Filter`, which may be a single name or an array.
fn filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode an image XObject: JPEG (`DCTDecode`) or 8-bit gray/RGB samples,
/// optionally Flate-compressed.
fn decode_image_stream(stream: &lopdf::Stream) -> Result<DynamicImage, OcrmdError> {
    let width = dimension(&stream.dict, b"Width")?;
    let height = dimension(&stream.dict, b"Height")?;
    let filters = filters(&stream.dict);

    if filters.iter().any(|f| f.as_slice() == b"DCTDecode") {
        return ImageProcessor::from_bytes(&stream.content).map(ImageProcessor::into_dynamic);
    }

    let samples = match filters.as_slice() {
        [] => stream.content.clone(),
        [only] if only.as_slice() == b"FlateDecode" => {
            stream.decompressed_content().map_err(|err| {
                OcrmdError::PdfError(format!("failed to inflate image stream: {}", err))
            })?
        }
        other => {
            let names: Vec<String> = other
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            return Err(OcrmdError::UnsupportedSource(format!(
                "image filter {:?} is not supported",
                names
            )));
        }
    };

    match stream.dict.get(b"BitsPerComponent") {
        Ok(Object::Integer(8)) => {}
        _ => {
            return Err(OcrmdError::UnsupportedSource(
                "only 8-bit image samples are supported".into(),
            ));
        }
    }

    // Channel count from the sample length covers ICC-based colour spaces too.
    let pixels = width as usize * height as usize;
    if samples.len() >= pixels * 3 {
        RgbImage::from_raw(width, height, samples[..pixels * 3].to_vec())
            .map(DynamicImage::ImageRgb8)
    } else if samples.len() >= pixels {
        GrayImage::from_raw(width, height, samples[..pixels].to_vec())
            .map(DynamicImage::ImageLuma8)
    } else {
        None
    }
    .ok_or_else(|| {
        OcrmdError::ImageError(format!(
            "image stream holds {} bytes, too few for {}x{}",
            samples.len(),
            width,
            height
        ))
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory scanned PDFs for tests.

    use lopdf::{Dictionary, Document, Object, Stream};

    /// Build a PDF with one page per `(dictionary, content)` image XObject.
    pub fn pdf_with_images(images: Vec<(Dictionary, Vec<u8>)>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();

        for (dict, content) in images {
            let image_id = doc.add_object(Stream::new(dict, content));
            let mut xobjects = Dictionary::new();
            xobjects.set("Im0", Object::Reference(image_id));
            let mut resources = Dictionary::new();
            resources.set("XObject", Object::Dictionary(xobjects));

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set("Resources", Object::Dictionary(resources));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            );
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(kids.len() as i64));
        pages.set("Kids", Object::Array(kids));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// Image XObject dictionary header.
    pub fn image_dict(width: i64, height: i64, color_space: &str, filter: Option<&str>) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(width));
        dict.set("Height", Object::Integer(height));
        dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        if let Some(filter) = filter {
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        }
        dict
    }
}
