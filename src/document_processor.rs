//! # Document Processing Module
//!
//! Questo modulo ricomprime le immagini raster incorporate in un PDF per
//! avvicinare il documento alla dimensione target.
//!
//! ## Responsabilità:
//! - Enumera le immagini XObject di ogni pagina (Resources ereditate dai
//!   nodi Pages, Form XObject annidati, immagini condivise una sola volta)
//! - Estrae i byte: `DCTDecode` → JPEG così com'è, `FlateDecode` o non
//!   filtrato a 8 bit (DeviceRGB, DeviceGray, ICCBased) → PNG
//! - Target per immagine: `max(1024, round(len * target/originale))`
//! - Sostituisce lo stream con il JPEG ricompresso (`DCTDecode`)
//! - Serializza con pruning degli oggetti e compressione degli stream
//!
//! Un'immagine che non si riesce a processare viene lasciata intatta: non
//! interrompe mai la compressione del resto del documento.

use crate::error::{CompressError, CompressResult};
use crate::image_processor::ImageCompressor;
use crate::types::{Encoded, Outcome, SkipReason};
use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::io::Cursor;
use tracing::{debug, warn};

/// Smallest byte budget handed to the image targeter for one embedded image
pub const MIN_IMAGE_TARGET: u64 = 1024;

/// Raster pulled out of a PDF stream, ready for the image targeter
#[derive(Debug)]
struct ExtractedImage {
    bytes: Vec<u8>,
    mime: &'static str,
}

/// PDF compressor backed by the image size-targeter
#[derive(Debug, Clone, Default)]
pub struct DocumentCompressor {
    images: ImageCompressor,
}

impl DocumentCompressor {
    pub fn new(images: ImageCompressor) -> Self {
        Self { images }
    }

    pub fn compress_document(&self, bytes: &[u8], target_size: u64) -> Outcome {
        if bytes.len() as u64 <= target_size {
            return Outcome::Skipped(SkipReason::AlreadyUnderTarget);
        }

        match self.try_compress(bytes, target_size) {
            Ok(data) => Outcome::Compressed(Encoded::same_format(data)),
            Err(e) => {
                warn!("PDF compression failed: {}", e);
                Outcome::Skipped(SkipReason::EncodeFailure(format!("PDF compression failed: {}", e)))
            }
        }
    }

    fn try_compress(&self, bytes: &[u8], target_size: u64) -> CompressResult<Vec<u8>> {
        let ratio = target_size as f64 / bytes.len() as f64;
        let mut doc = Document::load_mem(bytes)?;

        let image_ids = collect_document_images(&doc);
        debug!("PDF has {} embedded images, ratio {:.3}", image_ids.len(), ratio);

        let mut replaced = 0;
        for image_id in image_ids {
            match self.recompress_image(&mut doc, image_id, ratio) {
                Ok(true) => replaced += 1,
                Ok(false) => {}
                Err(e) => debug!("Leaving image {:?} untouched: {}", image_id, e),
            }
        }
        debug!("Replaced {} images", replaced);

        doc.prune_objects();
        doc.renumber_objects();
        doc.compress();

        let mut output = Vec::new();
        doc.save_to(&mut output)?;
        Ok(output)
    }

    /// Returns whether the stream was replaced
    fn recompress_image(&self, doc: &mut Document, image_id: ObjectId, ratio: f64) -> CompressResult<bool> {
        let extracted = match doc.get_object(image_id)? {
            Object::Stream(stream) => extract_image(doc, stream)?,
            _ => None,
        };
        let Some(extracted) = extracted else {
            return Ok(false);
        };

        let image_target = image_target(extracted.bytes.len() as u64, ratio);
        let encoded = match self.images.compress_image(&extracted.bytes, extracted.mime, image_target) {
            Outcome::Compressed(encoded) => encoded,
            Outcome::Skipped(_) => return Ok(false),
        };

        let stream = doc.get_object_mut(image_id)?.as_stream_mut()?;
        if encoded.len() >= stream.content.len() {
            debug!("Recompressed image {:?} is not smaller than its stream, keeping it", image_id);
            return Ok(false);
        }

        let (width, height) = jpeg_dimensions(&encoded.bytes)?;
        debug!(
            "Image {:?}: {} -> {} bytes ({}x{})",
            image_id,
            stream.content.len(),
            encoded.len(),
            width,
            height
        );
        replace_with_jpeg(stream, encoded.bytes, width, height);
        Ok(true)
    }
}

/// Per-image byte budget proportional to the document-level ratio
pub fn image_target(image_len: u64, ratio: f64) -> u64 {
    ((image_len as f64 * ratio).round() as u64).max(MIN_IMAGE_TARGET)
}

/// Image XObjects reachable from every page, in page order, each once
fn collect_document_images(doc: &Document) -> Vec<ObjectId> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();

    for page_id in doc.get_pages().into_values() {
        let Some(resources) = page_resources(doc, page_id) else {
            continue;
        };
        for xobject_id in xobject_refs(doc, resources) {
            collect_images_recursive(doc, xobject_id, &mut images, &mut seen);
        }
    }

    images
}

fn collect_images_recursive(doc: &Document, id: ObjectId, images: &mut Vec<ObjectId>, seen: &mut HashSet<ObjectId>) {
    if !seen.insert(id) {
        return;
    }

    let Ok(Object::Stream(stream)) = doc.get_object(id) else {
        return;
    };

    match name_of(&stream.dict, b"Subtype") {
        Some(b"Image") => images.push(id),
        Some(b"Form") => {
            if let Ok(resources) = stream.dict.get(b"Resources") {
                for child in xobject_refs(doc, resources) {
                    collect_images_recursive(doc, child, images, seen);
                }
            }
        }
        _ => {}
    }
}

/// Page resources, inherited through the `Parent` chain when absent
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Object> {
    let mut node_id = page_id;
    let mut visited = HashSet::new();

    while visited.insert(node_id) {
        let node = doc.get_dictionary(node_id).ok()?;
        if let Ok(resources) = node.get(b"Resources") {
            return Some(resources);
        }
        node_id = node.get(b"Parent").ok()?.as_reference().ok()?;
    }

    None
}

fn xobject_refs(doc: &Document, resources: &Object) -> Vec<ObjectId> {
    let Some(resources) = resolve_dict(doc, resources) else {
        return Vec::new();
    };
    let Some(xobjects) = resources.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x)) else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, value)| value.as_reference().ok())
        .collect()
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn name_of<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key).ok()? {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

fn integer_of(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    resolve(doc, dict.get(key).ok()?).as_i64().ok()
}

/// Single filter name; None for unfiltered streams
fn single_filter(stream: &Stream) -> CompressResult<Option<Vec<u8>>> {
    match stream.dict.get(b"Filter") {
        Err(_) => Ok(None),
        Ok(Object::Name(name)) => Ok(Some(name.clone())),
        Ok(Object::Array(filters)) if filters.is_empty() => Ok(None),
        Ok(Object::Array(filters)) if filters.len() == 1 => match &filters[0] {
            Object::Name(name) => Ok(Some(name.clone())),
            _ => Err(unsupported("malformed filter array")),
        },
        Ok(_) => Err(unsupported("filter chain")),
    }
}

/// Color components of an image's color space, when it is one we can decode
fn color_components(doc: &Document, dict: &Dictionary) -> Option<u8> {
    let color_space = resolve(doc, dict.get(b"ColorSpace").ok()?);
    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceRGB" => Some(3),
            b"DeviceGray" => Some(1),
            _ => None,
        },
        Object::Array(items) if items.len() == 2 => {
            let Object::Name(family) = &items[0] else {
                return None;
            };
            if family.as_slice() != b"ICCBased" {
                return None;
            }
            let profile = resolve(doc, &items[1]).as_stream().ok()?;
            match integer_of(doc, &profile.dict, b"N")? {
                3 => Some(3),
                1 => Some(1),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Pull raster bytes out of an image stream. Ok(None) means "not a kind we recompress".
fn extract_image(doc: &Document, stream: &Stream) -> CompressResult<Option<ExtractedImage>> {
    if matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return Ok(None);
    }

    let filter = single_filter(stream)?;
    match filter.as_deref() {
        Some(b"DCTDecode") => {
            // Only gray or RGB; CMYK JPEGs are often stored inverted
            if color_components(doc, &stream.dict).is_none() {
                return Ok(None);
            }
            Ok(Some(ExtractedImage {
                bytes: stream.content.clone(),
                mime: "image/jpeg",
            }))
        }
        Some(b"FlateDecode") | None => {
            let width = integer_of(doc, &stream.dict, b"Width").unwrap_or(0);
            let height = integer_of(doc, &stream.dict, b"Height").unwrap_or(0);
            let bits = integer_of(doc, &stream.dict, b"BitsPerComponent").unwrap_or(0);
            let Some(components) = color_components(doc, &stream.dict) else {
                return Ok(None);
            };
            if width <= 0 || height <= 0 || bits != 8 {
                return Ok(None);
            }

            let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
                return Err(unsupported("image dimensions overflow"));
            };

            let pixels = if filter.is_some() {
                stream.decompressed_content()?
            } else {
                stream.content.clone()
            };
            let img = raw_to_image(pixels, width, height, components)?;

            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
            Ok(Some(ExtractedImage {
                bytes: png,
                mime: "image/png",
            }))
        }
        _ => Ok(None),
    }
}

fn raw_to_image(mut pixels: Vec<u8>, width: u32, height: u32, components: u8) -> CompressResult<DynamicImage> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(components as usize))
        .ok_or_else(|| unsupported("image dimensions overflow"))?;
    if pixels.len() < expected {
        return Err(unsupported("image data shorter than its dimensions"));
    }
    pixels.truncate(expected);

    let img = match components {
        3 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        _ => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
    };
    img.ok_or_else(|| unsupported("invalid raw image buffer"))
}

fn jpeg_dimensions(bytes: &[u8]) -> CompressResult<(u32, u32)> {
    let decoder = JpegDecoder::new(Cursor::new(bytes))?;
    Ok(decoder.dimensions())
}

/// Swap the stream payload for a baseline RGB JPEG
fn replace_with_jpeg(stream: &mut Stream, jpeg: Vec<u8>, width: u32, height: u32) {
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.set("Width", Object::Integer(width as i64));
    stream.dict.set("Height", Object::Integer(height as i64));
    stream.dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    stream.dict.set("BitsPerComponent", Object::Integer(8));
    stream.dict.remove(b"DecodeParms");
    stream.dict.remove(b"Decode");
    stream.set_content(jpeg);
    stream.allows_compression = false;
}

fn unsupported(what: &str) -> CompressError {
    CompressError::UnsupportedFormat(what.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processor::encode_jpeg;
    use image::ImageBuffer;
    use lopdf::dictionary;

    fn noise(width: u32, height: u32) -> Vec<u8> {
        let mut seed: u32 = 0x9e37_79b9;
        (0..width * height * 3)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            })
            .collect()
    }

    fn noisy_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_raw(width, height, noise(width, height)).unwrap();
        encode_jpeg(&DynamicImage::ImageRgb8(img), 95).unwrap()
    }

    /// One-page PDF whose page draws each given image stream
    fn pdf_with_images(images: Vec<Stream>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut xobjects = Dictionary::new();
        let mut content = String::new();
        for (i, image) in images.into_iter().enumerate() {
            let name = format!("Im{}", i);
            content.push_str(&format!("q 100 0 0 100 0 0 cm /{} Do Q\n", name));
            xobjects.set(name, doc.add_object(image));
        }

        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        // Resources live on the Pages node and are inherited by the page
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => dictionary! { "XObject" => xobjects },
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn image_stream(filter: Option<&str>, width: u32, height: u32, content: Vec<u8>) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if let Some(filter) = filter {
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        }
        let mut stream = Stream::new(dict, content);
        stream.allows_compression = false;
        stream
    }

    fn first_image(bytes: &[u8]) -> Stream {
        let doc = Document::load_mem(bytes).unwrap();
        let id = collect_document_images(&doc)[0];
        doc.get_object(id).unwrap().as_stream().unwrap().clone()
    }

    #[test]
    fn test_image_target_floor() {
        assert_eq!(image_target(100_000, 0.5), 50_000);
        assert_eq!(image_target(1_500, 0.5), MIN_IMAGE_TARGET);
        assert_eq!(image_target(3, 0.5), MIN_IMAGE_TARGET);
    }

    #[test]
    fn test_under_target_is_skipped() {
        let compressor = DocumentCompressor::default();
        let outcome = compressor.compress_document(b"%PDF-1.5 tiny", 1_000);
        assert_eq!(outcome, Outcome::Skipped(SkipReason::AlreadyUnderTarget));
    }

    #[test]
    fn test_garbage_is_skipped_with_message() {
        let outcome = DocumentCompressor::default().compress_document(&[7u8; 4096], 100);
        match outcome {
            Outcome::Skipped(SkipReason::EncodeFailure(msg)) => assert!(msg.starts_with("PDF compression failed")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_jpeg_image_is_recompressed() {
        let jpeg = noisy_jpeg(256, 256);
        let pdf = pdf_with_images(vec![image_stream(Some("DCTDecode"), 256, 256, jpeg.clone())]);
        let target = pdf.len() as u64 / 2;

        let outcome = DocumentCompressor::default().compress_document(&pdf, target);
        let Outcome::Compressed(encoded) = outcome else {
            panic!("expected compression, got {:?}", outcome);
        };
        assert!(encoded.bytes.starts_with(b"%PDF"));
        assert!(encoded.len() as f64 <= target as f64 * 1.10);

        let image = first_image(&encoded.bytes);
        assert!(image.content.len() < jpeg.len());
        assert!(image.content.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn test_raw_image_becomes_dct() {
        let raw = noise(128, 128);
        let pdf = pdf_with_images(vec![image_stream(None, 128, 128, raw)]);

        let outcome = DocumentCompressor::default().compress_document(&pdf, pdf.len() as u64 / 4);
        let Outcome::Compressed(encoded) = outcome else {
            panic!("expected compression, got {:?}", outcome);
        };

        let image = first_image(&encoded.bytes);
        assert_eq!(name_of(&image.dict, b"Filter"), Some(&b"DCTDecode"[..]));
        assert_eq!(name_of(&image.dict, b"ColorSpace"), Some(&b"DeviceRGB"[..]));
        assert!(image.dict.get(b"DecodeParms").is_err());
    }

    #[test]
    fn test_bad_image_does_not_abort_document() {
        let good = noisy_jpeg(200, 200);
        let pdf = pdf_with_images(vec![
            image_stream(Some("DCTDecode"), 64, 64, vec![0xFF, 0xD8, 0x00, 0x01, 0x02, 0x03].repeat(2000)),
            image_stream(Some("DCTDecode"), 200, 200, good.clone()),
        ]);

        let outcome = DocumentCompressor::default().compress_document(&pdf, pdf.len() as u64 / 2);
        let Outcome::Compressed(encoded) = outcome else {
            panic!("expected compression, got {:?}", outcome);
        };
        assert!(encoded.len() < pdf.len());
    }

    #[test]
    fn test_huge_declared_dimensions_only_skip_that_image() {
        let good = noisy_jpeg(256, 256);
        let mut huge = image_stream(None, 1, 1, vec![0u8; 4096]);
        huge.dict.set("Width", Object::Integer(4_000_000_000));
        huge.dict.set("Height", Object::Integer(4_000_000_000));
        let pdf = pdf_with_images(vec![huge, image_stream(Some("DCTDecode"), 256, 256, good.clone())]);

        let outcome = DocumentCompressor::default().compress_document(&pdf, pdf.len() as u64 / 2);
        let Outcome::Compressed(encoded) = outcome else {
            panic!("expected compression, got {:?}", outcome);
        };

        let doc = Document::load_mem(&encoded.bytes).unwrap();
        let jpegs: Vec<Stream> = collect_document_images(&doc)
            .into_iter()
            .filter_map(|id| doc.get_object(id).ok()?.as_stream().ok().cloned())
            .filter(|stream| name_of(&stream.dict, b"Filter") == Some(b"DCTDecode".as_slice()))
            .collect();
        assert_eq!(jpegs.len(), 1);
        assert!(jpegs[0].content.len() < good.len());
    }

    #[test]
    fn test_dimensions_beyond_u32_are_rejected() {
        let doc = Document::with_version("1.5");
        let mut stream = image_stream(None, 1, 1, vec![0u8; 3]);
        stream.dict.set("Width", Object::Integer(u32::MAX as i64 + 2));
        assert!(matches!(
            extract_image(&doc, &stream),
            Err(CompressError::UnsupportedFormat(_))
        ));
        assert!(raw_to_image(vec![0u8; 3], u32::MAX, u32::MAX, 3).is_err());
    }

    #[test]
    fn test_non_rgb_jpeg_is_left_alone() {
        let mut doc = Document::with_version("1.5");
        let profile = doc.add_object(Stream::new(dictionary! { "N" => 4 }, vec![0u8; 16]));
        let mut stream = image_stream(Some("DCTDecode"), 8, 8, noisy_jpeg(8, 8));
        stream.dict.set(
            "ColorSpace",
            Object::Array(vec![Object::Name(b"ICCBased".to_vec()), profile.into()]),
        );
        assert!(extract_image(&doc, &stream).unwrap().is_none());

        stream.dict.set("ColorSpace", Object::Name(b"DeviceCMYK".to_vec()));
        assert!(extract_image(&doc, &stream).unwrap().is_none());

        stream.dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
        assert!(extract_image(&doc, &stream).unwrap().is_some());
    }

    #[test]
    fn test_pdf_without_images_is_not_skipped() {
        let pdf = pdf_with_images(Vec::new());
        let outcome = DocumentCompressor::default().compress_document(&pdf, 10);
        assert!(!outcome.is_skipped());
    }

    #[test]
    fn test_image_mask_is_ignored() {
        let doc = Document::with_version("1.5");
        let mut stream = image_stream(None, 8, 8, vec![0u8; 8]);
        stream.dict.set("ImageMask", Object::Boolean(true));
        assert!(extract_image(&doc, &stream).unwrap().is_none());
    }

    #[test]
    fn test_raw_to_image_rejects_short_data() {
        assert!(raw_to_image(vec![0u8; 10], 4, 4, 3).is_err());
        let img = raw_to_image(vec![0u8; 16], 4, 4, 1).unwrap();
        assert_eq!(img.color(), image::ColorType::L8);
    }
}
