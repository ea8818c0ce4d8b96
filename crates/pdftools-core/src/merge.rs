//! Merge pipeline
//!
//! Combines PDF pages and raster images into a single document, in the
//! order of the preview entries. Each entry is handled in isolation: a file
//! that cannot be used produces a warning and is skipped.
//!
//! Progress: 80% of the bar is split evenly across preview entries, the
//! remaining 20% is covered by serialization and the final progress(100).

use lopdf::ObjectId;
use tracing::{debug, info, instrument, warn};

use crate::command::{FileDescriptor, MergeRequest, ScaleDimension, ScaleSpec, ScaleType};
use crate::document::{load_source, OutputDocument};
use crate::error::PdfToolsError;
use crate::event::{EventSink, Notice, PdfBlob, WorkerMessage};
use crate::file_kind::FileKind;
use crate::image::{decode_jpeg, decode_png, RasterImage};

/// Share of the progress bar reserved for per-file work
const FILE_PROGRESS: f64 = 80.0;

/// What handling one file produced
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ItemOutcome {
    pub pages_added: usize,
    pub warnings: Vec<Notice>,
}

impl ItemOutcome {
    fn pages(count: usize) -> Self {
        Self {
            pages_added: count,
            warnings: Vec::new(),
        }
    }

    fn skipped(warning: Notice) -> Self {
        Self {
            pages_added: 0,
            warnings: vec![warning],
        }
    }
}

/// The progress window owned by one file
#[derive(Debug, Clone, Copy)]
struct ProgressSlice {
    base: f64,
    share: f64,
}

impl ProgressSlice {
    fn at(&self, done: usize, total: usize) -> f64 {
        self.base + (done as f64 * self.share) / total as f64
    }

    fn end(&self) -> f64 {
        self.base + self.share
    }
}

/// Merge the files referenced by `request.files_preview` into one PDF
#[instrument(skip_all, fields(files = request.files.len(), entries = request.files_preview.len()))]
pub fn merge(request: &MergeRequest, sink: &mut impl EventSink) {
    sink.progress(0.0);

    let mut output = OutputDocument::new();
    let share = FILE_PROGRESS / request.files_preview.len().max(1) as f64;
    let mut file_number = 0usize;

    for entry in &request.files_preview {
        let Some(index) = entry.id.resolve(request.files.len()) else {
            warn!(id = %entry.id, "Skipping preview entry with invalid file index");
            sink.post(WorkerMessage::warning(
                format!("Invalid file index: {}", entry.id),
                "File index is out of range, this file was skipped",
            ));
            continue;
        };

        let file = &request.files[index];
        let slice = ProgressSlice {
            base: file_number as f64 * share,
            share,
        };

        let outcome = handle_file(&mut output, file, &request.scale, slice, sink);
        debug!(
            file = %file.name,
            pages = outcome.pages_added,
            warnings = outcome.warnings.len(),
            "Handled file"
        );
        for notice in outcome.warnings {
            sink.post(WorkerMessage::Warning(notice));
        }

        sink.progress(slice.end());
        file_number += 1;
    }

    if output.page_count() == 0 {
        sink.post(WorkerMessage::error(
            "Empty output",
            "Output is empty because all files failed to be merged",
        ));
        return;
    }

    let page_count = output.page_count();
    match output.save() {
        Ok(bytes) => {
            info!(pages = page_count, bytes = bytes.len(), "Merge complete");
            sink.progress(100.0);
            sink.post(WorkerMessage::Success(PdfBlob::new(bytes)));
        }
        Err(e) => {
            warn!("Failed to save merged document: {}", e);
            sink.post(WorkerMessage::error(
                "Failed to save PDF",
                "Unknown error, you can try refreshing the page",
            ));
        }
    }
}

/// Dispatch one file to the handler for its kind
fn handle_file(
    output: &mut OutputDocument,
    file: &FileDescriptor,
    scale: &ScaleSpec,
    slice: ProgressSlice,
    sink: &mut impl EventSink,
) -> ItemOutcome {
    match FileKind::from_mime(&file.mime_type) {
        FileKind::Png => embed_raster(output, file, scale, decode_png),
        FileKind::Jpeg => embed_raster(output, file, scale, decode_jpeg),
        FileKind::Pdf => copy_pdf(output, file, scale, slice, sink),
        FileKind::Unsupported(mime) => {
            warn!(file = %file.name, mime = %mime, "Unsupported file type");
            ItemOutcome::skipped(Notice::new(
                format!("Unsupported file type: {}", file.name),
                format!("File type {} is not supported, this file was skipped", mime),
            ))
        }
    }
}

/// Page size for an image anchored on the configured dimension
pub fn image_page_size(
    scale: &ScaleSpec,
    image_width: u32,
    image_height: u32,
) -> Result<(f64, f64), PdfToolsError> {
    let target = scale.target_points()?;
    let (w, h) = (image_width as f64, image_height as f64);
    Ok(match scale.scale_dimension {
        ScaleDimension::Width => (target, h / w * target),
        ScaleDimension::Height => (w / h * target, target),
    })
}

/// Uniform factor bringing a page's anchored dimension to the target size
pub fn page_scale_factor(
    scale: &ScaleSpec,
    page_width: f64,
    page_height: f64,
) -> Result<f64, PdfToolsError> {
    let target = scale.target_points()?;
    Ok(match scale.scale_dimension {
        ScaleDimension::Width => target / page_width,
        ScaleDimension::Height => target / page_height,
    })
}

fn embed_raster(
    output: &mut OutputDocument,
    file: &FileDescriptor,
    scale: &ScaleSpec,
    decode: fn(&[u8]) -> Result<RasterImage, PdfToolsError>,
) -> ItemOutcome {
    let result = decode(&file.data).and_then(|raster| {
        let (width, height) = image_page_size(scale, raster.width, raster.height)?;
        output.add_image_page(raster, width, height)
    });

    match result {
        Ok(_) => ItemOutcome::pages(1),
        Err(e) => {
            warn!(file = %file.name, "Failed to embed image: {}", e);
            ItemOutcome::skipped(Notice::new(
                format!("Failed to embed image: {}", file.name),
                "Unknown error, this file was skipped",
            ))
        }
    }
}

fn copy_pdf(
    output: &mut OutputDocument,
    file: &FileDescriptor,
    scale: &ScaleSpec,
    slice: ProgressSlice,
    sink: &mut impl EventSink,
) -> ItemOutcome {
    let pages = match import_scaled(output, &file.data, scale) {
        Ok(pages) => pages,
        Err(e) => {
            warn!(file = %file.name, "Failed to load PDF: {}", e);
            let description = if e.is_encrypted() {
                "Document is encrypted, this file was skipped"
            } else {
                "Unknown error, this file was skipped"
            };
            return ItemOutcome::skipped(Notice::new(
                format!("Failed to load PDF: {}", file.name),
                description,
            ));
        }
    };

    let page_count = pages.len();
    for (page_index, page_id) in pages.into_iter().enumerate() {
        output.append_page(page_id);
        sink.progress(slice.at(page_index + 1, page_count));
    }

    ItemOutcome::pages(page_count)
}

/// Load a source PDF and copy its pages, rescaled when requested
fn import_scaled(
    output: &mut OutputDocument,
    bytes: &[u8],
    scale: &ScaleSpec,
) -> Result<Vec<ObjectId>, PdfToolsError> {
    let source = load_source(bytes)?;
    let pages = output.import_pages(source)?;

    if scale.scale_type == ScaleType::All {
        for &page_id in &pages {
            let (width, height) = output.page_size(page_id)?;
            output.scale_page(page_id, page_scale_factor(scale, width, height)?)?;
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::PreviewEntry;
    use crate::document::tests::{
        create_encrypted_test_pdf, create_sized_test_pdf, create_test_pdf, page_sizes,
    };
    use crate::image::tests::{create_test_jpeg, create_test_png};
    use image::ExtendedColorType;
    use crate::units::{to_points, MeasurementUnit};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn pdf(name: &str, bytes: Vec<u8>) -> FileDescriptor {
        FileDescriptor::new(name, "application/pdf", bytes)
    }

    fn request(files: Vec<FileDescriptor>, preview: Vec<i64>, scale: ScaleSpec) -> MergeRequest {
        MergeRequest {
            files,
            files_preview: preview.into_iter().map(PreviewEntry::index).collect(),
            scale,
        }
    }

    fn width_mm(size: f64, scale_type: ScaleType) -> ScaleSpec {
        ScaleSpec {
            scale_type,
            scale_dimension: ScaleDimension::Width,
            output_size: size,
            output_size_unit: MeasurementUnit::Millimeter,
        }
    }

    fn run(request: &MergeRequest) -> Vec<WorkerMessage> {
        let mut events = Vec::new();
        merge(request, &mut events);
        events
    }

    fn success_bytes(events: &[WorkerMessage]) -> &[u8] {
        match events.last() {
            Some(WorkerMessage::Success(blob)) => &blob.data,
            other => panic!("expected success, got {:?}", other),
        }
    }

    fn warnings(events: &[WorkerMessage]) -> Vec<&Notice> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkerMessage::Warning(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn progress(events: &[WorkerMessage]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkerMessage::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_invalid_index_is_skipped_with_warning() {
        let req = request(
            vec![pdf("three.pdf", create_test_pdf(3))],
            vec![0, 5],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);

        let bytes = success_bytes(&events);
        let doc = lopdf::Document::load_mem(bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);

        let warnings = warnings(&events);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Invalid file index: 5");
        assert_eq!(
            warnings[0].description,
            "File index is out of range, this file was skipped"
        );
    }

    #[test]
    fn test_all_unsupported_is_empty_output() {
        let req = request(
            vec![
                FileDescriptor::new("notes.txt", "text/plain", b"hello".to_vec()),
                FileDescriptor::new("anim.gif", "image/gif", vec![0x47, 0x49, 0x46]),
            ],
            vec![0, 1],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);

        assert!(!events.iter().any(|e| matches!(e, WorkerMessage::Success(_))));
        assert_eq!(
            events.last(),
            Some(&WorkerMessage::error(
                "Empty output",
                "Output is empty because all files failed to be merged"
            ))
        );

        let warnings = warnings(&events);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].message, "Unsupported file type: notes.txt");
        assert_eq!(
            warnings[0].description,
            "File type text/plain is not supported, this file was skipped"
        );
    }

    #[test]
    fn test_png_page_follows_aspect_ratio() {
        let req = request(
            vec![FileDescriptor::new(
                "wide.png",
                "image/png",
                create_test_png(200, 100, 255),
            )],
            vec![0],
            width_mm(100.0, ScaleType::None),
        );
        let events = run(&req);

        let sizes = page_sizes(success_bytes(&events));
        assert_eq!(sizes.len(), 1);
        let expected_width = to_points(100.0, MeasurementUnit::Millimeter);
        assert!((sizes[0].0 - expected_width).abs() < 0.01);
        assert!((sizes[0].1 - expected_width / 2.0).abs() < 0.01);
    }

    #[test]
    fn test_height_anchor_for_images() {
        let scale = ScaleSpec {
            scale_type: ScaleType::None,
            scale_dimension: ScaleDimension::Height,
            output_size: 2.0,
            output_size_unit: MeasurementUnit::Inch,
        };
        let (w, h) = image_page_size(&scale, 300, 600).unwrap();
        assert!((h - 144.0).abs() < 1e-6);
        assert!((w - 72.0).abs() < 1e-6);
    }

    #[test]
    fn test_broken_image_is_skipped() {
        let req = request(
            vec![
                FileDescriptor::new("broken.png", "image/png", b"nope".to_vec()),
                FileDescriptor::new("broken.jpg", "image/jpg", b"nope".to_vec()),
                pdf("one.pdf", create_test_pdf(1)),
            ],
            vec![0, 1, 2],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);

        let warnings = warnings(&events);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].message, "Failed to embed image: broken.png");
        assert_eq!(warnings[1].message, "Failed to embed image: broken.jpg");
        assert_eq!(warnings[0].description, "Unknown error, this file was skipped");
        success_bytes(&events);
    }

    #[test]
    fn test_unreadable_pdf_warning() {
        let req = request(
            vec![
                pdf("garbage.pdf", b"%PDF-1.7 but not really".to_vec()),
                pdf("one.pdf", create_test_pdf(1)),
            ],
            vec![0, 1],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);

        let warnings = warnings(&events);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Failed to load PDF: garbage.pdf");
        assert_eq!(warnings[0].description, "Unknown error, this file was skipped");
    }

    #[test]
    fn test_encrypted_pdf_is_skipped() {
        let req = request(
            vec![pdf("locked.pdf", create_encrypted_test_pdf(2))],
            vec![0],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);

        let warnings = warnings(&events);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Failed to load PDF: locked.pdf");
        assert_eq!(
            warnings[0].description,
            "Document is encrypted, this file was skipped"
        );
        assert_eq!(
            events.last(),
            Some(&WorkerMessage::error(
                "Empty output",
                "Output is empty because all files failed to be merged"
            ))
        );
    }

    #[test]
    fn test_jpeg_is_embedded_as_dct() {
        let req = request(
            vec![
                FileDescriptor::new(
                    "photo.jpg",
                    "image/jpg",
                    create_test_jpeg(40, 20, ExtendedColorType::Rgb8),
                ),
                FileDescriptor::new(
                    "scan.jpeg",
                    "image/jpeg",
                    create_test_jpeg(10, 30, ExtendedColorType::L8),
                ),
            ],
            vec![0, 1],
            width_mm(100.0, ScaleType::None),
        );
        let events = run(&req);
        assert!(warnings(&events).is_empty());

        let bytes = success_bytes(&events);
        let target = to_points(100.0, MeasurementUnit::Millimeter);
        let sizes = page_sizes(bytes);
        assert_eq!(sizes.len(), 2);
        assert!((sizes[0].0 - target).abs() < 0.01);
        assert!((sizes[0].1 - target / 2.0).abs() < 0.01);
        assert!((sizes[1].1 - target * 3.0).abs() < 0.01);

        let doc = lopdf::Document::load_mem(bytes).unwrap();
        let mut color_spaces: Vec<Vec<u8>> = doc
            .objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .filter(|stream| {
                stream
                    .dict
                    .get(b"Filter")
                    .and_then(|f| f.as_name())
                    .map_or(false, |name| name == b"DCTDecode")
            })
            .map(|stream| {
                stream
                    .dict
                    .get(b"ColorSpace")
                    .unwrap()
                    .as_name()
                    .unwrap()
                    .to_vec()
            })
            .collect();
        color_spaces.sort();
        assert_eq!(
            color_spaces,
            vec![b"DeviceGray".to_vec(), b"DeviceRGB".to_vec()]
        );
    }

    #[test]
    fn test_non_positive_output_size_skips_images() {
        let req = request(
            vec![
                FileDescriptor::new("a.png", "image/png", create_test_png(4, 2, 255)),
                pdf("one.pdf", create_test_pdf(1)),
            ],
            vec![0, 1],
            width_mm(0.0, ScaleType::None),
        );
        let events = run(&req);

        let warnings = warnings(&events);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Failed to embed image: a.png");
        assert_eq!(page_sizes(success_bytes(&events)), vec![(612.0, 792.0)]);
    }

    #[test]
    fn test_negative_output_size_skips_scaled_pdf() {
        let req = request(
            vec![pdf("one.pdf", create_test_pdf(1))],
            vec![0],
            width_mm(-5.0, ScaleType::All),
        );
        let events = run(&req);

        let warnings = warnings(&events);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Failed to load PDF: one.pdf");
        assert!(matches!(events.last(), Some(WorkerMessage::Error(_))));
    }

    #[test]
    fn test_preview_order_controls_page_order() {
        let req = request(
            vec![
                pdf("letter.pdf", create_test_pdf(2)),
                pdf("small.pdf", create_sized_test_pdf(1, 200, 100)),
            ],
            vec![1, 0],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);

        let sizes = page_sizes(success_bytes(&events));
        assert_eq!(
            sizes,
            vec![(200.0, 100.0), (612.0, 792.0), (612.0, 792.0)]
        );
    }

    #[test]
    fn test_scale_all_rescales_pdf_pages() {
        let req = request(
            vec![
                pdf("letter.pdf", create_test_pdf(1)),
                pdf("small.pdf", create_sized_test_pdf(1, 200, 100)),
            ],
            vec![0, 1],
            width_mm(210.0, ScaleType::All),
        );
        let events = run(&req);

        let target = to_points(210.0, MeasurementUnit::Millimeter);
        let sizes = page_sizes(success_bytes(&events));
        assert_eq!(sizes.len(), 2);
        for (w, _) in &sizes {
            assert!((w - target).abs() < 0.01);
        }
        assert!((sizes[0].1 - 792.0 * target / 612.0).abs() < 0.01);
        assert!((sizes[1].1 - target / 2.0).abs() < 0.01);
    }

    #[test]
    fn test_scale_none_keeps_pdf_page_size() {
        let req = request(
            vec![pdf("small.pdf", create_sized_test_pdf(1, 200, 100))],
            vec![0],
            width_mm(500.0, ScaleType::None),
        );
        let sizes = page_sizes(success_bytes(&run(&req)));
        assert_eq!(sizes, vec![(200.0, 100.0)]);
    }

    #[test]
    fn test_progress_sequence_for_multipage_pdf() {
        let req = request(
            vec![pdf("four.pdf", create_test_pdf(4))],
            vec![0],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);
        assert_eq!(
            progress(&events),
            vec![0.0, 20.0, 40.0, 60.0, 80.0, 80.0, 100.0]
        );
    }

    #[test]
    fn test_invalid_entry_consumes_no_progress_share() {
        let req = request(
            vec![pdf("one.pdf", create_test_pdf(1))],
            vec![9, 0],
            width_mm(210.0, ScaleType::None),
        );
        let events = run(&req);
        assert_eq!(progress(&events), vec![0.0, 40.0, 40.0, 100.0]);
    }

    #[test]
    fn test_empty_preview_is_empty_output() {
        let req = request(vec![], vec![], width_mm(210.0, ScaleType::None));
        let events = run(&req);
        assert_eq!(events.first(), Some(&WorkerMessage::Progress(0.0)));
        assert!(matches!(events.last(), Some(WorkerMessage::Error(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn progress_is_monotonic_and_ends_at_100(
            entries in proptest::collection::vec(-1i64..4, 1..6),
            pages in 1u32..4,
        ) {
            let files = vec![
                pdf("a.pdf", create_test_pdf(pages)),
                FileDescriptor::new("b.png", "image/png", create_test_png(3, 2, 255)),
                FileDescriptor::new("c.txt", "text/plain", vec![]),
            ];
            let req = request(files, entries, width_mm(100.0, ScaleType::All));
            let events = run(&req);

            let values = progress(&events);
            prop_assert_eq!(values[0], 0.0);
            for pair in values.windows(2) {
                prop_assert!(pair[0] <= pair[1] + 1e-9);
            }
            prop_assert!(values.iter().all(|p| (0.0..=100.0).contains(p)));

            let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
            prop_assert_eq!(terminal.len(), 1);
            prop_assert!(events.last().unwrap().is_terminal());
            if matches!(events.last(), Some(WorkerMessage::Success(_))) {
                prop_assert_eq!(*values.last().unwrap(), 100.0);
            }
        }
    }
}
