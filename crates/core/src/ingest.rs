use crate::chunking::{assemble_document_text, build_chunk_records};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::{ChunkRecord, ChunkingOptions, IngestError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// PDFs directly inside `folder`, sorted by path. Subfolders are not
/// searched, so each file name (the chunk `source`) is unique.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub records: Vec<ChunkRecord>,
    pub processed_files: usize,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn ingest_folder(folder: &Path, options: ChunkingOptions) -> Result<IngestionReport, IngestError> {
    ingest_folder_with(&LopdfExtractor, folder, options)
}

/// Chunks every PDF under `folder`. Files that cannot be read are reported
/// in `skipped_files`; a folder without PDFs yields an empty report.
pub fn ingest_folder_with<E: PdfExtractor>(
    extractor: &E,
    folder: &Path,
    options: ChunkingOptions,
) -> Result<IngestionReport, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "not a directory: {}",
            folder.display()
        )));
    }

    let mut report = IngestionReport::default();

    for path in discover_pdf_files(folder) {
        info!(path = %path.display(), "processing pdf");
        match chunk_pdf(extractor, &path, options) {
            Ok(records) => {
                report.processed_files += 1;
                report.records.extend(records);
            }
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(report)
}

pub fn chunk_pdf<E: PdfExtractor>(
    extractor: &E,
    path: &Path,
    options: ChunkingOptions,
) -> Result<Vec<ChunkRecord>, IngestError> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let pages = extractor.extract_pages(path)?;
    let raw_text = assemble_document_text(&pages);
    if raw_text.trim().is_empty() {
        warn!(path = %path.display(), "no text extracted");
        return Ok(Vec::new());
    }

    let records = build_chunk_records(source, &raw_text, options);
    info!(path = %path.display(), chunks = records.len(), "extracted chunks");
    Ok(records)
}

/// Creates the uploads folder when it is missing. Returns whether it already existed.
pub fn ensure_folder(folder: &Path) -> Result<bool, IngestError> {
    if folder.is_dir() {
        return Ok(true);
    }
    fs::create_dir_all(folder)?;
    Ok(false)
}
