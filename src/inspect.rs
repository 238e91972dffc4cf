//! Read-back of generated reports through pdfium.
//!
//! Generation never needs pdfium; this module exists so callers (and the
//! CLI's `--verify`) can confirm what was written: page count, page sizes,
//! document title, and a rendered thumbnail of any page.
//!
//! pdfium is a C++ library with thread-local state, so every call runs on a
//! `spawn_blocking` thread. The library is bound from `PDFIUM_LIB_PATH` when
//! set (a directory or the library file itself), otherwise from the system
//! search path.

use crate::error::ReportError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a written report looks like from the outside.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdfInfo {
    pub page_count: usize,
    /// `(width, height)` of each page in millimetres.
    pub page_sizes_mm: Vec<(f32, f32)>,
    pub title: Option<String>,
    pub producer: Option<String>,
    pub pdf_version: String,
}

impl PdfInfo {
    /// True when every page is A4 portrait, within a millimetre.
    pub fn is_a4_portrait(&self) -> bool {
        self.page_sizes_mm
            .iter()
            .all(|(w, h)| (w - 210.0).abs() < 1.0 && (h - 297.0).abs() < 1.0)
    }
}

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Bind libpdfium from `PDFIUM_LIB_PATH` or the system library path.
pub fn bind_pdfium() -> Result<Pdfium, ReportError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(p) => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ReportError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Inspect a report on disk.
pub async fn inspect(path: &Path) -> Result<PdfInfo, ReportError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .map_err(|e| inspect_failed(&path, e))?;
        describe(&document)
    })
    .await
    .map_err(|e| ReportError::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Inspect report bytes held in memory.
pub async fn inspect_bytes(pdf: Vec<u8>) -> Result<PdfInfo, ReportError> {
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&pdf, None)
            .map_err(|e| inspect_failed(Path::new("<memory>"), e))?;
        describe(&document)
    })
    .await
    .map_err(|e| ReportError::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Render one page (0-based) with its longest edge capped at `max_px`.
pub async fn render_preview(path: &Path, page: usize, max_px: u32) -> Result<DynamicImage, ReportError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .map_err(|e| inspect_failed(&path, e))?;
        let pages = document.pages();
        let total = pages.len() as usize;
        if page >= total {
            return Err(ReportError::InspectFailed {
                path: path.clone(),
                detail: format!("page {} out of range (document has {total})", page + 1),
            });
        }
        let render_config = PdfRenderConfig::new()
            .set_target_width(max_px as i32)
            .set_maximum_height(max_px as i32);
        let pdf_page = pages
            .get(page as u16)
            .map_err(|e| inspect_failed(&path, e))?;
        let image = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| inspect_failed(&path, e))?
            .as_image();
        debug!("Rendered page {} → {}x{} px", page + 1, image.width(), image.height());
        Ok(image)
    })
    .await
    .map_err(|e| ReportError::Internal(format!("Preview task panicked: {}", e)))?
}

fn inspect_failed(path: &Path, e: PdfiumError) -> ReportError {
    ReportError::InspectFailed {
        path: path.to_path_buf(),
        detail: format!("{:?}", e),
    }
}

fn describe(document: &PdfDocument<'_>) -> Result<PdfInfo, ReportError> {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    let page_sizes_mm: Vec<(f32, f32)> = document
        .pages()
        .iter()
        .map(|p| (p.width().value / PT_PER_MM, p.height().value / PT_PER_MM))
        .collect();
    info!("Report inspected: {} pages", page_sizes_mm.len());

    Ok(PdfInfo {
        page_count: page_sizes_mm.len(),
        page_sizes_mm,
        title: get_meta(PdfDocumentMetadataTagType::Title),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        pdf_version: format!("{:?}", document.version()),
    })
}
