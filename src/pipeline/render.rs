//! Page rasterisation: PDF pages via pdfium, image pages via `image` with
//! EXIF orientation applied.
//!
//! ## Why no async here?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. Everything in this module is blocking; the stages that use
//! it call in from `spawn_blocking` so runtime workers never stall on a
//! render.

use crate::error::PipelineError;
use crate::state::{PageGeometry, PageNumber};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// PDF user space is 72 points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Bind to a pdfium library.
///
/// Resolution order: the explicit path (a library file or a directory that
/// holds the platform library), then `./`, then the system library.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, PipelineError> {
    let bindings = match lib_path {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Open a PDF, mapping pdfium failures to [`PipelineError::CorruptPdf`].
pub fn open_pdf<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, PipelineError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| PipelineError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

/// Pixel size of a page rendered at `dpi`.
pub fn page_pixels(page: &PdfPage<'_>, dpi: u32) -> PageGeometry {
    let scale = dpi as f32 / POINTS_PER_INCH;
    PageGeometry {
        width: (page.width().value * scale).round() as u32,
        height: (page.height().value * scale).round() as u32,
    }
}

/// Rasterise one page of an open document at `dpi`.
pub fn render_page(
    document: &PdfDocument<'_>,
    page: PageNumber,
    dpi: u32,
) -> Result<DynamicImage, PipelineError> {
    let pages = document.pages();
    let total = pages.len() as usize;
    if page >= total {
        return Err(PipelineError::RasterisationFailed {
            page,
            detail: format!("page out of range (document has {total} pages)"),
        });
    }

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / POINTS_PER_INCH);

    let pdf_page = pages
        .get(page as u16)
        .map_err(|e| PipelineError::RasterisationFailed {
            page,
            detail: format!("{e:?}"),
        })?;

    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| PipelineError::RasterisationFailed {
            page,
            detail: format!("{e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!("Rendered page {} → {}x{} px", page, image.width(), image.height());
    Ok(image)
}

// ── Image pages ──────────────────────────────────────────────────────────

/// EXIF orientation code of an image file, if it carries one.
pub fn exif_orientation(path: &Path) -> Option<u32> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = std::io::BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

/// Undo the camera rotation recorded by an EXIF orientation code.
///
/// Codes 3, 6 and 8 rotate by 180°, 90° clockwise and 270° clockwise; every
/// other code (including mirrored variants) leaves the image as is.
pub fn apply_orientation(img: DynamicImage, orientation: Option<u32>) -> DynamicImage {
    match orientation {
        Some(3) => img.rotate180(),
        Some(6) => img.rotate90(),
        Some(8) => img.rotate270(),
        _ => img,
    }
}

/// Load an image page with its EXIF orientation applied.
pub fn load_oriented_image(path: &Path, page: PageNumber) -> Result<DynamicImage, PipelineError> {
    let img = image::open(path).map_err(|e| PipelineError::RasterisationFailed {
        page,
        detail: format!("{}: {e}", path.display()),
    })?;
    Ok(apply_orientation(img, exif_orientation(path)))
}

/// Pixel size of an image page after orientation, read from the header only.
pub fn oriented_dimensions(path: &Path, page: PageNumber) -> Result<PageGeometry, PipelineError> {
    let (width, height) =
        image::image_dimensions(path).map_err(|e| PipelineError::RasterisationFailed {
            page,
            detail: format!("{}: {e}", path.display()),
        })?;
    Ok(match exif_orientation(path) {
        Some(6) | Some(8) => PageGeometry {
            width: height,
            height: width,
        },
        _ => PageGeometry { width, height },
    })
}
