//! `crop_figures` and `crop_tables`: cut elements out of rendered pages.
//!
//! A page is rasterised only if it carries at least one element of the
//! category being cropped: PDF pages through pdfium at the configured DPI,
//! image pages from disk with EXIF orientation undone. Each element's
//! polygon becomes an axis-aligned box scaled from fractional to pixel
//! coordinates, and the crop is written as `{scratch}/{id}.png`.
//!
//! Crops are PNG-encoded in memory and written atomically, so cropping the
//! same element again reproduces the same file byte for byte.

use super::encode::encode_png;
use super::render::{bind_pdfium, load_oriented_image, open_pdf, render_page};
use super::StageContext;
use crate::config::SourceKind;
use crate::error::{ElementIssue, PipelineError};
use crate::output::write_atomic;
use crate::state::{
    need, Coordinate, ElementCategory, ElementId, LayoutElement, PageNumber, PipelineState,
    SourceDocument, StateUpdate,
};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Axis-aligned box in fractional page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Pixel rectangle inside a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// `(min x, min y, max x, max y)` over the polygon; `None` if it is empty.
    pub fn from_polygon(points: &[Coordinate]) -> Option<Self> {
        let first = points.first()?;
        let init = BoundingBox {
            x1: first.x,
            y1: first.y,
            x2: first.x,
            y2: first.y,
        };
        Some(points.iter().fold(init, |b, p| BoundingBox {
            x1: b.x1.min(p.x),
            y1: b.y1.min(p.y),
            x2: b.x2.max(p.x),
            y2: b.y2.max(p.y),
        }))
    }

    /// Scale to pixels on a `width` x `height` page.
    ///
    /// Edges are truncated toward zero and clamped to the page; a degenerate
    /// box still yields at least one pixel.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let scale = |v: f64, dim: u32| ((v * dim as f64) as i64).clamp(0, dim as i64) as u32;

        let x1 = scale(self.x1, width).min(width.saturating_sub(1));
        let y1 = scale(self.y1, height).min(height.saturating_sub(1));
        let x2 = scale(self.x2, width);
        let y2 = scale(self.y2, height);

        PixelRect {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1).max(1),
            height: y2.saturating_sub(y1).max(1),
        }
    }
}

/// Crop one element from a rendered page and write it as PNG.
///
/// Returns `Ok(None)` when the element has no coordinates.
pub fn crop_element(
    page_image: &DynamicImage,
    element: &LayoutElement,
    output: &Path,
) -> Result<Option<PathBuf>, PipelineError> {
    let Some(bbox) = BoundingBox::from_polygon(&element.coordinates) else {
        let issue = ElementIssue::EmptyCoordinates {
            id: element.id,
            page: element.page,
        };
        warn!("{}", issue);
        return Ok(None);
    };

    let rect = bbox.to_pixels(page_image.width(), page_image.height());
    let cropped = page_image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let png = encode_png(&cropped).map_err(|e| PipelineError::RasterisationFailed {
        page: element.page,
        detail: format!("encoding crop {}: {e}", element.id),
    })?;
    write_atomic(output, &png)?;

    debug!(
        "page:{}, id:{}, path: {}",
        element.page,
        element.id,
        output.display()
    );
    Ok(Some(output.to_path_buf()))
}

/// Render each listed page once and crop its elements into `scratch`.
fn crop_pages_blocking(
    source: &SourceDocument,
    work: &[(PageNumber, Vec<LayoutElement>)],
    scratch: &Path,
    dpi: u32,
    lib_path: Option<&Path>,
) -> Result<BTreeMap<ElementId, PathBuf>, PipelineError> {
    std::fs::create_dir_all(scratch).map_err(|e| PipelineError::io(scratch, e))?;
    let mut cropped = BTreeMap::new();

    let mut crop_all = |page_image: &DynamicImage, elements: &[LayoutElement]| {
        for element in elements {
            let output = scratch.join(format!("{}.png", element.id));
            if let Some(path) = crop_element(page_image, element, &output)? {
                cropped.insert(element.id, path);
            }
        }
        Ok::<_, PipelineError>(())
    };

    match source.kind {
        SourceKind::Pdf => {
            let pdfium = bind_pdfium(lib_path)?;
            let document = open_pdf(&pdfium, source.primary_path())?;
            for (page, elements) in work {
                let image = render_page(&document, *page, dpi)?;
                crop_all(&image, elements)?;
            }
        }
        SourceKind::ImageSet => {
            for (page, elements) in work {
                let path = source.paths.get(*page).ok_or_else(|| {
                    PipelineError::RasterisationFailed {
                        page: *page,
                        detail: format!("no input image for page {page}"),
                    }
                })?;
                let image = load_oriented_image(path, *page)?;
                crop_all(&image, elements)?;
            }
        }
    }

    Ok(cropped)
}

/// Shared body of the two crop stages.
async fn crop_category(
    state: &PipelineState,
    ctx: &StageContext<'_>,
    category: ElementCategory,
) -> Result<BTreeMap<ElementId, PathBuf>, PipelineError> {
    let page_numbers = need!(state, page_numbers);
    let page_elements = need!(state, page_elements);

    let work: Vec<(PageNumber, Vec<LayoutElement>)> = page_numbers
        .iter()
        .filter_map(|page| {
            let elements = page_elements.get(page)?.of(category);
            (!elements.is_empty()).then(|| (*page, elements.to_vec()))
        })
        .collect();

    if work.is_empty() {
        debug!("No {:?} elements to crop", category);
        return Ok(BTreeMap::new());
    }

    let source = state.source();
    let scratch = state.scratch_dir();
    let dpi = ctx.config.dpi;
    let lib_path = ctx.config.resolved_pdfium_path();

    let cropped = tokio::task::spawn_blocking(move || {
        crop_pages_blocking(&source, &work, &scratch, dpi, lib_path.as_deref())
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Crop task panicked: {e}")))??;

    info!("Cropped {} {:?} elements", cropped.len(), category);
    Ok(cropped)
}

/// `crop_figures`.
pub async fn crop_figures(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let cropped_figures = crop_category(state, ctx, ElementCategory::Figure).await?;
    Ok(StateUpdate::CroppedFigures { cropped_figures })
}

/// `crop_tables`.
pub async fn crop_tables(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let cropped_tables = crop_category(state, ctx, ElementCategory::Table).await?;
    Ok(StateUpdate::CroppedTables { cropped_tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn pt(x: f64, y: f64) -> Coordinate {
        Coordinate { x, y }
    }

    fn page() -> DynamicImage {
        let mut img = RgbaImage::from_pixel(100, 50, Rgba([255, 255, 255, 255]));
        for x in 10..30 {
            for y in 5..15 {
                img.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        DynamicImage::ImageRgba8(img)
    }

    fn figure(id: ElementId, coordinates: Vec<Coordinate>) -> LayoutElement {
        LayoutElement {
            id,
            page: 0,
            category: "figure".into(),
            coordinates,
            content: None,
        }
    }

    #[test]
    fn bbox_spans_all_points() {
        let b = BoundingBox::from_polygon(&[pt(0.3, 0.1), pt(0.1, 0.4), pt(0.2, 0.2)]).unwrap();
        assert_eq!(
            b,
            BoundingBox {
                x1: 0.1,
                y1: 0.1,
                x2: 0.3,
                y2: 0.4
            }
        );
        assert!(BoundingBox::from_polygon(&[]).is_none());
    }

    #[test]
    fn pixels_truncate_and_clamp() {
        let b = BoundingBox {
            x1: 0.1,
            y1: 0.1,
            x2: 0.3,
            y2: 0.3,
        };
        assert_eq!(
            b.to_pixels(100, 50),
            PixelRect {
                x: 10,
                y: 5,
                width: 20,
                height: 10
            }
        );

        let outside = BoundingBox {
            x1: -0.5,
            y1: 0.9,
            x2: 1.5,
            y2: 2.0,
        };
        let r = outside.to_pixels(100, 50);
        assert_eq!((r.x, r.width), (0, 100));
        assert_eq!((r.y, r.height), (45, 5));
    }

    #[test]
    fn degenerate_box_is_one_pixel() {
        let b = BoundingBox {
            x1: 0.5,
            y1: 0.5,
            x2: 0.5,
            y2: 0.5,
        };
        let r = b.to_pixels(100, 50);
        assert_eq!((r.width, r.height), (1, 1));
    }

    #[test]
    fn crop_cuts_the_right_region() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("3.png");
        let el = figure(3, vec![pt(0.1, 0.1), pt(0.3, 0.1), pt(0.3, 0.3), pt(0.1, 0.3)]);
        let written = crop_element(&page(), &el, &out).unwrap().unwrap();
        let img = image::open(&written).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (20, 10));
        assert!(img.pixels().all(|p| *p == Rgba([0, 0, 255, 255])));
    }

    #[test]
    fn recropping_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("9.png");
        let el = figure(9, vec![pt(0.05, 0.05), pt(0.6, 0.9)]);
        crop_element(&page(), &el, &out).unwrap();
        let first = std::fs::read(&out).unwrap();
        crop_element(&page(), &el, &out).unwrap();
        let second = std::fs::read(&out).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_polygon_is_skipped() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("1.png");
        assert_eq!(crop_element(&page(), &figure(1, vec![]), &out).unwrap(), None);
        assert!(!out.exists());
    }

    #[test]
    fn image_pages_are_cropped_by_position() {
        let dir = TempDir::new().unwrap();
        let p0 = dir.path().join("p0.png");
        let p1 = dir.path().join("p1.png");
        page().save(&p0).unwrap();
        page().save(&p1).unwrap();
        let source = SourceDocument {
            kind: SourceKind::ImageSet,
            paths: vec![p0, p1],
        };
        let scratch = dir.path().join("p0");
        let mut el = figure(4, vec![pt(0.1, 0.1), pt(0.3, 0.3)]);
        el.page = 1;

        let cropped = crop_pages_blocking(&source, &[(1, vec![el])], &scratch, 300, None).unwrap();
        assert_eq!(cropped.len(), 1);
        assert_eq!(cropped[&4], scratch.join("4.png"));
        assert!(cropped[&4].exists());
    }
}
