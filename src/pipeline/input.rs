//! Input resolution: validate driver inputs before any stage runs.
//!
//! Everything that can be rejected up front is rejected here, so the graph
//! only ever sees a well-formed [`SourceDocument`]: one readable PDF with a
//! `%PDF` header, or a non-empty ordered list of readable images.

use crate::config::SourceKind;
use crate::error::PipelineError;
use crate::state::SourceDocument;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Image extensions accepted for image-set runs.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

/// Raw driver input: file paths plus an optional declared type.
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    pub paths: Vec<PathBuf>,
    /// Declared type; inferred from extensions when `None`.
    pub kind: Option<SourceKind>,
}

impl DocumentInput {
    /// A single PDF.
    pub fn pdf(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            kind: Some(SourceKind::Pdf),
        }
    }

    /// An ordered set of page images.
    pub fn images<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            kind: Some(SourceKind::ImageSet),
        }
    }

    /// Paths only; the kind is inferred.
    pub fn infer<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            kind: None,
        }
    }
}

/// Classify one path by extension.
pub fn kind_of(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == "pdf" {
        Some(SourceKind::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::ImageSet)
    } else {
        None
    }
}

/// Validate the driver input and produce the run's source document.
pub fn resolve_input(input: &DocumentInput) -> Result<SourceDocument, PipelineError> {
    if input.paths.is_empty() {
        return Err(PipelineError::NoInput);
    }

    let mut inferred = None;
    for path in &input.paths {
        let kind = kind_of(path).ok_or_else(|| PipelineError::UnsupportedFileType {
            path: path.clone(),
        })?;
        if let Some(declared) = input.kind {
            if declared != kind {
                return Err(PipelineError::UnsupportedFileType { path: path.clone() });
            }
        }
        match (inferred, kind) {
            (Some(SourceKind::Pdf), _) | (Some(_), SourceKind::Pdf) => {
                return Err(PipelineError::MultiplePdfInputs {
                    count: input.paths.len(),
                });
            }
            _ => inferred = Some(kind),
        }
    }

    let kind = inferred.ok_or(PipelineError::NoInput)?;
    for path in &input.paths {
        check_readable(path, kind)?;
    }

    debug!("Resolved {} input with {} file(s)", kind, input.paths.len());
    Ok(SourceDocument {
        kind,
        paths: input.paths.clone(),
    })
}

/// Check a file exists and is readable; PDFs must also start with `%PDF`.
fn check_readable(path: &Path, kind: SourceKind) -> Result<(), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(f) => {
            if kind == SourceKind::Pdf {
                // a file shorter than the magic is not a PDF either
                let mut head = Vec::with_capacity(4);
                f.take(4)
                    .read_to_end(&mut head)
                    .map_err(|e| PipelineError::io(path, e))?;
                if head != b"%PDF" {
                    let mut magic = [0u8; 4];
                    magic[..head.len()].copy_from_slice(&head);
                    return Err(PipelineError::NotAPdf {
                        path: path.to_path_buf(),
                        magic,
                    });
                }
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[test]
    fn kind_by_extension() {
        assert_eq!(kind_of(Path::new("a.PDF")), Some(SourceKind::Pdf));
        assert_eq!(kind_of(Path::new("scan.jpeg")), Some(SourceKind::ImageSet));
        assert_eq!(kind_of(Path::new("notes.txt")), None);
        assert_eq!(kind_of(Path::new("noext")), None);
    }

    #[test]
    fn empty_input_rejected() {
        let err = resolve_input(&DocumentInput::default()).unwrap_err();
        assert!(matches!(err, PipelineError::NoInput));
    }

    #[test]
    fn single_pdf_accepted() {
        let dir = TempDir::new().unwrap();
        let p = touch(&dir, "doc.pdf", b"%PDF-1.7\n");
        let src = resolve_input(&DocumentInput::infer([&p])).unwrap();
        assert_eq!(src.kind, SourceKind::Pdf);
        assert_eq!(src.paths, vec![p]);
    }

    #[test]
    fn two_pdfs_rejected() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.pdf", b"%PDF");
        let b = touch(&dir, "b.pdf", b"%PDF");
        let err = resolve_input(&DocumentInput::infer([a, b])).unwrap_err();
        assert!(matches!(err, PipelineError::MultiplePdfInputs { count: 2 }));
    }

    #[test]
    fn pdf_mixed_with_image_rejected() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.png", b"png");
        let b = touch(&dir, "b.pdf", b"%PDF");
        let err = resolve_input(&DocumentInput::infer([a, b])).unwrap_err();
        assert!(matches!(err, PipelineError::MultiplePdfInputs { .. }));
    }

    #[test]
    fn fake_pdf_rejected() {
        let dir = TempDir::new().unwrap();
        let p = touch(&dir, "fake.pdf", b"GIF89a");
        let err = resolve_input(&DocumentInput::pdf(&p)).unwrap_err();
        assert!(matches!(err, PipelineError::NotAPdf { .. }));
    }

    #[test]
    fn truncated_pdf_is_not_a_pdf() {
        let dir = TempDir::new().unwrap();
        for (name, bytes) in [("empty.pdf", &b""[..]), ("short.pdf", &b"%PD"[..])] {
            let p = touch(&dir, name, bytes);
            let err = resolve_input(&DocumentInput::pdf(&p)).unwrap_err();
            assert!(
                matches!(err, PipelineError::NotAPdf { .. }),
                "{name}: got {err:?}"
            );
        }
        let p = touch(&dir, "short.pdf", b"%PD");
        match resolve_input(&DocumentInput::pdf(&p)).unwrap_err() {
            PipelineError::NotAPdf { magic, .. } => assert_eq!(&magic, b"%PD\0"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unsupported_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let p = touch(&dir, "notes.txt", b"hi");
        let err = resolve_input(&DocumentInput::infer([p])).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFileType { .. }));
    }

    #[test]
    fn declared_kind_must_match() {
        let dir = TempDir::new().unwrap();
        let p = touch(&dir, "page.png", b"png");
        let err = resolve_input(&DocumentInput {
            paths: vec![p],
            kind: Some(SourceKind::Pdf),
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFileType { .. }));
    }

    #[test]
    fn missing_file_rejected() {
        let err = resolve_input(&DocumentInput::images(["/definitely/not/here.png"])).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn image_set_keeps_order() {
        let dir = TempDir::new().unwrap();
        let b = touch(&dir, "b.png", b"x");
        let a = touch(&dir, "a.jpg", b"x");
        let src = resolve_input(&DocumentInput::images([&b, &a])).unwrap();
        assert_eq!(src.kind, SourceKind::ImageSet);
        assert_eq!(src.paths, vec![b, a]);
    }
}
