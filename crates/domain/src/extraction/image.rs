use std::{fmt, path::Path};

use crate::errors::Error;

pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Uploaded prescription, validated on construction and never persisted
#[derive(Clone, Eq, PartialEq)]
pub struct PrescriptionImage {
    bytes: Vec<u8>,
    mime_type: &'static str,
}

impl PrescriptionImage {
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::input("prescription image is empty"));
        }

        let mime_type = normalize_mime_type(mime_type).ok_or_else(|| {
            Error::input(format!(
                "unsupported image type '{}', expected one of: jpg, jpeg, png",
                mime_type
            ))
        })?;

        Ok(Self { bytes, mime_type })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for PrescriptionImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrescriptionImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Maps a declared content type onto one of [`ALLOWED_MIME_TYPES`]
pub fn normalize_mime_type(raw: &str) -> Option<&'static str> {
    let essence = raw.split(';').next().unwrap_or("").trim().to_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("image/jpeg"),
        "image/png" => Some("image/png"),
        _ => None,
    }
}

/// MIME type by file extension, for uploads that arrive without one
pub fn mime_type_from_file_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_jpeg_and_png() {
        let image = PrescriptionImage::new(vec![1, 2, 3], "image/png").unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.len(), 3);

        let image = PrescriptionImage::new(vec![1], "IMAGE/JPG; charset=binary").unwrap();
        assert_eq!(image.mime_type(), "image/jpeg");
    }

    #[test]
    fn rejects_empty_bytes() {
        let err = PrescriptionImage::new(Vec::new(), "image/png").unwrap_err();
        assert!(matches!(err, Error::Input { .. }));
    }

    #[test]
    fn rejects_other_types() {
        for mime in ["image/gif", "application/pdf", ""] {
            let err = PrescriptionImage::new(vec![1], mime).unwrap_err();
            assert!(matches!(err, Error::Input { .. }), "{mime} should be rejected");
        }
    }

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(mime_type_from_file_name("scan.JPG"), Some("image/jpeg"));
        assert_eq!(mime_type_from_file_name("rx.png"), Some("image/png"));
        assert_eq!(mime_type_from_file_name("prescription"), None);
    }
}
