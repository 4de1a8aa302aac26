use anyhow::{Result, anyhow};
use std::path::Path;

/// Extensions the uploads route is willing to serve
const SERVABLE_EXTENSIONS: &[(&str, &str)] = &[
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("geojson", "application/geo+json"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

/// Magic byte signatures for the raster formats we produce or accept
const MAGIC_SIGNATURES: &[(&[u8], &str)] = &[
    (&[0x49, 0x49, 0x2A, 0x00], "image/tiff"), // little-endian TIFF
    (&[0x4D, 0x4D, 0x00, 0x2A], "image/tiff"), // big-endian TIFF
    (&[0x89, 0x50, 0x4E, 0x47], "image/png"),
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Checks that a requested name refers to a plain file directly inside the
/// upload directory. Unlike an upload, a download must not be rewritten into
/// some other name, so anything suspicious is rejected outright.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    if filename.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        }));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
        return Err(anyhow!(ValidationError {
            code: "PATH_TRAVERSAL",
            message: format!("Invalid filename: {}", filename),
        }));
    }

    if filename.chars().any(|c| {
        c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
    }) {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: format!("Filename contains reserved characters: {}", filename),
        }));
    }

    // Hidden names cover the placeholder and in-flight partial writes
    if filename.starts_with('.') {
        return Err(anyhow!(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not served".to_string(),
        }));
    }

    if filename.len() > 255 {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename is too long".to_string(),
        }));
    }

    Ok(filename.to_string())
}

/// Content type for a stored file, chosen by extension
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    SERVABLE_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Checks magic bytes to verify actual file type matches claimed type
pub fn verify_magic_bytes(header: &[u8], claimed_mime: &str) -> Result<()> {
    if header.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_FILE",
            message: "File is empty".to_string(),
        }));
    }

    let matches = MAGIC_SIGNATURES
        .iter()
        .any(|(sig, mime)| *mime == claimed_mime && header.starts_with(sig));

    if matches {
        Ok(())
    } else {
        Err(anyhow!(ValidationError {
            code: "MAGIC_MISMATCH",
            message: format!("File content does not look like {}", claimed_mime),
        }))
    }
}
