use std::path::Path;

/// Rejection raised before any upload byte touches the disk
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Returns the lowercase extension of `filename` when it is in `allowed`
pub fn allowed_extension(filename: &str, allowed: &[String]) -> Option<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();

    allowed.iter().any(|a| *a == ext).then_some(ext)
}

/// Validates the declared media type of an upload
pub fn validate_media_type(content_type: Option<&str>) -> Result<(), ValidationError> {
    let normalized = content_type
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if normalized.starts_with("video/") {
        return Ok(());
    }

    Err(ValidationError::new(
        "INVALID_MEDIA_TYPE",
        "Only video files can be uploaded",
    ))
}

/// Validates the file extension of an upload (case-insensitive)
pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<(), ValidationError> {
    if allowed_extension(filename, allowed).is_some() {
        return Ok(());
    }

    let formats = allowed
        .iter()
        .map(|e| e.to_uppercase())
        .collect::<Vec<_>>()
        .join(" / ");
    Err(ValidationError::new(
        "UNSUPPORTED_EXTENSION",
        format!("Supported formats are {} only", formats),
    ))
}

/// Longest sanitized filename in bytes.
///
/// Stored uploads are named `{uuid}_{filename}`; 37 bytes of prefix plus this
/// stays within the 255 byte NAME_MAX of common filesystems.
pub const MAX_FILENAME_BYTES: usize = 255 - 37;

fn clean_filename(filename: &str) -> Result<String, ValidationError> {
    // Clients on Windows send backslash separated paths
    let last = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            "Filename cannot be empty",
        ));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload filename: {}", filename);
    }

    Ok(name
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' => '_',
            c => c,
        })
        .collect())
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Cuts `name` to at most `max` bytes, shortening the stem so the extension
/// survives whenever it fits
pub fn shorten_filename(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }

    match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot < max => {
            let (stem, ext) = name.split_at(dot);
            let end = floor_char_boundary(stem, max - ext.len());
            format!("{}{}", &stem[..end], ext)
        }
        _ => name[..floor_char_boundary(name, max)].to_string(),
    }
}

/// Reduces a client supplied filename to a safe single path component of at
/// most [`MAX_FILENAME_BYTES`]
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    let cleaned = clean_filename(filename)?;
    Ok(shorten_filename(&cleaned, MAX_FILENAME_BYTES))
}

/// Full pre-write check of an upload: media type, filename, extension.
///
/// Returns the sanitized filename to store the upload under.
pub fn validate_upload(
    filename: Option<&str>,
    content_type: Option<&str>,
    allowed: &[String],
) -> Result<String, ValidationError> {
    validate_media_type(content_type)?;

    let filename = filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| ValidationError::new("MISSING_FILENAME", "No filename was provided"))?;

    // Extension is judged on the full name, before any shortening
    let cleaned = clean_filename(filename)?;
    validate_extension(&cleaned, allowed)?;
    Ok(shorten_filename(&cleaned, MAX_FILENAME_BYTES))
}

/// Checks that a requested result name is a bare file name
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.chars().any(|c| c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        ["mp4", "mov", "m4v", "avi", "mkv"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_allowed_extensions_case_insensitive() {
        let allowed = allowed();
        for name in ["a.mp4", "b.MOV", "c.m4v", "d.Avi", "e.mkv", "f.tar.MP4"] {
            assert!(validate_extension(name, &allowed).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejected_extensions() {
        let allowed = allowed();
        for name in ["a.webm", "b.exe", "noext", "c.mp4.txt", ".mp4x"] {
            let err = validate_extension(name, &allowed).unwrap_err();
            assert_eq!(err.code, "UNSUPPORTED_EXTENSION");
        }
    }

    #[test]
    fn test_validate_media_type() {
        assert!(validate_media_type(Some("video/mp4")).is_ok());
        assert!(validate_media_type(Some("Video/QuickTime; codecs=x")).is_ok());
        assert!(validate_media_type(Some("image/png")).is_err());
        assert!(validate_media_type(Some("application/octet-stream")).is_err());
        assert!(validate_media_type(None).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(sanitize_filename("my clip.mov").unwrap(), "my clip.mov");
        assert_eq!(sanitize_filename("../../etc/x.mp4").unwrap(), "x.mp4");
        assert_eq!(sanitize_filename("C:\\videos\\run.mkv").unwrap(), "run.mkv");
        assert_eq!(sanitize_filename("a<b>.mp4").unwrap(), "a_b_.mp4");
        assert_eq!(sanitize_filename("走る.mp4").unwrap(), "走る.mp4");
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("dir/").is_err());

        let long = format!("{}.mp4", "a".repeat(300));
        let sanitized = sanitize_filename(&long).unwrap();
        assert_eq!(sanitized.len(), MAX_FILENAME_BYTES);
        assert!(sanitized.ends_with(".mp4"));
    }

    #[test]
    fn test_shorten_filename() {
        assert_eq!(shorten_filename("clip.mp4", 20), "clip.mp4");
        assert_eq!(shorten_filename("abcdefgh.mkv", 8), "abcd.mkv");
        // Multi-byte stems are cut on a char boundary
        assert_eq!(shorten_filename("走走走.mp4", 10), "走走.mp4");
        assert_eq!(shorten_filename("noextension", 4), "noex");
        assert_eq!(shorten_filename("a.verylongext", 5), "a.ver");
    }

    #[test]
    fn test_long_names_keep_allowed_extension() {
        let allowed = allowed();
        for len in [200, 218, 219, 230, 255, 260, 1000] {
            let name = format!("{}.MOV", "a".repeat(len));
            let stored = validate_upload(Some(&name), Some("video/quicktime"), &allowed).unwrap();
            assert!(stored.len() <= MAX_FILENAME_BYTES, "{len}");
            assert!(stored.ends_with(".MOV"), "{len}");
        }

        let name = format!("{}.exe", "a".repeat(300));
        let err = validate_upload(Some(&name), Some("video/mp4"), &allowed).unwrap_err();
        assert_eq!(err.code, "UNSUPPORTED_EXTENSION");
    }

    #[test]
    fn test_validate_upload_order() {
        let allowed = allowed();
        let err = validate_upload(Some("x.exe"), Some("image/png"), &allowed).unwrap_err();
        assert_eq!(err.code, "INVALID_MEDIA_TYPE");

        let err = validate_upload(None, Some("video/mp4"), &allowed).unwrap_err();
        assert_eq!(err.code, "MISSING_FILENAME");

        assert_eq!(
            validate_upload(Some("squat.MP4"), Some("video/mp4"), &allowed).unwrap(),
            "squat.MP4"
        );
    }

    #[test]
    fn test_is_safe_file_name() {
        assert!(is_safe_file_name("skeleton_abc.mp4"));
        assert!(!is_safe_file_name("../secret"));
        assert!(!is_safe_file_name("a/b.mp4"));
        assert!(!is_safe_file_name(""));
    }
}
