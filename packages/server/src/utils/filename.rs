/// Why an uploaded filename was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum FilenameError {
    Empty,
    /// Contains `/` or `\`.
    ContainsPathSeparator,
    /// Contains NUL or other control characters (CR/LF would break headers).
    ControlCharacter,
    TooLong,
}

impl FilenameError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::ContainsPathSeparator => "Invalid filename: path separators are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
            Self::TooLong => "Filename must be at most 255 characters",
        }
    }
}

/// Validate the client-supplied name of an uploaded file.
pub fn validate_upload_filename(filename: &str) -> Result<&str, FilenameError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(FilenameError::Empty);
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(FilenameError::ControlCharacter);
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }
    if trimmed.chars().count() > 255 {
        return Err(FilenameError::TooLong);
    }

    Ok(trimmed)
}

/// Build a `Content-Disposition` value with an ASCII fallback and an
/// RFC 5987 `filename*` for the exact name.
pub fn content_disposition_value(filename: &str, inline: bool) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => String::from(b as char),
            _ => format!("%{b:02X}"),
        })
        .collect();

    let kind = if inline { "inline" } else { "attachment" };
    format!("{kind}; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
