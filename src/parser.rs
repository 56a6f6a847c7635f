//! Upstream body parsing
//!
//! The guest counter answers with a bare integer, sometimes wrapped in JSON
//! string quotes (`"42"`). Quotes are stripped, then the rest must be a
//! base-10 signed integer with nothing else around it.

use crate::error::CycleError;

/// Parse a raw response body into an integer
///
/// All `"` characters are removed before parsing. Whitespace, multiple tokens,
/// an empty body or invalid UTF-8 are rejected.
///
/// # Examples
///
/// ```
/// use obloc_exporter::parser::parse_value;
///
/// assert_eq!(parse_value(b"\"42\"").unwrap(), 42);
/// assert_eq!(parse_value(b"42").unwrap(), 42);
/// assert!(parse_value(b"abc").is_err());
/// ```
pub fn parse_value(body: &[u8]) -> Result<i64, CycleError> {
    let text = std::str::from_utf8(body).map_err(|e| CycleError::Parse {
        body: String::from_utf8_lossy(body).into_owned(),
        reason: format!("body is not valid UTF-8: {}", e),
    })?;

    let normalized = text.replace('"', "");

    normalized.parse::<i64>().map_err(|e| CycleError::Parse {
        body: text.to_string(),
        reason: e.to_string(),
    })
}
