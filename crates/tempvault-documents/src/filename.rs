//! Download filename sanitizing.

/// Characters that may not appear in a `Content-Disposition` filename.
const UNSAFE: [char; 10] = ['\\', '/', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Make `original` safe for a `Content-Disposition` header.
///
/// Unsafe characters become `_`. A blank name falls back to
/// `document-<id>`.
///
/// # Examples
///
/// ```
/// use tempvault_documents::sanitize_filename;
///
/// assert_eq!(sanitize_filename("a/b\\c?d\"e", "x"), "a_b_c_d_e");
/// assert_eq!(sanitize_filename("  ", "x"), "document-x");
/// ```
#[must_use]
pub fn sanitize_filename(original: &str, id: &str) -> String {
    let trimmed = original.trim();
    if trimmed.is_empty() {
        return format!("document-{id}");
    }
    trimmed
        .chars()
        .map(|c| if UNSAFE.contains(&c) || c.is_control() { '_' } else { c })
        .collect()
}
