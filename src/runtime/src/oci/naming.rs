//! Content-addressed directory naming.
//!
//! An image reference maps to a store directory name by encoding the raw
//! reference bytes with unpadded URL-safe base64. The mapping is
//! deterministic and injective, and the output alphabet (`A-Z a-z 0-9 - _`)
//! contains no path separators, dots, or control characters.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Directory name for an image reference.
///
/// No normalization is applied: `docker:Alpine` and `docker:alpine`
/// are different images.
pub fn directory_name(reference: &str) -> String {
    URL_SAFE_NO_PAD.encode(reference.as_bytes())
}

/// Recover the reference a directory name was derived from.
///
/// Returns None if `name` is not a valid encoding of a UTF-8 string.
pub fn reference_for(name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(name.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}
