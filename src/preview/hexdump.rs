//! Paired hex / ASCII rendering.

/// Placeholder for bytes without a printable ASCII form.
const NON_PRINTABLE: char = '.';

/// Renders bytes as space-separated lowercase hex pairs.
///
/// The output has `3 * bytes.len() - 1` characters (no trailing separator),
/// or is empty for no input.
pub fn hex_body(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().saturating_mul(3));
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&hex::encode([*byte]));
    }
    out
}

/// Renders printable ASCII verbatim and everything else as a placeholder.
pub fn ascii_body(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (0x20..=0x7e).contains(&b) {
                b as char
            } else {
                NON_PRINTABLE
            }
        })
        .collect()
}
