//! A1-style cell references.
//!
//! Columns use bijective base-26: 1 → `A`, 26 → `Z`, 27 → `AA`.

/// Letter label for a 1-indexed column. Column 0 has no label.
pub fn column_label(col: u32) -> String {
    let mut letters = Vec::new();
    let mut rest = col;
    while rest > 0 {
        rest -= 1;
        letters.push(char::from(b'A' + (rest % 26) as u8));
        rest /= 26;
    }
    letters.iter().rev().collect()
}

/// Inverse of [`column_label`]. Accepts upper-case letters only.
pub fn column_index(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    label.bytes().try_fold(0_u32, |acc, b| {
        if !b.is_ascii_uppercase() {
            return None;
        }
        acc.checked_mul(26)?.checked_add(u32::from(b - b'A') + 1)
    })
}

/// Full reference such as `AA12`.
pub fn a1(row: u32, col: u32) -> String {
    format!("{}{row}", column_label(col))
}
