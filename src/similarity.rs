#![forbid(unsafe_code)]

//! Title comparison helpers shared by the upload-time check and the
//! full-catalog scan.
//!
//! Everything here works on `char`s rather than bytes so that titles in
//! non-Latin scripts get the same treatment as ASCII ones.

/// Lowercases `title` and drops every character that is not alphanumeric.
///
/// `"The Great Escape!!"` and `"the great escape"` both become
/// `"thegreatescape"`, which is what the store indexes as `title_normalized`.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Classic edit distance (insert, delete and substitute all cost 1) using a
/// single DP row.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        // `diagonal` holds row[j - 1] from the previous iteration.
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Scores two strings between 0 and 1, where 1 means identical.
///
/// Substring pairs short-circuit to `len(shorter) / len(longer)`; anything
/// else falls back to the normalized Levenshtein distance.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let (shorter, longer, short_len, long_len) = if a_len <= b_len {
        (a, b, a_len, b_len)
    } else {
        (b, a, b_len, a_len)
    };
    if short_len == 0 {
        return 0.0;
    }

    if longer.contains(shorter) {
        return short_len as f64 / long_len as f64;
    }

    let distance = levenshtein(a, b);
    (long_len - distance) as f64 / long_len as f64
}
