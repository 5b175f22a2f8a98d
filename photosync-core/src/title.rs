//! The single, case-sensitive, validating definition of "auto-generated title".
//!
//! `title_from_filename` is pure and deterministic: the reconciliation engine
//! uses it both to generate a title for a newly discovered file and to decide,
//! by re-running it over the *stored* filename, whether a stored title still
//! looks auto-generated and is therefore safe to regenerate.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

const CAMERA_PREFIXES: &[&str] = &["DSCN", "DSC", "PHOTO", "IMAGE", "PIC", "IMG", "P"];

static DATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"20\d{2}[-_]?(?:0[1-9]|1[0-2])[-_]?(?:0[1-9]|[12]\d|3[01])").unwrap()
});

static TIME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[01]\d|2[0-3])[-_]?[0-5]\d[-_]?[0-5]\d").unwrap());

static LEADING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,4}[-_]").unwrap());
static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_]\d{1,4}$").unwrap());
static SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_]+").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Derives a human display title from a filename (with or without extension).
pub fn title_from_filename(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let mut working = strip_camera_prefix(stem);
    working = DATE_TOKEN.replace_all(&working, "").into_owned();
    working = TIME_TOKEN.replace_all(&working, "").into_owned();
    working = strip_bounded_digit_runs(&working);

    let collapsed = SEPARATOR_RUN.replace_all(&working, " ").into_owned();
    let collapsed = WHITESPACE_RUN.replace_all(collapsed.trim(), " ").into_owned();
    let trimmed = collapsed.trim();

    if trimmed.is_empty() {
        return title_case(&fallback_from_stem(stem));
    }

    title_case(trimmed)
}

fn strip_camera_prefix(stem: &str) -> String {
    for prefix in CAMERA_PREFIXES {
        if let Some(rest) = stem.strip_prefix(prefix) {
            if let Some(sep) = rest.chars().next() {
                if sep == '-' || sep == '_' {
                    return rest[sep.len_utf8()..].to_string();
                }
            }
        }
    }
    stem.to_string()
}

fn strip_bounded_digit_runs(s: &str) -> String {
    let mut working = s.to_string();
    loop {
        let before = working.clone();
        working = LEADING_DIGITS.replace(&working, "").into_owned();
        working = TRAILING_DIGITS.replace(&working, "").into_owned();
        if working == before {
            break;
        }
    }
    working
}

fn fallback_from_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect()
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>()
                        + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
