//! Slug derivation for article titles.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Maximum slug length in characters.
const MAX_SLUG_LEN: usize = 100;

/// Base form used when a title normalizes to nothing.
const EMPTY_TITLE_BASE: &str = "article";

/// Convert a title into a URL-safe slug: diacritics stripped via NFD
/// decomposition, lower-cased, runs of non-alphanumerics collapsed to single
/// hyphens, no leading or trailing hyphen, capped at 100 characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}

/// Derive a slug that passes the caller's existence probe. The probe is
/// expected to be bound to the store and, on updates, to exclude the
/// article's own current slug. On collision a Unix-seconds disambiguator is
/// appended, then a sub-second one for the astronomically unlikely second
/// collision. Best-effort only: under a concurrent race on the same instant
/// the store's unique index decides, and the loser surfaces a conflict.
pub fn generate_unique_slug<F>(title: &str, mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let mut base = slugify(title);
    if base.is_empty() {
        base = EMPTY_TITLE_BASE.to_string();
    }

    if !exists(&base) {
        return base;
    }

    let now = chrono::Utc::now();
    let mut slug = format!("{}-{}", base, now.timestamp());
    if exists(&slug) {
        slug = format!(
            "{}-{}-{}",
            base,
            now.timestamp(),
            now.timestamp_subsec_nanos() % 1000
        );
    }
    log::debug!("slug {:?} is taken, using {:?}", base, slug);
    slug
}
