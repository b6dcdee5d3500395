//! Collision-free key assignment against the accumulated catalog.

use crate::constants::{FALLBACK_KEY, SENTINEL_KEY};
use crate::pipeline::catalog::Catalog;

/// Whether `key` is unavailable to real items regardless of catalog contents.
pub fn is_reserved(key: &str) -> bool {
    key == SENTINEL_KEY
}

/// Turn a suggested key into one not yet used by `catalog`.
///
/// Keys are lowercased, then suffixed `_2`, `_3`, ... until free. A blank
/// suggestion becomes `generic_icon`. The sentinel `default` counts as taken
/// even before the record exists, so no item can claim it ahead of
/// finalization.
pub fn reserve_key(suggested: &str, catalog: &Catalog) -> String {
    let trimmed = suggested.trim();
    let base = if trimmed.is_empty() {
        FALLBACK_KEY.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    };

    if !is_taken(&base, catalog) {
        return base;
    }

    let mut suffix: usize = 2;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !is_taken(&candidate, catalog) {
            return candidate;
        }
        suffix += 1;
    }
}

fn is_taken(key: &str, catalog: &Catalog) -> bool {
    is_reserved(key) || catalog.contains_key(key)
}
