//! Path search over the catalog
//!
//! Matches cataloged paths against a regular expression and resolves the
//! metadata of each distinct content hash once, however many paths share it.

use crate::catalog::{Catalog, CatalogEntry, SqliteCatalog};
use crate::error::{CatalogError, CatalogResult};
use crate::format::Listing;
use regex::Regex;
use tracing::debug;

/// Compile a search expression
pub fn compile(pattern: &str) -> CatalogResult<Regex> {
    Regex::new(pattern).map_err(|e| CatalogError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Search the catalog for paths matching `pattern`
pub fn search(catalog: &mut SqliteCatalog, pattern: &str) -> CatalogResult<Listing> {
    let regex = compile(pattern)?;
    let matches = catalog.search(&regex)?;
    debug!(pattern, matches = matches.len(), "Search matched");
    resolve(matches, catalog)
}

/// Group `entries` by path and look up each distinct hash's metadata
pub fn resolve<C: Catalog>(entries: Vec<CatalogEntry>, catalog: &mut C) -> CatalogResult<Listing> {
    let mut listing = Listing::new();
    for entry in entries {
        listing.add_entry(entry);
    }

    for hash in listing.content_hashes() {
        if let Some(metadata) = catalog.lookup_metadata(&hash)? {
            listing.set_metadata(&hash, metadata);
        }
    }
    Ok(listing)
}
