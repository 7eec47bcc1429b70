//! Resource locators for listed databases and tables.
//!
//! Locators are pure labels: no I/O, no credentials. Every component is
//! percent-encoded (all but RFC 3986 unreserved characters), so a name
//! containing `/`, `?`, `#`, `@`, `:` or spaces cannot change the structure
//! of the locator.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Scheme prefix shared by every locator.
pub const LOCATOR_SCHEME: &str = "postgres://";

/// Characters left untouched: ALPHA / DIGIT / "-" / "." / "_" / "~".
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

/// Locator for an object (table) inside a database schema.
///
/// Produces `postgres://{database}/{object}/{schema}`.
pub fn locate(database_name: &str, schema_name: &str, object_name: &str) -> String {
    format!(
        "{}{}/{}/{}",
        LOCATOR_SCHEME,
        encode(database_name),
        encode(object_name),
        encode(schema_name)
    )
}

/// Locator for a whole database: `postgres://{database}`.
pub fn locate_database(database_name: &str) -> String {
    format!("{}{}", LOCATOR_SCHEME, encode(database_name))
}
