//! Name cleaning rules for catalog objects.
//!
//! Two different rules exist on purpose: the physical table name must be a
//! safe catalog identifier, while the folder segment must match the path the
//! extraction platform writes to.

/// Physical catalog name for a discovered table.
///
/// Lowercases ASCII letters and collapses every run of non-alphanumeric
/// characters into a single `_`.
pub fn physical_table_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            in_run = false;
            out.push(ch.to_ascii_lowercase());
        } else if !in_run {
            in_run = true;
            out.push('_');
        }
    }
    out
}

/// Storage folder segment for a discovered table: spaces become `_`,
/// everything else is kept as the platform reported it.
pub fn table_folder_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Clean a top-level column name: path separators become `_`.
pub fn clean_column_name(name: &str, lowercase: bool) -> String {
    let cleaned = name.replace('.', "_");
    if lowercase {
        cleaned.to_lowercase()
    } else {
        cleaned
    }
}
