//! Column name -> field name conversion.

/// Derive a camelCase field name from a column name.
/// e.g. "LONG_VALUE" -> "longValue", "VALUE_1" -> "value1", "ID" -> "id"
///
/// The first character is lowercased, every `_` is dropped and the character after it is
/// uppercased, all other characters are lowercased.
pub fn to_field_name(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut chars = column.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_lowercase());
    }
    while let Some(c) = chars.next() {
        if c == '_' {
            if let Some(next) = chars.next() {
                out.extend(next.to_uppercase());
            }
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}
