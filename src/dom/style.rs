//! Inline style attribute parsing and emission.
//!
//! Styles are kept as an ordered list of `(property, value)` pairs and
//! written back as `prop:value;prop:value;`.

/// Parse a `style` attribute into ordered `(property, value)` pairs.
///
/// Empty declarations and declarations without a `:` are skipped; property
/// and value are trimmed.
pub fn parse_style_attr(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (key, value) = decl.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Emit `(property, value)` pairs as a `style` attribute.
pub fn emit_style_attr(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(key, value)| format!("{key}:{value};"))
        .collect()
}

/// Set (or with `None` remove) one property, keeping declaration order.
pub fn with_style_value(style: &str, property: &str, value: Option<&str>) -> String {
    let mut declarations = parse_style_attr(style);
    match value {
        Some(value) => {
            if let Some(entry) = declarations.iter_mut().find(|(k, _)| k == property) {
                entry.1 = value.to_string();
            } else {
                declarations.push((property.to_string(), value.to_string()));
            }
        }
        None => declarations.retain(|(k, _)| k != property),
    }
    emit_style_attr(&declarations)
}

/// Merge `extra` declarations into `style` (later values win).
pub fn merge_style(style: &str, extra: &str) -> String {
    parse_style_attr(extra)
        .into_iter()
        .fold(style.to_string(), |acc, (k, v)| with_style_value(&acc, &k, Some(&v)))
}

/// Read one property.
pub fn style_value(style: &str, property: &str) -> Option<String> {
    parse_style_attr(style)
        .into_iter()
        .find(|(k, _)| k == property)
        .map(|(_, v)| v)
}

/// Parse a CSS pixel length such as `12px` or `12.5`.
pub fn parse_px(value: &str) -> Option<f64> {
    let value = value.trim();
    value.strip_suffix("px").unwrap_or(value).trim().parse().ok()
}
