//! Template helpers

use handlebars::{Handlebars, handlebars_helper};
use serde_json::Value;

handlebars_helper!(indent: |width: u64, input: str| indent_lines(width, input));

handlebars_helper!(bytes_indent: |width: u64, input: Json| {
    let bytes = json_bytes(input);
    indent_lines(width, &String::from_utf8_lossy(&bytes))
});

handlebars_helper!(yaml_quote: |input: str| Value::String(input.to_string()).to_string());

/// Register `indent`, `bytes_indent` and `yaml_quote`.
pub(crate) fn register(registry: &mut Handlebars<'_>) {
    registry.register_helper("indent", Box::new(indent));
    registry.register_helper("bytes_indent", Box::new(bytes_indent));
    registry.register_helper("yaml_quote", Box::new(yaml_quote));
}

/// Prefix every line of `input`, including the first, with `width` spaces.
///
/// A trailing newline yields a final whitespace-only line.
pub(crate) fn indent_lines(width: u64, input: &str) -> String {
    let pad = " ".repeat(usize::try_from(width).unwrap_or_default());
    format!("{pad}{}", input.replace('\n', &format!("\n{pad}")))
}

/// Byte slices reach templates as JSON arrays of numbers.
fn json_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        Value::String(s) => s.as_bytes().to_vec(),
        _ => Vec::new(),
    }
}
