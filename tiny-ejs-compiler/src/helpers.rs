//! Default escape and stringify hooks

use serde_json::Value;

/// Replaces `& < > ' "` with their named entities.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Default conversion of an expression result to text.
///
/// Null renders as the empty string, arrays join their stringified elements
/// with commas, objects render as `[object Object]`.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stringify).collect();
            parts.join(",")
        }
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Formats a number the way a script runtime prints it: integral values
/// drop the fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn escapes_the_five_special_characters() {
        assert_eq!(
            escape_xml("&nbsp;<script>'s"),
            "&amp;nbsp;&lt;script&gt;&apos;s"
        );
        assert_eq!(escape_xml(r#"a"b"#), "a&quot;b");
        assert_eq!(escape_xml(""), "");
        assert_eq!(escape_xml("plain"), "plain");
    }

    #[test]
    fn stringify_null_is_empty() {
        assert_eq!(stringify(&Value::Null), "");
    }

    #[test]
    fn stringify_zero_is_zero() {
        assert_eq!(stringify(&json!(0)), "0");
    }

    #[test]
    fn stringify_natural_forms() {
        assert_eq!(stringify(&json!(5)), "5");
        assert_eq!(stringify(&json!(12.25)), "12.25");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!("x")), "x");
        assert_eq!(stringify(&json!(["a", 1, null])), "a,1,");
        assert_eq!(stringify(&json!({"a": 1})), "[object Object]");
    }
}
