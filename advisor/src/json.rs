//! Pulls a JSON object out of free-form model output.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{AdvisorError, AdvisorResult};

/// Extracts and parses the first JSON object in `raw`.
///
/// Accepts fenced code blocks, leading prose and trailing commentary, and
/// repairs trailing commas and typographic quotes before giving up.
pub fn extract_json(raw: &str) -> AdvisorResult<Value> {
    let unfenced = strip_fences(raw);
    let candidate = balanced_object(unfenced)
        .or_else(|| balanced_object(raw))
        .ok_or_else(|| AdvisorError::Parse("no JSON object found".to_string()))?;

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(value);
    }
    let without_commas = strip_trailing_commas(candidate);
    if let Ok(value) = serde_json::from_str::<Value>(&without_commas) {
        return Ok(value);
    }
    let requoted = without_commas.replace(['“', '”'], "\"");
    let requoted = balanced_object(&requoted).unwrap_or(&requoted).to_string();
    serde_json::from_str::<Value>(&strip_trailing_commas(&requoted))
        .map_err(|err| AdvisorError::Parse(err.to_string()))
}

pub fn parse_contract<T: DeserializeOwned>(raw: &str) -> AdvisorResult<T> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).map_err(|err| AdvisorError::Parse(err.to_string()))
}

fn strip_fences(raw: &str) -> &str {
    let Some(start) = raw.find("```") else {
        return raw;
    };
    let after = &raw[start + 3..];
    // skip the language tag line
    let body = match after.find('\n') {
        Some(newline) => &after[newline + 1..],
        None => after,
    };
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (idx, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::CurrencyPrediction;
    use serde_json::json;

    #[test]
    fn reads_fenced_block() {
        let raw = "分析如下：\n```json\n{\"upper\": 7.35, \"lower\": 7.1}\n```\n仅供参考";
        assert_eq!(extract_json(raw).expect("should parse"), json!({ "upper": 7.35, "lower": 7.1 }));
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let raw = r#"Result: {"suggestion": "use {EUR} \"puts\"", "n": 1} trailing {"#;
        let value = extract_json(raw).expect("should parse");
        assert_eq!(value["suggestion"], "use {EUR} \"puts\"");
    }

    #[test]
    fn repairs_trailing_commas_and_smart_quotes() {
        let raw = "{\"upper\": \"7.3\", \"lower\": 7.0,}";
        assert_eq!(extract_json(raw).expect("commas")["lower"], 7.0);

        let raw = "{“upper”: 1.2, “lower”: 1.1}";
        assert_eq!(extract_json(raw).expect("quotes")["upper"], 1.2);
    }

    #[test]
    fn keeps_smart_quotes_inside_values() {
        let raw = r#"{"suggestion": "市场“偏多”时减仓"}"#;
        assert_eq!(extract_json(raw).expect("should parse")["suggestion"], "市场“偏多”时减仓");
    }

    #[test]
    fn rejects_prose_and_truncated_output() {
        assert!(matches!(extract_json("no json here"), Err(AdvisorError::Parse(_))));
        assert!(matches!(extract_json("{\"upper\": 1.2, \"lower\""), Err(AdvisorError::Parse(_))));
    }

    #[test]
    fn parses_into_contract() {
        let prediction: CurrencyPrediction =
            parse_contract("```\n{\"upper\": \"7.35\", \"lower\": 7.1}\n```").expect("contract");
        assert_eq!(prediction, CurrencyPrediction { upper: 7.35, lower: 7.1 });
        assert!(parse_contract::<CurrencyPrediction>("{\"upper\": 1}").is_err());
    }
}
