//! Backend text -> structured result (spec §4.4 step 7, §4.4 edge cases).
//! The backend's `text` field is treated as opaque JSON until parsed here.
//! Unknown fields are dropped by construction (we only read the keys we
//! recognize); missing required fields are a `parse_error`; out-of-range
//! confidence/sentiment values are clamped and the result is annotated
//! `coerced = true`.

use observatory_jobs::{AnalysisResult, PatternMatch, Sentiment};
use serde_json::Value;

use crate::error::{DispatchError, Result};
use crate::prompt::PromptTemplate;

/// Clamp `v` into `[lo, hi]`, returning whether clamping changed it.
fn clamp(v: f64, lo: f64, hi: f64) -> (f64, bool) {
    if v < lo {
        (lo, true)
    } else if v > hi {
        (hi, true)
    } else {
        (v, false)
    }
}

pub fn parse_backend_text(
    raw_text: &str,
    backend_model: &str,
    processing_seconds: f64,
) -> Result<AnalysisResult> {
    let value: Value = serde_json::from_str(raw_text)
        .map_err(|e| DispatchError::ParseError(format!("backend text is not JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| DispatchError::ParseError("backend JSON is not an object".to_string()))?;

    let mut coerced = false;

    let themes: Vec<String> = obj
        .get("themes")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let patterns: Vec<PatternMatch> = obj
        .get("patterns")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let item = item.as_object()?;
                    let kind = item.get("kind")?.as_str()?.to_string();
                    let span = item.get("span")?.as_str()?.to_string();
                    let raw_confidence = item.get("confidence")?.as_f64()?;
                    let (confidence, was_coerced) = clamp(raw_confidence, 0.0, 1.0);
                    if was_coerced {
                        coerced = true;
                    }
                    let evidence = item.get("evidence").and_then(Value::as_str).map(str::to_string);
                    Some(PatternMatch { kind, span, confidence, evidence })
                })
                .collect()
        })
        .unwrap_or_default();

    let sentiment_obj = obj
        .get("sentiment")
        .and_then(Value::as_object)
        .ok_or_else(|| DispatchError::ParseError("missing required field: sentiment".to_string()))?;

    let raw_polarity = sentiment_obj
        .get("polarity")
        .and_then(Value::as_f64)
        .ok_or_else(|| DispatchError::ParseError("missing required field: sentiment.polarity".to_string()))?;
    let raw_intensity = sentiment_obj
        .get("intensity")
        .and_then(Value::as_f64)
        .ok_or_else(|| DispatchError::ParseError("missing required field: sentiment.intensity".to_string()))?;

    let (polarity, polarity_coerced) = clamp(raw_polarity, -1.0, 1.0);
    let (intensity, intensity_coerced) = clamp(raw_intensity, 0.0, 1.0);
    coerced = coerced || polarity_coerced || intensity_coerced;

    Ok(AnalysisResult {
        patterns,
        themes,
        sentiment: Sentiment { polarity, intensity },
        processing_seconds,
        model_identifier: PromptTemplate::model_identifier(backend_model),
        coerced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let text = r#"{"patterns":[{"kind":"socratic","span":"0-10","confidence":0.8}],
            "themes":["greeting"],"sentiment":{"polarity":0.5,"intensity":0.2}}"#;
        let result = parse_backend_text(text, "llama3", 1.2).unwrap();
        assert_eq!(result.themes, vec!["greeting".to_string()]);
        assert_eq!(result.patterns.len(), 1);
        assert!(!result.coerced);
    }

    #[test]
    fn clamps_out_of_range_values_and_flags_coerced() {
        let text = r#"{"patterns":[],"themes":[],"sentiment":{"polarity":5.0,"intensity":-2.0}}"#;
        let result = parse_backend_text(text, "llama3", 0.5).unwrap();
        assert_eq!(result.sentiment.polarity, 1.0);
        assert_eq!(result.sentiment.intensity, 0.0);
        assert!(result.coerced);
    }

    #[test]
    fn missing_sentiment_is_parse_error() {
        let text = r#"{"patterns":[],"themes":[]}"#;
        let err = parse_backend_text(text, "llama3", 0.1).unwrap_err();
        assert_eq!(err.code(), "parse_error");
    }

    #[test]
    fn unknown_fields_are_silently_dropped() {
        let text = r#"{"patterns":[],"themes":[],"sentiment":{"polarity":0.0,"intensity":0.0},
            "unexpected_field":"whatever"}"#;
        assert!(parse_backend_text(text, "llama3", 0.1).is_ok());
    }

    #[test]
    fn non_json_text_is_parse_error() {
        let err = parse_backend_text("not json", "llama3", 0.1).unwrap_err();
        assert_eq!(err.code(), "parse_error");
    }
}
