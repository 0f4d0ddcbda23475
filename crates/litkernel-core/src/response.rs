//! Response unwrapping.
//!
//! Service output is expected to be a single JSON document, optionally
//! wrapped in a markdown fence:
//!
//! ```text
//! response    := ws* fence? body fence_close? ws*
//! fence       := "```" tag? ws* "\n"?
//! fence_close := "```"
//! ```
//!
//! `body` must parse as JSON. Anything else is an error; there is no
//! best-effort recovery of partial output.

use serde_json::Value;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("response is empty")]
    Empty,

    #[error("response body is not valid JSON ({reason}); starts with {excerpt:?}")]
    InvalidJson { reason: String, excerpt: String },
}

/// Strip an optional surrounding fence, leaving the body text.
pub fn strip_fence(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix(FENCE) {
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        body = rest[tag_len..].trim_start();
    }
    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest.trim_end();
    }
    body
}

/// Unwrap and parse a raw service response.
pub fn unwrap_response(raw: &str) -> Result<Value, ResponseError> {
    let body = strip_fence(raw);
    if body.is_empty() {
        return Err(ResponseError::Empty);
    }
    serde_json::from_str(body).map_err(|e| ResponseError::InvalidJson {
        reason: e.to_string(),
        excerpt: body.chars().take(80).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_json() {
        assert_eq!(unwrap_response(" {\"a\": 1}\n").unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn fenced_with_tag() {
        let raw = "```json\n{\"pov\": \"TPL\"}\n```";
        assert_eq!(unwrap_response(raw).unwrap(), json!({ "pov": "TPL" }));
    }

    #[test]
    fn fenced_without_tag_or_newline() {
        assert_eq!(unwrap_response("```[1, 2]```").unwrap(), json!([1, 2]));
        assert_eq!(unwrap_response("```json{\"a\":true}```").unwrap(), json!({ "a": true }));
    }

    #[test]
    fn unterminated_fence_is_tolerated() {
        assert_eq!(unwrap_response("```json\n{\"a\": 1}").unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn prose_is_rejected() {
        let err = unwrap_response("Here is the JSON you asked for: {\"a\": 1}").unwrap_err();
        assert!(matches!(err, ResponseError::InvalidJson { .. }));
    }

    #[test]
    fn truncated_json_is_rejected() {
        assert!(unwrap_response("```json\n{\"a\": [1, 2").is_err());
    }

    #[test]
    fn empty_fence_is_empty() {
        assert_eq!(unwrap_response("```json\n```"), Err(ResponseError::Empty));
        assert_eq!(unwrap_response("   "), Err(ResponseError::Empty));
    }
}
