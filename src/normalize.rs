//! Context normalization
//!
//! Turns an untrusted request body into a [`Context`]. Required fields must be
//! non-empty strings; recognized optional fields are copied into
//! `attributes` only when a value was actually supplied, so prompts never
//! mention information the caller did not give.

use crate::error::ValidationError;
use crate::scenes::SceneTable;
use crate::types::{Context, TheoryRequest};
use serde_json::Value;
use std::collections::BTreeMap;

const REQUIRED_FIELDS: [&str; 4] = ["scene", "goal", "time_limit", "stakes"];

/// Validate and shape a raw request body
pub fn normalize(body: &Value, scenes: &SceneTable) -> Result<Context, ValidationError> {
    let Some(object) = body.as_object() else {
        return Err(ValidationError::invalid("body", "request body must be a JSON object"));
    };

    let require = |field: &str| {
        object
            .get(field)
            .and_then(scalar_text)
            .ok_or_else(|| ValidationError::missing(field))
    };
    let [scene, goal, time_limit, stakes] = [
        require(REQUIRED_FIELDS[0])?,
        require(REQUIRED_FIELDS[1])?,
        require(REQUIRED_FIELDS[2])?,
        require(REQUIRED_FIELDS[3])?,
    ];

    let participants = match object.get("participants") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(parse_participants(value)?),
    };

    let relationship = object.get("relationship").and_then(scalar_text);

    let attributes: BTreeMap<String, String> = scenes
        .attributes
        .iter()
        .filter_map(|spec| {
            object
                .get(&spec.key)
                .and_then(scalar_text)
                .map(|value| (spec.key.clone(), value))
        })
        .collect();

    Ok(Context {
        scene,
        goal,
        time_limit,
        stakes,
        participants,
        relationship,
        attributes,
    })
}

/// Shape a related-theories request body
///
/// Field presence is checked by the relevance engine, which knows which mode
/// applies; here every field is optional.
pub fn theory_request(body: &Value) -> Result<TheoryRequest, ValidationError> {
    let Some(object) = body.as_object() else {
        return Err(ValidationError::invalid("body", "request body must be a JSON object"));
    };
    let field = |key: &str| object.get(key).and_then(scalar_text);

    Ok(TheoryRequest {
        scene: field("scene"),
        goal: field("goal"),
        short_advice: field("short_advice"),
        additional_context: field("additional_context"),
        advice_id: field("advice_id"),
    })
}

/// Trimmed text for strings, numbers and booleans; `None` for blanks and
/// structured values
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_participants(value: &Value) -> Result<u32, ValidationError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ValidationError::invalid("participants", "must be a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> SceneTable {
        SceneTable::default()
    }

    #[test]
    fn test_minimal_context() {
        let ctx = normalize(
            &json!({"scene": "meeting", "goal": "decide", "time_limit": "short", "stakes": "high"}),
            &table(),
        )
        .unwrap();

        assert_eq!(ctx.scene, "meeting");
        assert_eq!(ctx.goal, "decide");
        assert!(ctx.participants.is_none());
        assert!(ctx.attributes.is_empty());
    }

    #[test]
    fn test_missing_goal_is_validation_error() {
        let err = normalize(
            &json!({"scene": "meeting", "time_limit": "short", "stakes": "high"}),
            &table(),
        )
        .unwrap_err();
        assert_eq!(err.field, "goal");
    }

    #[test]
    fn test_blank_required_field_is_missing() {
        let err = normalize(
            &json!({"scene": "meeting", "goal": "decide", "time_limit": "  ", "stakes": "high"}),
            &table(),
        )
        .unwrap_err();
        assert_eq!(err.field, "time_limit");
    }

    #[test]
    fn test_non_object_body_rejected() {
        let err = normalize(&json!(["meeting"]), &table()).unwrap_err();
        assert_eq!(err.field, "body");
    }

    #[test]
    fn test_attributes_only_include_supplied_values() {
        let ctx = normalize(
            &json!({
                "scene": "sales",
                "goal": "close",
                "time_limit": "30min",
                "stakes": "medium",
                "customer_type": "enterprise",
                "deal_stage": "",
                "budget": null,
                "audience": 40,
                "favorite_color": "green"
            }),
            &table(),
        )
        .unwrap();

        assert_eq!(ctx.attribute("customer_type"), Some("enterprise"));
        assert_eq!(ctx.attribute("audience"), Some("40"));
        assert!(!ctx.attributes.contains_key("deal_stage"));
        assert!(!ctx.attributes.contains_key("budget"));
        assert!(!ctx.attributes.contains_key("favorite_color"));
    }

    #[test]
    fn test_participants_parsing() {
        let base = json!({"scene": "meeting", "goal": "g", "time_limit": "t", "stakes": "s"});

        let mut body = base.clone();
        body["participants"] = json!("6");
        assert_eq!(normalize(&body, &table()).unwrap().participants, Some(6));

        let mut body = base.clone();
        body["participants"] = json!(-2);
        let err = normalize(&body, &table()).unwrap_err();
        assert_eq!(err.field, "participants");

        let mut body = base;
        body["participants"] = json!("many");
        assert!(normalize(&body, &table()).is_err());
    }

    #[test]
    fn test_theory_request_accepts_numeric_id() {
        let request = theory_request(&json!({"advice_id": 42, "scene": " sales "})).unwrap();
        assert_eq!(request.advice_id.as_deref(), Some("42"));
        assert_eq!(request.scene.as_deref(), Some("sales"));
        assert!(request.goal.is_none());

        assert!(theory_request(&json!(["not", "an", "object"])).is_err());
    }
}
