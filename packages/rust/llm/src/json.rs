//! JSON extraction from model replies.

use serde_json::Value;

/// Top-level JSON shape a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// Expected reply shape plus required fields.
///
/// For [`Shape::Object`] the required fields are checked on the reply itself
/// and a miss fails the call. For [`Shape::Array`] only the top-level shape is
/// enforced; callers filter individual elements with [`ResponseSchema::check_element`]
/// so that one bad record does not sink the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub shape: Shape,
    pub required: Vec<&'static str>,
    /// Example or field description appended to the system prompt.
    pub hint: String,
}

impl ResponseSchema {
    pub fn object(required: &[&'static str], hint: impl Into<String>) -> Self {
        Self {
            shape: Shape::Object,
            required: required.to_vec(),
            hint: hint.into(),
        }
    }

    pub fn array(required: &[&'static str], hint: impl Into<String>) -> Self {
        Self {
            shape: Shape::Array,
            required: required.to_vec(),
            hint: hint.into(),
        }
    }

    /// Instruction appended to the system prompt.
    pub fn instruction(&self) -> String {
        format!(
            "Respond with ONLY a valid JSON {}. No markdown, no explanation.\n{}",
            self.shape.as_str(),
            self.hint
        )
    }

    /// Validate the top-level reply.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match (self.shape, value) {
            (Shape::Object, Value::Object(_)) => self.check_element(value),
            (Shape::Array, Value::Array(_)) => Ok(()),
            (shape, _) => Err(format!("expected a JSON {}", shape.as_str())),
        }
    }

    /// Check that `element` is an object carrying every required field (non-null, non-empty).
    pub fn check_element(&self, element: &Value) -> Result<(), String> {
        let Some(obj) = element.as_object() else {
            return Err("element is not an object".into());
        };
        for field in &self.required {
            match obj.get(*field) {
                None | Some(Value::Null) => return Err(format!("missing required field `{field}`")),
                Some(Value::String(s)) if s.trim().is_empty() => {
                    return Err(format!("empty required field `{field}`"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Clean, parse and check `text`.
    pub fn parse(&self, text: &str) -> Result<Value, String> {
        let cleaned = clean_json(text);
        let value: Value =
            serde_json::from_str(&cleaned).map_err(|e| format!("not valid JSON: {e}"))?;
        self.check(&value)?;
        Ok(value)
    }
}

/// Strip code fences and surrounding prose, keeping the outermost JSON value.
pub fn clean_json(text: &str) -> String {
    let mut s = text.trim();

    if let Some(rest) = s.strip_prefix("```") {
        // Drop an optional language tag on the fence line.
        s = rest.split_once('\n').map_or(rest, |(_, body)| body);
        if let Some(end) = s.rfind("```") {
            s = &s[..end];
        }
        s = s.trim();
    }

    let start = s.find(['{', '[']);
    let Some(start) = start else {
        return s.to_string();
    };
    let close = if s[start..].starts_with('{') { '}' } else { ']' };
    match s.rfind(close) {
        Some(end) if end > start => s[start..=end].to_string(),
        _ => s[start..].to_string(),
    }
}
