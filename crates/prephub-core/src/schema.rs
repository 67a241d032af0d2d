//! Shape gates for structured model output.
//!
//! The extractor only guarantees "this parsed as JSON". Each call site
//! additionally decides whether the parsed value is usable; a value that
//! fails its gate is treated exactly like a backend failure.

use jsonschema::Validator;
use lazy_static::lazy_static;
use serde_json::{json, Value};

/// Known payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Array of multiple-choice questions
    Quiz,
    /// `{ group, confidence, reasoning? }`
    GroupAssignment,
    /// `{ "<category>": "<group>", ... }`
    GroupBatch,
    /// `{ sampleCases: [...], hiddenCases: [...] }`
    TestCases,
    /// `{ modules: [...], totalEstimatedHours }`
    LearningPath,
}

lazy_static! {
    static ref QUIZ: Validator = compile(json!({
        "type": "array",
        "minItems": 1,
        "items": {
            "type": "object",
            "required": ["question", "options", "correctIndex"],
            "properties": {
                "question": { "type": "string", "minLength": 1 },
                "options": {
                    "type": "array",
                    "minItems": 2,
                    "items": { "type": "string" }
                },
                "correctIndex": { "type": "integer", "minimum": 0 },
                "explanation": { "type": "string" }
            }
        }
    }));

    static ref GROUP_ASSIGNMENT: Validator = compile(json!({
        "type": "object",
        "required": ["group", "confidence"],
        "properties": {
            "group": { "type": "string", "minLength": 1 },
            "confidence": { "type": "number" },
            "reasoning": { "type": "string" }
        }
    }));

    static ref GROUP_BATCH: Validator = compile(json!({
        "type": "object",
        "minProperties": 1,
        "additionalProperties": { "type": "string", "minLength": 1 }
    }));

    static ref TEST_CASES: Validator = compile(json!({
        "type": "object",
        "required": ["sampleCases", "hiddenCases"],
        "properties": {
            "sampleCases": { "$ref": "#/$defs/cases" },
            "hiddenCases": { "$ref": "#/$defs/cases" }
        },
        "$defs": {
            "cases": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["input", "expected"]
                }
            }
        }
    }));

    static ref LEARNING_PATH: Validator = compile(json!({
        "type": "object",
        "required": ["modules"],
        "properties": {
            "modules": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["title"],
                    "properties": {
                        "title": { "type": "string" },
                        "topics": { "type": "array", "items": { "type": "string" } },
                        "estimatedHours": { "type": "number" }
                    }
                }
            },
            "totalEstimatedHours": { "type": "number" }
        }
    }));
}

fn compile(schema: Value) -> Validator {
    jsonschema::validator_for(&schema).unwrap()
}

impl PayloadShape {
    /// Whether `value` has this shape.
    pub fn accepts(&self, value: &Value) -> bool {
        let validator: &Validator = match self {
            PayloadShape::Quiz => &*QUIZ,
            PayloadShape::GroupAssignment => &*GROUP_ASSIGNMENT,
            PayloadShape::GroupBatch => &*GROUP_BATCH,
            PayloadShape::TestCases => &*TEST_CASES,
            PayloadShape::LearningPath => &*LEARNING_PATH,
        };
        let ok = validator.is_valid(value);
        if !ok {
            tracing::debug!(shape = ?self, "Payload rejected by shape gate");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiz_shape() {
        let good = json!([{
            "question": "Q?",
            "options": ["a", "b", "c", "d"],
            "correctIndex": 1,
            "explanation": "because"
        }]);
        assert!(PayloadShape::Quiz.accepts(&good));
        assert!(!PayloadShape::Quiz.accepts(&json!([])));
        assert!(!PayloadShape::Quiz.accepts(&json!({"question": "Q?"})));
        assert!(!PayloadShape::Quiz.accepts(&json!([{"question": "Q?", "options": ["a", "b"]}])));
    }

    #[test]
    fn test_group_assignment_requires_numeric_confidence() {
        assert!(PayloadShape::GroupAssignment
            .accepts(&json!({"group": "JavaScript Functions", "confidence": 85})));
        assert!(!PayloadShape::GroupAssignment
            .accepts(&json!({"group": "JavaScript Functions", "confidence": "high"})));
        assert!(!PayloadShape::GroupAssignment.accepts(&json!({"confidence": 90})));
    }

    #[test]
    fn test_group_batch_values_must_be_strings() {
        assert!(PayloadShape::GroupBatch.accepts(&json!({"Variables": "01. Fundamentals"})));
        assert!(!PayloadShape::GroupBatch.accepts(&json!({"Variables": 1})));
        assert!(!PayloadShape::GroupBatch.accepts(&json!({})));
    }

    #[test]
    fn test_test_cases_shape() {
        let good = json!({
            "sampleCases": [{"input": {"nums": [2, 7], "target": 9}, "expected": [0, 1]}],
            "hiddenCases": []
        });
        assert!(PayloadShape::TestCases.accepts(&good));
        assert!(!PayloadShape::TestCases.accepts(&json!({"sampleCases": [{"input": 1}], "hiddenCases": []})));
    }

    #[test]
    fn test_learning_path_shape() {
        assert!(PayloadShape::LearningPath.accepts(&json!({
            "modules": [{"title": "Module 1", "topics": ["js"], "estimatedHours": 4}],
            "totalEstimatedHours": 4
        })));
        assert!(!PayloadShape::LearningPath.accepts(&json!({"modules": "none"})));
    }
}
