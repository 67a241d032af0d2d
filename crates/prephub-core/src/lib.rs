//! # prephub-core
//!
//! Deterministic building blocks for AI-generated learning content.
//!
//! Nothing in this crate performs I/O or calls a language model. It holds
//! the pieces every generation call site shares:
//!
//! - [`extract`]: recovering JSON or text from free-form model output
//! - [`cache_key`]: stable cache keys for the two-tier response cache
//! - [`schema`]: shape gates deciding whether parsed output is usable
//! - [`types`]: the learning-domain payloads (quizzes, groups, test cases)
//! - [`offline`]: labelled placeholders used when every backend fails
//!
//! ## Example
//!
//! ```rust
//! use prephub_core::{extract_structured, PayloadShape};
//!
//! let raw = "Here you go:\n```json\n{\"group\": \"JS Basics\", \"confidence\": 92}\n```";
//! let value = extract_structured(raw).expect("json payload");
//! assert!(PayloadShape::GroupAssignment.accepts(&value));
//! ```

pub mod cache_key;
pub mod extract;
pub mod offline;
pub mod schema;
pub mod types;

// Re-export main types at crate root
pub use cache_key::{digest, CacheKeyBuilder};
pub use extract::{extract_plain_text, extract_structured, strip_code_fences, ResponseExtractor};
pub use schema::PayloadShape;
pub use types::{
    AnalysisMode, CategoryRef, GroupAssignment, LearningPath, Level, PathModule,
    QuestionContext, QuizQuestion, TestCase, TestCaseSet,
};
