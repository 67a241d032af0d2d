//! Caller-facing content generation.
//!
//! Every operation builds a prompt and a cache policy, hands both to the
//! [`FallbackOrchestrator`], and converts a terminal failure into a
//! labelled offline payload. Callers therefore always get a value back and
//! can tell from [`ContentOrigin`] where it came from.

use prephub_core::{
    offline, strip_code_fences, AnalysisMode, CacheKeyBuilder, Level, LearningPath, PayloadShape,
    QuestionContext, QuizQuestion, TestCaseSet,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{DurableStore, ResponseCache};
use crate::config::{CacheTtls, RuntimeConfig};
use crate::orchestrator::{
    CachePolicy, FallbackOrchestrator, Generation, GenerationSource, OrchestratorError,
};
use crate::pool::{BackendId, ProviderPool};
use crate::prompts;
use crate::providers::ProviderRegistry;
use crate::resilience::ResilienceGuard;

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentOrigin {
    Cache,
    Generated { backend: BackendId },
    /// Every backend failed; the value is a placeholder
    Offline,
    /// Nothing to generate for the given input
    Skipped,
}

/// A value plus its origin.
#[derive(Debug, Clone, Serialize)]
pub struct Content<T> {
    pub value: T,
    pub origin: ContentOrigin,
}

impl<T> Content<T> {
    pub fn is_offline(&self) -> bool {
        self.origin == ContentOrigin::Offline
    }

    fn offline(value: T) -> Self {
        Self {
            value,
            origin: ContentOrigin::Offline,
        }
    }
}

impl From<GenerationSource> for ContentOrigin {
    fn from(source: GenerationSource) -> Self {
        match source {
            GenerationSource::Cache => ContentOrigin::Cache,
            GenerationSource::Backend { id } => ContentOrigin::Generated { backend: id },
        }
    }
}

/// Learning-content operations over a shared orchestrator.
#[derive(Debug, Clone)]
pub struct ContentService {
    pub(crate) orchestrator: Arc<FallbackOrchestrator>,
    pub(crate) ttl: CacheTtls,
    pub(crate) min_confidence: f64,
}

impl ContentService {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>) -> Self {
        let config = RuntimeConfig::default();
        Self {
            orchestrator,
            ttl: config.ttl,
            min_confidence: config.categorization.min_confidence,
        }
    }

    /// Wire pool, cache and guard from `config`.
    ///
    /// Credentials are read from the environment. `store` becomes the
    /// durable cache tier when given.
    pub fn from_config(
        config: &RuntimeConfig,
        registry: &ProviderRegistry,
        store: Option<Arc<dyn DurableStore>>,
    ) -> Self {
        let pool = ProviderPool::from_config(config, registry);

        let mut cache = ResponseCache::new(&config.cache);
        if let Some(store) = store {
            cache = cache.with_store(store);
        }

        let orchestrator = FallbackOrchestrator::new(pool, Arc::new(cache))
            .with_guard(Arc::new(ResilienceGuard::from_config(&config.guard)))
            .with_deadline(config.overall_deadline);

        Self {
            orchestrator: Arc::new(orchestrator),
            ttl: config.ttl.clone(),
            min_confidence: config.categorization.min_confidence,
        }
    }

    pub fn with_ttls(mut self, ttl: CacheTtls) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    /// Markdown explanation of one section of a topic.
    pub async fn generate_explanation(
        &self,
        topic: &str,
        section: &str,
        context: &str,
        language: &str,
        level: Level,
    ) -> Content<String> {
        let prompt = prompts::explanation(topic, section, context, language, level);
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("explain_v2")
                .part(level.as_str())
                .part(language)
                .part(topic)
                .part(section)
                .digest(context)
                .build(),
            self.ttl.explanation,
        );

        text_or(
            "explanation",
            self.orchestrator.generate_text(&prompt, Some(&policy)).await,
            || offline::explanation(topic, section),
        )
    }

    /// Answer a learner's question.
    pub async fn answer_question(
        &self,
        question: &str,
        context: &QuestionContext,
        language: &str,
        level: Level,
    ) -> Content<String> {
        let prompt = prompts::answer(question, context, language, level);
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("answer_v2")
                .part(level.as_str())
                .part(language)
                .part(context.topic.as_deref().unwrap_or("general"))
                .part(context.section.as_deref().unwrap_or("general"))
                .digest(question)
                .digest(context.current_code.as_deref().unwrap_or(""))
                .build(),
            self.ttl.answer,
        );

        text_or(
            "answer",
            self.orchestrator.generate_text(&prompt, Some(&policy)).await,
            offline::answer,
        )
    }

    /// Multiple-choice quiz for a section.
    ///
    /// `regenerate` skips the cache read; the fresh quiz still replaces the
    /// cached one.
    pub async fn generate_quiz(
        &self,
        topic: &str,
        section: &str,
        regenerate: bool,
        language: &str,
        content: &str,
        level: Level,
    ) -> Content<Vec<QuizQuestion>> {
        let prompt = prompts::quiz(topic, section, language, content, level);
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("quiz_v2")
                .part(level.as_str())
                .part(topic)
                .part(section)
                .part(language)
                .digest(content)
                .build(),
            self.ttl.quiz,
        )
        .refresh(regenerate);

        let result = self
            .orchestrator
            .generate_json_gated(&prompt, Some(&policy), typed_gate::<Vec<QuizQuestion>>(PayloadShape::Quiz))
            .await;
        json_or("quiz", result, Vec::new)
    }

    /// Test cases from a ready-made prompt.
    pub async fn generate_test_cases(&self, prompt: &str) -> Content<TestCaseSet> {
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("test_cases").digest(prompt).build(),
            self.ttl.test_cases,
        );

        let result = self
            .orchestrator
            .generate_json_gated(prompt, Some(&policy), typed_gate::<TestCaseSet>(PayloadShape::TestCases))
            .await;
        json_or("test_cases", result, TestCaseSet::default)
    }

    /// Test cases for a coding problem described by its parts.
    pub async fn generate_problem_test_cases(
        &self,
        title: &str,
        description: Option<&str>,
        signature: Option<&str>,
    ) -> Content<TestCaseSet> {
        self.generate_test_cases(&prompts::test_cases(title, description, signature))
            .await
    }

    /// Review, debug or optimize a snippet.
    pub async fn analyze_code(
        &self,
        code: &str,
        mode: AnalysisMode,
        language: &str,
        level: Level,
    ) -> Content<String> {
        let prompt = prompts::code_analysis(code, mode, language, level);
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("analyze_v2")
                .part(level.as_str())
                .part(mode.as_str())
                .part(language)
                .digest(code)
                .build(),
            self.ttl.code_analysis,
        );

        text_or(
            "code_analysis",
            self.orchestrator.generate_text(&prompt, Some(&policy)).await,
            offline::code_analysis,
        )
    }

    /// Translate code between languages.
    ///
    /// Markdown fences are stripped from the output. When nothing usable
    /// comes back the original code is returned unchanged.
    pub async fn translate_code_block(
        &self,
        code: &str,
        source: &str,
        target: &str,
    ) -> Content<String> {
        let prompt = prompts::translation(code, source, target);
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("translate")
                .part(source)
                .part(target)
                .digest(code)
                .build(),
            self.ttl.translation,
        );

        match self.orchestrator.generate_text(&prompt, Some(&policy)).await {
            Ok(generation) => {
                let stripped = strip_code_fences(&generation.value);
                if stripped.is_empty() {
                    tracing::warn!(operation = "translation", "Translation was only fences");
                    return Content::offline(code.to_string());
                }
                Content {
                    value: stripped,
                    origin: generation.source.into(),
                }
            }
            Err(e) => {
                tracing::warn!(operation = "translation", error = %e, "Returning original code");
                Content::offline(code.to_string())
            }
        }
    }

    /// Group topics into ordered modules.
    pub async fn structure_learning_path(
        &self,
        topics: &[String],
        path_name: &str,
        level: Level,
    ) -> Content<LearningPath> {
        let prompt = prompts::learning_path(topics, path_name, level);
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("path_structure")
                .part(level.as_str())
                .part(path_name)
                .digest(topics.join("|"))
                .build(),
            self.ttl.learning_path,
        );

        let result = self
            .orchestrator
            .generate_json_gated(
                &prompt,
                Some(&policy),
                typed_gate::<LearningPath>(PayloadShape::LearningPath),
            )
            .await;
        json_or("learning_path", result, LearningPath::default)
    }
}

/// Gate accepting values of `shape` that also decode as `T`.
pub(crate) fn typed_gate<T: DeserializeOwned>(shape: PayloadShape) -> impl Fn(&Value) -> bool {
    move |value| shape.accepts(value) && serde_json::from_value::<T>(value.clone()).is_ok()
}

fn text_or<F>(
    operation: &'static str,
    result: Result<Generation<String>, OrchestratorError>,
    fallback: F,
) -> Content<String>
where
    F: FnOnce() -> String,
{
    match result {
        Ok(generation) => Content {
            value: generation.value,
            origin: generation.source.into(),
        },
        Err(e) => {
            tracing::warn!(operation, error = %e, "Serving offline content");
            Content::offline(fallback())
        }
    }
}

pub(crate) fn json_or<T, F>(
    operation: &'static str,
    result: Result<Generation<Value>, OrchestratorError>,
    fallback: F,
) -> Content<T>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match result {
        Ok(generation) => match serde_json::from_value(generation.value) {
            Ok(value) => Content {
                value,
                origin: generation.source.into(),
            },
            Err(e) => {
                tracing::warn!(operation, error = %e, "Generated payload did not decode");
                Content::offline(fallback())
            }
        },
        Err(e) => {
            tracing::warn!(operation, error = %e, "Serving offline content");
            Content::offline(fallback())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;
    use crate::testing::{pool_of, Reply, ScriptedProvider};

    const QUIZ: &str = r#"[{"question":"What is a closure?","options":["A","B","C","D"],"correctIndex":1,"explanation":"Scope"}]"#;

    fn service(providers: &[Arc<ScriptedProvider>]) -> ContentService {
        let orchestrator =
            FallbackOrchestrator::new(pool_of(providers), Arc::new(ResponseCache::default()));
        ContentService::new(Arc::new(orchestrator))
    }

    #[tokio::test]
    async fn test_explanation_is_cached_per_level() {
        let provider = Arc::new(ScriptedProvider::always("### Closures\n\nText"));
        let service = service(&[provider.clone()]);

        let first = service
            .generate_explanation("javascript", "Closures", "", "javascript", Level::Advanced)
            .await;
        let second = service
            .generate_explanation("javascript", "Closures", "", "javascript", Level::Advanced)
            .await;
        let beginner = service
            .generate_explanation("javascript", "Closures", "", "javascript", Level::Beginner)
            .await;

        assert!(matches!(first.origin, ContentOrigin::Generated { .. }));
        assert_eq!(second.origin, ContentOrigin::Cache);
        assert!(matches!(beginner.origin, ContentOrigin::Generated { .. }));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_explanation_offline_when_all_fail() {
        let service = service(&[Arc::new(ScriptedProvider::failing("503"))]);
        let content = service
            .generate_explanation("react", "Hooks", "", "javascript", Level::Intermediate)
            .await;

        assert!(content.is_offline());
        assert!(offline::is_offline_text(&content.value));
        assert!(content.value.contains("react"));
    }

    #[tokio::test]
    async fn test_answer_offline_with_empty_pool() {
        let content = service(&[])
            .answer_question("Why?", &QuestionContext::default(), "python", Level::Advanced)
            .await;
        assert!(content.is_offline());
        assert_eq!(content.value, offline::answer());
    }

    #[tokio::test]
    async fn test_quiz_skips_malformed_backend() {
        let bad = Arc::new(ScriptedProvider::always(r#"[{"question":"Q?"}]"#));
        let good = Arc::new(ScriptedProvider::always(format!("```json\n{}\n```", QUIZ)));
        let service = service(&[bad.clone(), good.clone()]);

        let quiz = service
            .generate_quiz("javascript", "Closures", false, "javascript", "", Level::Advanced)
            .await;
        assert_eq!(quiz.value.len(), 1);
        assert_eq!(quiz.value[0].correct_index, 1);
        assert_eq!(bad.calls(), 1);
    }

    #[tokio::test]
    async fn test_quiz_regenerate_bypasses_read_and_rewrites() {
        let provider = Arc::new(ScriptedProvider::script(vec![
            Reply::Text(QUIZ.to_string()),
            Reply::Text(QUIZ.replace("What is a closure?", "Fresh question")),
        ]));
        let service = service(&[provider.clone()]);

        service
            .generate_quiz("js", "Closures", false, "javascript", "", Level::Advanced)
            .await;
        let fresh = service
            .generate_quiz("js", "Closures", true, "javascript", "", Level::Advanced)
            .await;
        let cached = service
            .generate_quiz("js", "Closures", false, "javascript", "", Level::Advanced)
            .await;

        assert_eq!(fresh.value[0].question, "Fresh question");
        assert_eq!(cached.origin, ContentOrigin::Cache);
        assert_eq!(cached.value[0].question, "Fresh question");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_quiz_offline_is_empty() {
        let quiz = service(&[Arc::new(ScriptedProvider::always("no quiz today"))])
            .generate_quiz("js", "Loops", false, "javascript", "", Level::Beginner)
            .await;
        assert!(quiz.is_offline());
        assert!(quiz.value.is_empty());
    }

    #[tokio::test]
    async fn test_test_cases_decode() {
        let provider = Arc::new(ScriptedProvider::always(
            r#"Sure: {"sampleCases":[{"input":{"n":1},"expected":1}],"hiddenCases":[]}"#,
        ));
        let cases = service(&[provider])
            .generate_problem_test_cases("Fibonacci", Some("Return the nth number"), None)
            .await;

        assert_eq!(cases.value.sample_cases.len(), 1);
        assert!(!cases.is_offline());
    }

    #[tokio::test]
    async fn test_translation_strips_fences() {
        let provider = Arc::new(ScriptedProvider::always("```python\nprint(1)\n```"));
        let content = service(&[provider])
            .translate_code_block("console.log(1)", "javascript", "python")
            .await;
        assert_eq!(content.value, "print(1)");
    }

    #[tokio::test]
    async fn test_translation_falls_back_to_original() {
        let content = service(&[Arc::new(ScriptedProvider::failing("down"))])
            .translate_code_block("console.log(1)", "javascript", "python")
            .await;
        assert!(content.is_offline());
        assert_eq!(content.value, "console.log(1)");
    }

    #[tokio::test]
    async fn test_analysis_key_depends_on_mode() {
        let provider = Arc::new(ScriptedProvider::always("#### Analysis\nFine"));
        let service = service(&[provider.clone()]);

        service
            .analyze_code("x = 1", AnalysisMode::Review, "python", Level::Advanced)
            .await;
        let debug = service
            .analyze_code("x = 1", AnalysisMode::Debug, "python", Level::Advanced)
            .await;

        assert!(matches!(
            debug.origin,
            ContentOrigin::Generated { backend } if backend.kind == ProviderKind::Groq
        ));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_learning_path_offline_is_empty() {
        let path = service(&[])
            .structure_learning_path(&["js".to_string()], "Web", Level::Beginner)
            .await;
        assert!(path.is_offline());
        assert!(path.value.modules.is_empty());
    }
}
