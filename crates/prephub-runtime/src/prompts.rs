//! Prompt builders for the caller-facing operations.
//!
//! Each builder is a pure function of its inputs so that the same request
//! always produces the same prompt. Structured prompts end with an explicit
//! output schema; the shape gates in `prephub_core::schema` check the
//! reply against the same structure.

use prephub_core::{AnalysisMode, CategoryRef, Level, QuestionContext};

/// Voice used for a given audience.
#[derive(Debug, Clone, Copy)]
struct Audience {
    persona: &'static str,
    tone: &'static str,
    focus: &'static str,
}

fn audience(level: Level) -> Audience {
    match level {
        Level::Beginner => Audience {
            persona: "Patient Mentor & Senior Teacher",
            tone: "Encouraging, clear and analogy-rich. Avoid jargon where possible.",
            focus: "Foundational concepts, mental models and why this matters.",
        },
        Level::Intermediate => Audience {
            persona: "Senior Colleague / Team Lead",
            tone: "Professional and pragmatic, focused on best practices.",
            focus: "Clean code, common pitfalls and industry standards.",
        },
        Level::Advanced => Audience {
            persona: "Distinguished Systems Architect",
            tone: "Deeply technical, no fluff, internals first.",
            focus: "Memory layout, runtime internals, race conditions and trade-offs.",
        },
    }
}

/// Stack-specific requirements picked up from the subject text.
fn stack_requirements(subject: &str, level: Level) -> Vec<&'static str> {
    if level == Level::Beginner {
        return vec!["Use real-world analogies.", "Explain 'magic' words simply."];
    }

    let subject = subject.to_lowercase();
    let mut reqs = Vec::new();
    if subject.contains("javascript") || subject.contains("node") || subject.contains("v8") {
        reqs.push("Mention memory management and garbage collection implications.");
        if level == Level::Advanced {
            reqs.push("Discuss engine internals (call stack, heap, event loop).");
        }
    }
    if subject.contains("react") || subject.contains("frontend") {
        reqs.push("Strictly separate logic (hooks) from UI.");
        if level == Level::Advanced {
            reqs.push("Discuss the render cycle and reconciliation.");
        }
    }
    if level == Level::Intermediate {
        reqs.push("Focus on how this is done in production.");
    }
    reqs
}

fn bullets(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markdown guide for one section of a topic.
pub fn explanation(topic: &str, section: &str, context: &str, language: &str, level: Level) -> String {
    let who = audience(level);
    let reqs = stack_requirements(&format!("{} {} {}", topic, section, context), level);
    let beginner = level == Level::Beginner;

    format!(
        r#"You are a {persona}.
Write a guide on **"{section}"** (Topic: {topic}) for a **{level}** audience.

**TONE & FOCUS**:
- {tone}
- Focus: {focus}

**TECHNICAL REQUIREMENTS**:
{reqs}
- Code language: **{language}**
{context_block}
**CONTENT STRUCTURE (Markdown)**:

### {section}

#### {h1}
#### {h2}
#### {h3}
#### {h4}
```{language_lower}
// example
```
#### {h5}

Generate now:"#,
        persona = who.persona,
        section = section,
        topic = topic,
        level = level.as_str().to_uppercase(),
        tone = who.tone,
        focus = who.focus,
        reqs = bullets(&reqs),
        language = language.to_uppercase(),
        language_lower = language.to_lowercase(),
        context_block = if context.trim().is_empty() {
            String::new()
        } else {
            format!("\n**LESSON CONTEXT**:\n{}\n", context.trim())
        },
        h1 = if beginner { "Concept" } else { "Context" },
        h2 = if beginner { "How it Works" } else { "Internals" },
        h3 = if beginner { "Common Mistakes" } else { "Trade-offs" },
        h4 = if beginner { "Simple Example" } else { "Production Implementation" },
        h5 = if beginner { "Remember This" } else { "Mental Model" },
    )
}

/// Direct answer to a learner's question.
pub fn answer(question: &str, context: &QuestionContext, language: &str, level: Level) -> String {
    let who = audience(level);
    let code = match context.current_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => format!("\n```{}\n{}\n```", language.to_lowercase(), code),
        None => "None".to_string(),
    };

    format!(
        r#"You are a {persona}.
QUESTION: "{question}"
TOPIC: {topic} / {section}
LEVEL: {level}
CODE CONTEXT: {code}

Answer for a {level_lower} audience. {style}
If code is involved, use **{language}**.

**OUTPUT STRUCTURE**:
#### Answer
#### {detail}
#### {example}"#,
        persona = who.persona,
        question = question,
        topic = context.topic.as_deref().unwrap_or("General"),
        section = context.section.as_deref().unwrap_or("General"),
        level = level.as_str().to_uppercase(),
        level_lower = level.as_str(),
        code = code,
        style = if level == Level::Beginner {
            "Use analogies. Be encouraging."
        } else {
            "Be brief. Focus on internals and correctness."
        },
        language = language.to_uppercase(),
        detail = if level == Level::Beginner { "Explanation" } else { "Technical Detail" },
        example = if level == Level::Beginner { "Example" } else { "Solution" },
    )
}

/// Five multiple-choice interview questions.
pub fn quiz(topic: &str, section: &str, language: &str, content: &str, level: Level) -> String {
    let focus = match level {
        Level::Beginner => "Fundamentals & Syntax",
        Level::Intermediate => "Patterns & Best Practices",
        Level::Advanced => "Internals, Trade-offs & Debugging",
    };
    let material = if content.trim().is_empty() {
        String::new()
    } else {
        format!("\nBASE THE QUESTIONS ON THIS MATERIAL:\n{}\n", content.trim())
    };

    format!(
        r#"Generate 5 **{level} LEVEL** interview questions.
TOPIC: {topic}
SECTION: {section}
LANGUAGE: {language}
FOCUS: {focus}
{material}
REQUIREMENTS:
- Questions must suit a {level_lower} developer.
- Exactly 4 options each.
- The explanation is a teaching moment.

OUTPUT FORMAT (JSON only, array):
[
  {{ "question": "...", "options": ["A", "B", "C", "D"], "correctIndex": 0, "explanation": "..." }}
]"#,
        level = level.as_str().to_uppercase(),
        level_lower = level.as_str(),
        topic = topic,
        section = section,
        language = language,
        focus = focus,
        material = material,
    )
}

/// Test cases for a coding problem.
pub fn test_cases(title: &str, description: Option<&str>, signature: Option<&str>) -> String {
    let mut prompt = format!(
        "Generate comprehensive test cases for the coding problem: \"{}\"\n",
        title
    );
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("\nProblem Description: {}\n", description.trim()));
    }
    if let Some(signature) = signature.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("Function Signature: {}\n", signature.trim()));
    }
    prompt.push_str(
        r#"
Generate test cases in TWO categories:
1. Sample cases (2-3): basic examples that demonstrate the problem.
2. Hidden cases (10-15): edge cases, large inputs, corner cases, negatives and duplicates where applicable.

Format as JSON:
{
  "sampleCases": [{ "input": { "nums": [2, 7, 11, 15], "target": 9 }, "expected": [0, 1], "description": "..." }],
  "hiddenCases": [{ "input": { "nums": [3, 2, 4], "target": 6 }, "expected": [1, 2] }]
}"#,
    );
    prompt
}

/// Review, debug or optimization pass over a code snippet.
pub fn code_analysis(code: &str, mode: AnalysisMode, language: &str, level: Level) -> String {
    let beginner = level == Level::Beginner;
    let (persona, task) = match mode {
        AnalysisMode::Debug if beginner => (
            "Friendly Debugging Mentor",
            "Explain the bug simply. Show how to fix it step by step.",
        ),
        AnalysisMode::Debug => (
            "Systems Debugger & Root Cause Analyst",
            "Find logic errors and race conditions. Ignore style. Fix it efficiently.",
        ),
        AnalysisMode::Optimize if beginner => (
            "Code Optimization Guide",
            "Show a faster way to do this and explain why it is faster.",
        ),
        AnalysisMode::Optimize => (
            "Performance Architect",
            "Analyze Big O. Optimize for cache locality and allocations.",
        ),
        AnalysisMode::Review if beginner => (
            "Code Review Mentor",
            "Point out good things. Suggest 1-2 easy improvements.",
        ),
        AnalysisMode::Review => (
            "Principal Security Engineer",
            "Strict review: security, maintainability, patterns.",
        ),
    };

    format!(
        r#"You are a {persona}.
TASK: {task}
AUDIENCE: {level}
TONE: {tone}

CODE TO ANALYZE ({language}):
```{language}
{code}
```

OUTPUT FORMAT (Markdown):
#### Analysis
#### Fix / Improvement
#### Refactored Code
#### Best Practice"#,
        persona = persona,
        task = task,
        level = level.as_str().to_uppercase(),
        tone = if beginner {
            "Educational & Encouraging"
        } else {
            "Professional & Strict"
        },
        language = language,
        code = code,
    )
}

/// Code translation between languages.
pub fn translation(code: &str, source: &str, target: &str) -> String {
    format!(
        r#"Translate the following {source} code to {target}.

RULES:
1. Keep logic, variable names and comments wherever possible.
2. Adapt syntax to {target} idioms.
3. If a library or feature does not exist, use the closest equivalent or add a comment.
4. RETURN ONLY CODE. NO MARKDOWN. NO EXPLANATIONS.

CODE:
{code}"#,
        source = source,
        target = target,
        code = code,
    )
}

/// Module structure for a learning path.
pub fn learning_path(topics: &[String], path_name: &str, level: Level) -> String {
    let topics_json = serde_json::to_string(topics).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You are an expert curriculum designer.
Goal: create a structured learning path called "{path_name}".
Target audience: {level}
Topics to include: {topics_json}

Requirements:
- Group topics into logical modules.
- Order them so dependencies come first.
- Estimate hours for each module.

Output (JSON):
{{
  "modules": [{{ "title": "Module 1: Name", "description": "Brief summary", "topics": ["topic_slug"], "estimatedHours": 5 }}],
  "totalEstimatedHours": 20
}}"#,
        path_name = path_name,
        level = level.as_str(),
        topics_json = topics_json,
    )
}

/// Group name for a single category.
pub fn group_assignment(category: &str, topic_slug: &str) -> String {
    let topic = if topic_slug.trim().is_empty() {
        "general"
    } else {
        topic_slug
    };
    format!(
        r#"You are an expert in software engineering curricula.
TASK: create a SPECIFIC, MEANINGFUL group name for:
- Category: "{category}"
- Topic: "{topic}"

PRIORITIES:
1. Study order (01-03 = Fundamentals, 04+ = Intermediate).
2. Specific names (e.g. "JavaScript Functions", not "Functions").
3. Include the topic name in the group name.

OUTPUT JSON ONLY:
{{ "group": "Specific Descriptive Name", "confidence": 90, "reasoning": "Explanation" }}"#,
        category = category,
        topic = topic,
    )
}

/// Group names for a batch of categories already in study order.
pub fn group_batch(ordered: &[CategoryRef], topic_slug: &str) -> String {
    let listing = ordered
        .iter()
        .enumerate()
        .map(|(i, c)| match &c.key {
            Some(key) => format!("{}. {} ({})", i + 1, c.name, key),
            None => format!("{}. {}", i + 1, c.name),
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an expert curriculum architect.
TASK: organize {count} learning categories for "{topic}" into 4-7 logical study groups.

CATEGORIES (IN STUDY ORDER):
{listing}

PRINCIPLES:
1. Respect study order (early categories are fundamentals).
2. Group by phase of learning.
3. 4-7 groups in total, 3-8 categories each.
4. Use specific technical names (e.g. "01. Fundamentals"), never generic ones like "Basics".

OUTPUT JSON OBJECT ONLY:
{{ "CategoryName": "GroupName" }}"#,
        count = ordered.len(),
        topic = topic_slug,
        listing = listing,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explanation_varies_by_level() {
        let beginner = explanation("javascript", "Closures", "", "javascript", Level::Beginner);
        let advanced = explanation("javascript", "Closures", "", "javascript", Level::Advanced);

        assert!(beginner.contains("Patient Mentor"));
        assert!(beginner.contains("real-world analogies"));
        assert!(advanced.contains("engine internals"));
        assert!(advanced.contains("#### Mental Model"));
        assert!(!advanced.contains("LESSON CONTEXT"));
    }

    #[test]
    fn test_answer_embeds_code_context() {
        let ctx = QuestionContext {
            topic: Some("react".to_string()),
            section: Some("Hooks".to_string()),
            current_code: Some("useEffect(() => {}, [])".to_string()),
        };
        let prompt = answer("Why does this run once?", &ctx, "javascript", Level::Intermediate);
        assert!(prompt.contains("```javascript\nuseEffect"));
        assert!(prompt.contains("TOPIC: react / Hooks"));
    }

    #[test]
    fn test_structured_prompts_show_schema() {
        assert!(quiz("js", "Loops", "javascript", "", Level::Advanced).contains("correctIndex"));
        assert!(test_cases("Two Sum", None, None).contains("hiddenCases"));
        assert!(learning_path(&["js".to_string()], "Web", Level::Beginner).contains("totalEstimatedHours"));
        assert!(group_assignment("Closures", "").contains("Topic: \"general\""));
    }

    #[test]
    fn test_group_batch_lists_in_given_order() {
        let cats = vec![
            CategoryRef {
                name: "Variables".to_string(),
                order: 1,
                key: Some("vars".to_string()),
            },
            CategoryRef {
                name: "Async".to_string(),
                order: 5,
                key: None,
            },
        ];
        let prompt = group_batch(&cats, "javascript");
        assert!(prompt.contains("1. Variables (vars)\n2. Async"));
        assert!(prompt.contains("organize 2 learning categories"));
    }

    #[test]
    fn test_code_analysis_modes() {
        let debug = code_analysis("x = 1", AnalysisMode::Debug, "python", Level::Advanced);
        assert!(debug.contains("Root Cause"));
        let review = code_analysis("x = 1", AnalysisMode::Review, "python", Level::Beginner);
        assert!(review.contains("Code Review Mentor"));
        assert!(review.contains("Educational"));
    }
}
