use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use prephub_core::{AnalysisMode, CategoryRef, Level, QuestionContext};
use prephub_runtime::ContentService;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "prephub",
    author,
    version,
    about = "Generate PrepHub learning content through the AI fallback chain",
    long_about = "Every command walks the configured providers in order (Groq, Gemini, \
                  Hugging Face by default) and prints JSON.\nCredentials come from \
                  GROQ_API_KEY, GEMINI_API_KEY, HUGGING_FACE_API_KEY and their _2.._9 variants."
)]
pub struct Cli {
    /// Runtime config (YAML). Missing file means defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON file used as the durable cache tier
    #[arg(long, global = true)]
    pub cache_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Explain one section of a topic")]
    Explain(ExplainArgs),

    #[command(about = "Answer a learner's question")]
    Ask(AskArgs),

    #[command(about = "Generate a multiple-choice quiz")]
    Quiz(QuizArgs),

    #[command(about = "Generate test cases for a coding problem")]
    TestCases(TestCasesArgs),

    #[command(about = "Review, debug or optimize code")]
    Analyze(AnalyzeArgs),

    #[command(about = "Translate code to another language")]
    Translate(TranslateArgs),

    #[command(about = "Structure topics into a learning path")]
    Path(PathArgs),

    #[command(about = "Assign a group to one category")]
    Group(GroupArgs),

    #[command(about = "Assign groups to a batch of categories")]
    GroupBatch(GroupBatchArgs),

    #[command(about = "List backends in fallback order")]
    Backends(BackendsArgs),

    #[command(about = "Remove expired records from the cache file")]
    PurgeCache,
}

#[derive(Args)]
pub struct ExplainArgs {
    #[arg(long)]
    pub topic: String,

    #[arg(long)]
    pub section: String,

    /// Lesson text the explanation should build on
    #[arg(long, default_value = "")]
    pub context: String,

    #[arg(long, default_value = "javascript")]
    pub language: String,

    #[arg(long, default_value = "advanced")]
    pub level: Level,
}

#[derive(Args)]
pub struct AskArgs {
    pub question: String,

    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub section: Option<String>,

    /// File holding the code the learner has open
    #[arg(long)]
    pub code_file: Option<PathBuf>,

    #[arg(long, default_value = "javascript")]
    pub language: String,

    #[arg(long, default_value = "advanced")]
    pub level: Level,
}

#[derive(Args)]
pub struct QuizArgs {
    #[arg(long)]
    pub topic: String,

    #[arg(long)]
    pub section: String,

    /// Ignore the cached quiz and generate a new one
    #[arg(long)]
    pub regenerate: bool,

    #[arg(long, default_value = "javascript")]
    pub language: String,

    /// Lesson text to base questions on
    #[arg(long, default_value = "")]
    pub content: String,

    #[arg(long, default_value = "advanced")]
    pub level: Level,
}

#[derive(Args)]
pub struct TestCasesArgs {
    /// Problem title
    #[arg(long, required_unless_present = "prompt")]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub signature: Option<String>,

    /// Use this prompt verbatim instead of building one
    #[arg(long, conflicts_with_all = ["title", "description", "signature"])]
    pub prompt: Option<String>,
}

#[derive(Args)]
pub struct CodeInput {
    /// Code as a literal string
    #[arg(long, conflicts_with = "file")]
    pub code: Option<String>,

    /// Read code from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl CodeInput {
    fn read(&self) -> Result<String> {
        match (&self.code, &self.file) {
            (Some(code), _) => Ok(code.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display())),
            (None, None) => bail!("Provide code with --code or --file"),
        }
    }
}

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: CodeInput,

    #[arg(long, default_value = "review")]
    pub mode: AnalysisMode,

    #[arg(long, default_value = "javascript")]
    pub language: String,

    #[arg(long, default_value = "advanced")]
    pub level: Level,
}

#[derive(Args)]
pub struct TranslateArgs {
    #[command(flatten)]
    pub input: CodeInput,

    #[arg(long)]
    pub from: String,

    #[arg(long)]
    pub to: String,
}

#[derive(Args)]
pub struct PathArgs {
    /// Learning path name
    #[arg(long)]
    pub name: String,

    /// Topic slugs, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub topics: Vec<String>,

    #[arg(long, default_value = "advanced")]
    pub level: Level,
}

#[derive(Args)]
pub struct GroupArgs {
    pub category: String,

    #[arg(long, default_value = "")]
    pub topic: String,
}

#[derive(Args)]
pub struct GroupBatchArgs {
    #[arg(long)]
    pub topic: String,

    /// Categories as name[:order[:key]]
    #[arg(value_parser = parse_category)]
    pub categories: Vec<CategoryRef>,
}

#[derive(Args)]
pub struct BackendsArgs {
    /// Probe each backend
    #[arg(long)]
    pub check: bool,
}

/// Parse `name[:order[:key]]`.
pub fn parse_category(raw: &str) -> Result<CategoryRef, String> {
    let mut parts = raw.splitn(3, ':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(format!("category '{}' has no name", raw));
    }

    let order = match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(order) => order
            .parse::<i64>()
            .map_err(|_| format!("category '{}' has a non-numeric order", raw))?,
        None => 0,
    };
    let key = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(CategoryRef {
        name: name.to_string(),
        order,
        key,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(service: &ContentService, command: Commands) -> Result<()> {
    match command {
        Commands::Explain(args) => print_json(
            &service
                .generate_explanation(
                    &args.topic,
                    &args.section,
                    &args.context,
                    &args.language,
                    args.level,
                )
                .await,
        ),
        Commands::Ask(args) => {
            let current_code = match &args.code_file {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let context = QuestionContext {
                topic: args.topic,
                section: args.section,
                current_code,
            };
            print_json(
                &service
                    .answer_question(&args.question, &context, &args.language, args.level)
                    .await,
            )
        }
        Commands::Quiz(args) => print_json(
            &service
                .generate_quiz(
                    &args.topic,
                    &args.section,
                    args.regenerate,
                    &args.language,
                    &args.content,
                    args.level,
                )
                .await,
        ),
        Commands::TestCases(args) => {
            let content = match (&args.prompt, &args.title) {
                (Some(prompt), _) => service.generate_test_cases(prompt).await,
                (None, Some(title)) => {
                    service
                        .generate_problem_test_cases(
                            title,
                            args.description.as_deref(),
                            args.signature.as_deref(),
                        )
                        .await
                }
                (None, None) => bail!("Provide --title or --prompt"),
            };
            print_json(&content)
        }
        Commands::Analyze(args) => {
            let code = args.input.read()?;
            print_json(
                &service
                    .analyze_code(&code, args.mode, &args.language, args.level)
                    .await,
            )
        }
        Commands::Translate(args) => {
            let code = args.input.read()?;
            print_json(
                &service
                    .translate_code_block(&code, &args.from, &args.to)
                    .await,
            )
        }
        Commands::Path(args) => print_json(
            &service
                .structure_learning_path(&args.topics, &args.name, args.level)
                .await,
        ),
        Commands::Group(args) => print_json(
            &service
                .assign_group_with_ai(&args.category, &args.topic)
                .await,
        ),
        Commands::GroupBatch(args) => print_json(
            &service
                .assign_group_batch(&args.categories, &args.topic)
                .await,
        ),
        Commands::Backends(args) => {
            let pool = service.orchestrator().pool();
            if args.check {
                print_json(&pool.health_check().await)
            } else {
                print_json(&pool.describe())
            }
        }
        // Handled before the service is built.
        Commands::PurgeCache => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_forms() {
        let full = parse_category("Closures:4:fn").unwrap();
        assert_eq!(full.name, "Closures");
        assert_eq!(full.order, 4);
        assert_eq!(full.key.as_deref(), Some("fn"));

        let bare = parse_category("Variables").unwrap();
        assert_eq!(bare.order, 0);
        assert!(bare.key.is_none());
    }

    #[test]
    fn test_parse_category_rejects_bad_input() {
        assert!(parse_category(":3").is_err());
        assert!(parse_category("Loops:first").is_err());
    }

    #[test]
    fn test_cli_parses_group_batch() {
        let cli = Cli::try_parse_from([
            "prephub",
            "--verbose",
            "group-batch",
            "--topic",
            "javascript",
            "Async:7",
            "Variables:1:vars",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::GroupBatch(args) => {
                assert_eq!(args.categories.len(), 2);
                assert_eq!(args.categories[1].key.as_deref(), Some("vars"));
            }
            _ => panic!("expected group-batch"),
        }
    }

    #[test]
    fn test_cli_parses_level_and_topics() {
        let cli = Cli::try_parse_from([
            "prephub", "path", "--name", "Web", "--topics", "html,css,js", "--level", "beginner",
        ])
        .unwrap();
        match cli.command {
            Commands::Path(args) => {
                assert_eq!(args.topics, vec!["html", "css", "js"]);
                assert_eq!(args.level, Level::Beginner);
            }
            _ => panic!("expected path"),
        }
    }
}
