use regcon::batch::{load_questions, write_answers, BatchRunner};
use regcon::cli::{Cli, Commands, ConfigAction};
use regcon::config::{Config, ConfigValidator};
use regcon::consultant::{embedding_provider, expand_path, Consultant, KnowledgeBaseManager};
use regcon::error::{RegconError, Result};
use regcon::usage::UsageLog;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Ask {
            question,
            mode,
            profile,
            usage,
        } => {
            cmd_ask(cli.config, &question, mode, profile, usage)?;
        }
        Commands::Batch {
            file,
            output,
            workers,
            mode,
            profile,
        } => {
            cmd_batch(cli.config, &file, output, workers, mode, profile)?;
        }
        Commands::Build { force } => {
            cmd_build(cli.config, force)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "regcon=debug" } else { "regcon=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    mode: Option<String>,
    profile: Option<String>,
    show_usage: bool,
) -> Result<()> {
    let config = load_config(config_path, profile, mode)?;
    let consultant = Consultant::from_config(&config)?;

    let mut usage = UsageLog::new();
    let answer = consultant
        .orchestrator()
        .answer_with_usage(question, &mut usage);

    println!("{}", answer);

    if show_usage {
        print_usage(&usage);
        let report = usage.save_report(&expand_path(&config.storage.logs_dir)?)?;
        println!("\nUsage report saved to {}", report.display());
    }

    Ok(())
}

fn cmd_batch(
    config_path: Option<PathBuf>,
    file: &Path,
    output: Option<PathBuf>,
    workers: Option<usize>,
    mode: Option<String>,
    profile: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_path, profile, mode)?;
    if let Some(workers) = workers {
        config.batch.max_concurrent = workers;
        ConfigValidator::validate(&config)?;
    }

    let questions = load_questions(file)?;
    if questions.is_empty() {
        println!("No questions found in {}", file.display());
        return Ok(());
    }

    let consultant = Consultant::from_config(&config)?;
    let runner = BatchRunner::new(consultant.orchestrator(), config.batch.max_concurrent);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| RegconError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })?;
    let report = runtime.block_on(runner.run(questions));

    let output = output.unwrap_or_else(|| file.with_extension("answers.jsonl"));
    write_answers(&output, &report.answers)?;

    println!("✓ Answers written to {}", output.display());
    println!("{}", report.summary);

    print_usage(&report.usage);
    report
        .usage
        .save_report(&expand_path(&config.storage.logs_dir)?)?;

    Ok(())
}

fn cmd_build(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config = load_config(config_path, None, None)?;
    let provider = embedding_provider(&config)?;
    let manager = KnowledgeBaseManager::new(&config, provider)?;

    if !force && !manager.needs_rebuild() {
        println!(
            "Artifacts in {} are up to date (use --force to rebuild)",
            manager.artifacts().dir().display()
        );
        return Ok(());
    }

    let knowledge_base = manager.build()?;
    println!("✓ Knowledge base built");
    println!("  Chunks: {}", knowledge_base.len());
    println!(
        "  Model:  {} ({}D)",
        knowledge_base.embedding_model, knowledge_base.dimension
    );
    if config.knowledge_base.save_artifacts {
        println!("  Saved:  {}", manager.artifacts().dir().display());
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, None, None)?;
            let value = serde_json::to_value(&config).map_err(|e| RegconError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value
                    .get(&section)
                    .cloned()
                    .ok_or_else(|| RegconError::Config(format!("Unknown section: {}", section)))?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&shown).map_err(|e| RegconError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Pipeline mode:  {}", config.pipeline.mode);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    mode: Option<String>,
) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = Config::load_or_default(&path, profile.as_deref())?;

    if let Some(mode) = mode {
        config.pipeline.mode = mode;
    }
    ConfigValidator::validate(&config)?;

    Ok(config)
}

fn print_usage(usage: &UsageLog) {
    let tokens = usage.token_summary();
    if !tokens.is_empty() {
        println!("\n--- Token usage (model + task) ---");
        for row in tokens {
            println!(
                "{:<40} {:<30} calls {:>4}  prompt {:>8}  completion {:>8}  total {:>8}  {:>6.2}%",
                row.model,
                row.task,
                row.calls,
                row.prompt_tokens,
                row.completion_tokens,
                row.total_tokens,
                row.share
            );
        }
    }

    let timings = usage.timing_summary();
    if !timings.is_empty() {
        println!("\n--- Time usage (task) ---");
        for row in timings {
            println!(
                "{:<30} calls {:>4}  total {:>10.1}ms  mean {:>8.1}ms  min {:>8.1}ms  max {:>8.1}ms  {:>6.2}%",
                row.task, row.calls, row.total_ms, row.mean_ms, row.min_ms, row.max_ms, row.share
            );
        }
    }
}
