/// script_gen: compile story text into a Prompt, or generate a Script from one.
///
/// Usage:
///   script_gen compile --story <txt> --out <json> [--canon-cmd <bin>] [--skip-canon]
///   script_gen generate --prompt <json> --out <json>
///
/// Exit codes: 0 success, 1 rejected input or failed check, 2 canon tool unavailable.
/// Set RUST_LOG (default `warn`) for diagnostics on stderr.

use clap::{Parser, Subcommand};
use script_engine::core::canonical;
use script_engine::core::pipeline::ScriptPipeline;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

#[derive(Parser)]
#[command(
    name = "script_gen",
    about = "Deterministic Prompt to Script generator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a story text file into a validated StoryPrompt JSON
    Compile {
        /// Path to the story text file
        #[arg(long)]
        story: PathBuf,

        /// Output path for the StoryPrompt JSON
        #[arg(long)]
        out: PathBuf,

        /// Canon checker invoked as `<cmd> validate-story-draft --prompt <file>`
        #[arg(long, visible_alias = "world-engine-cmd", default_value = "world-engine")]
        canon_cmd: String,

        /// Skip the canon check (development only)
        #[arg(long)]
        skip_canon: bool,
    },

    /// Generate a Script JSON from a StoryPrompt JSON
    Generate {
        /// Path to the StoryPrompt JSON
        #[arg(long)]
        prompt: PathBuf,

        /// Output path for the Script JSON
        #[arg(long)]
        out: PathBuf,
    },
}

/// Failure with the exit code it maps to.
struct Failure {
    code: u8,
    message: String,
}

impl Failure {
    fn rejected(message: impl ToString) -> Self {
        Self {
            code: 1,
            message: message.to_string(),
        }
    }

    fn unavailable(message: impl ToString) -> Self {
        Self {
            code: 2,
            message: message.to_string(),
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            story,
            out,
            canon_cmd,
            skip_canon,
        } => compile(&story, &out, &canon_cmd, skip_canon),
        Commands::Generate { prompt, out } => generate(&prompt, &out),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("ERROR: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn compile(story: &Path, out: &Path, canon_cmd: &str, skip_canon: bool) -> Result<(), Failure> {
    let pipeline = ScriptPipeline::builtin().map_err(Failure::rejected)?;
    let prompt = pipeline.compile(story).map_err(Failure::rejected)?;
    let bytes = canonical::to_canonical_bytes(&prompt).map_err(Failure::rejected)?;

    // The canon checker reads a file, so stage the draft outside `out`.
    let staged = tempfile::Builder::new()
        .prefix("story-prompt-")
        .suffix(".json")
        .tempfile()
        .map_err(Failure::rejected)?;
    std::fs::write(staged.path(), &bytes).map_err(Failure::rejected)?;

    if skip_canon {
        eprintln!("WARNING: canon validation skipped (--skip-canon)");
    } else {
        check_canon(canon_cmd, staged.path())?;
    }

    canonical::commit_bytes(&bytes, out).map_err(Failure::rejected)?;
    Ok(())
}

fn check_canon(canon_cmd: &str, draft: &Path) -> Result<(), Failure> {
    let output = Command::new(canon_cmd)
        .arg("validate-story-draft")
        .arg("--prompt")
        .arg(draft)
        .output()
        .map_err(|e| {
            Failure::unavailable(format!(
                "canon checker '{}' could not be run: {}\n\
                 Install it or pass --skip-canon to bypass canon validation.",
                canon_cmd, e
            ))
        })?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("(no output)");
    Err(Failure::rejected(format!("canon validation failed:\n{}", detail)))
}

fn generate(prompt: &Path, out: &Path) -> Result<(), Failure> {
    let pipeline = ScriptPipeline::builtin().map_err(Failure::rejected)?;
    pipeline
        .run_file(prompt, out)
        .map(|_| ())
        .map_err(Failure::rejected)
}
