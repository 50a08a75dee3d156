use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::process::ExitCode;
use termscout_core::setup::{self, EnvFileStatus};
use termscout_core::{
    BackendKind, BackendSettings, ConfigLoader, CrewInputs, CrewOptions, EXAMPLE_QUERIES,
    TelemetryOptions, create_backend, extract_entity_match, init_telemetry, placeholder_count,
    resolve_query, run_crew,
};
use tokio::runtime::Runtime;
use tracing::{info, warn};

const QUERY_PROMPT: &str = "What terms and conditions would you like to find? ";
const RULE: &str = "==================================================";

#[derive(Parser, Debug)]
#[command(
    name = "termscout",
    version,
    about = "Find and summarise the terms & conditions of a company, product, or service"
)]
struct Cli {
    /// Directory containing agents.yaml and tasks.yaml.
    #[arg(long, global = true, env = "TERMSCOUT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask for a request, research it and print the summary (default).
    Run(RunArgs),
    /// Print the entity name found in a request.
    Extract(ExtractArgs),
    /// Print the crew templates interpolated for an entity.
    Render(RenderArgs),
    /// Create .env from .env.example and check the local Ollama install.
    Setup(SetupArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Request to answer; prompts interactively when omitted.
    #[arg(long)]
    query: Option<String>,

    /// Directory to write the reporting task's output file into.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Override TERMSCOUT_BACKEND (`ollama` or `offline`).
    #[arg(long)]
    backend: Option<String>,

    /// Override OLLAMA_MODEL.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Free-form request text.
    text: String,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Entity name substituted for `{entity_name}`.
    #[arg(long)]
    entity: String,
}

#[derive(Args, Debug)]
struct SetupArgs {
    /// Directory holding .env.example.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Replace an existing .env without asking.
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();

    init_telemetry(TelemetryOptions::default())?;

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run(RunArgs::default()));

    match command {
        Command::Run(args) => {
            let rt = Runtime::new()?;
            rt.block_on(run_command(cli.config_dir, args))
        }
        Command::Extract(args) => Ok(extract_command(args)),
        Command::Render(args) => render_command(cli.config_dir, args),
        Command::Setup(args) => setup_command(args),
    }
}

async fn run_command(config_dir: Option<PathBuf>, args: RunArgs) -> Result<ExitCode> {
    let query = match args.query {
        Some(query) => query,
        None => read_line(QUERY_PROMPT),
    };

    let entity = match resolve_query(&query) {
        Ok(entity) => entity,
        Err(err) if err.is_entity_not_identified() => {
            print_examples();
            return Ok(ExitCode::SUCCESS);
        }
        Err(err) => return Err(err.into()),
    };

    println!("\nFinding terms and conditions for: {entity}");
    println!("This may take a few moments...\n");

    let templates = ConfigLoader::load(config_dir)?;

    let mut settings = BackendSettings::from_env()?;
    if let Some(kind) = args.backend.as_deref() {
        settings.kind = BackendKind::parse(kind)?;
    }
    if let Some(model) = args.model {
        settings.model = model;
    }

    let backend = create_backend(&settings)?;
    let mut options = CrewOptions::prepare(&templates, CrewInputs::new(&entity), backend, &settings)?;
    if let Some(dir) = args.output_dir {
        options = options.with_output_dir(dir);
    }

    info!(%entity, "starting crew");
    let outcome = match run_crew(options).await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("\nError: {err}");
            return Err(err).context("an error occurred while running the crew");
        }
    };

    println!("\nSummary of Terms and Conditions:");
    println!("{RULE}");
    println!("{}", outcome.summary);
    println!("{RULE}");
    if let Some(path) = &outcome.report_path {
        println!("\nReport written to {}", path.display());
    }
    println!(
        "\nNote: This is a summary of the key points. Please refer to the original document for complete details."
    );

    Ok(ExitCode::SUCCESS)
}

fn extract_command(args: ExtractArgs) -> ExitCode {
    match extract_entity_match(&args.text) {
        Some(found) => {
            info!(rule = found.rule, tier = ?found.tier, "entity rule matched");
            println!("{}", found.entity);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("no entity identified");
            ExitCode::FAILURE
        }
    }
}

fn render_command(config_dir: Option<PathBuf>, args: RenderArgs) -> Result<ExitCode> {
    let templates = ConfigLoader::load(config_dir)?;
    let rendered = templates.render(&CrewInputs::new(&args.entity).to_bindings())?;

    let remaining = placeholder_count(&rendered.agents) + placeholder_count(&rendered.tasks);
    if remaining > 0 {
        warn!(remaining, "entity name itself contains the placeholder token");
    }

    println!("# agents.yaml");
    print!("{}", serde_yaml::to_string(&rendered.agents)?);
    println!("\n# tasks.yaml");
    print!("{}", serde_yaml::to_string(&rendered.tasks)?);
    Ok(ExitCode::SUCCESS)
}

fn setup_command(args: SetupArgs) -> Result<ExitCode> {
    println!("Setting up the Terms & Conditions Assistant environment...");

    let env_path = args.dir.join(setup::ENV_FILE);
    let overwrite = if env_path.exists() && !args.force {
        let answer = read_line(".env file already exists. Do you want to overwrite it? (y/n) ");
        answer.eq_ignore_ascii_case("y")
    } else {
        args.force
    };

    match setup::ensure_env_file(&args.dir, overwrite)? {
        EnvFileStatus::Created => {
            println!("Created .env file from .env.example");
            println!("Please edit the .env file to add your API keys");
        }
        EnvFileStatus::KeptExisting => println!("Keeping existing .env file."),
        EnvFileStatus::TemplateMissing => {
            println!(".env.example file not found. Please create .env manually.")
        }
    }

    let ollama = setup::check_ollama();
    if ollama.installed {
        println!("Ollama is installed");
    } else {
        println!("Ollama is not installed or not in PATH");
        println!("Please install Ollama from https://ollama.ai/");
    }
    if ollama.running {
        println!("Ollama is running");
    } else {
        println!("Ollama is not running");
        println!("Please start Ollama with: ollama serve");
    }

    println!("\nSetup complete! You can now run: termscout run");
    Ok(ExitCode::SUCCESS)
}

/// Read one edited line; input errors are reported and yield an empty string.
fn read_line(prompt: &str) -> String {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("Error getting input: {err}");
            return String::new();
        }
    };

    match editor.readline(prompt) {
        Ok(line) => {
            let input = line.trim().to_string();
            let _ = editor.add_history_entry(input.as_str());
            input
        }
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => String::new(),
        Err(err) => {
            eprintln!("Error getting input: {err}");
            String::new()
        }
    }
}

fn print_examples() {
    println!("I couldn't identify which company, product, or service you're interested in.");
    println!("Please try again with a more specific request, like:");
    for example in EXAMPLE_QUERIES {
        println!("  - {example}");
    }
}
