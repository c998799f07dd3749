use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use draftmaid::app::App;
use draftmaid::config::Config;
use draftmaid::engine::MermaidCli;
use draftmaid::export::{ExportFormat, Exporter, encode};
use draftmaid::generate::{GeminiBackend, GenerationClient, Generator};
use draftmaid::kind::DiagramKind;
use draftmaid::render::{RenderOutcome, RendererAdapter};
use draftmaid::shell::Studio;
use draftmaid::store::{JsonFileBackend, PreferenceStore};
use draftmaid::theme::Theme;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Turn plain-language descriptions into Mermaid diagrams
#[derive(Parser, Debug)]
#[command(name = "draftmaid")]
#[command(version)]
#[command(about = "Describe a process in words, get a Mermaid diagram as SVG or PNG", long_about = None)]
struct Args {
    /// Config file (TOML or YAML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log more (repeat for trace output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive editor session (default)
    Studio,

    /// Generate Mermaid code from a description and print it
    Generate {
        /// Diagram kind: flowchart, sequence, gantt, class, state
        #[arg(short, long, default_value = "flowchart")]
        kind: DiagramKind,

        /// Description text (use "-" or omit for stdin)
        #[arg(value_name = "TEXT")]
        text: Option<String>,
    },

    /// Render a Mermaid file (extension of OUTPUT determines format: .svg or .png)
    Render {
        /// Input .mmd file (use "-" for stdin)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        #[arg(short, long, default_value = "light")]
        theme: Theme,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config::load(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Studio) {
        Command::Studio => run_studio(&config),
        Command::Generate { kind, text } => run_generate(&config, kind, text),
        Command::Render {
            input,
            output,
            theme,
        } => run_render(&config, &input, &output, theme),
        Command::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Args::command(),
                "draftmaid",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "draftmaid=debug",
        _ => "draftmaid=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn generation_client(config: &Config) -> GenerationClient<GeminiBackend> {
    let generation = &config.generation;
    GenerationClient::from_env(
        GeminiBackend::new(&generation.endpoint),
        &generation.model,
        &generation.api_key_env,
    )
}

fn run_studio(config: &Config) -> Result<()> {
    let preferences = config.preferences_path();
    let app = App::load(PreferenceStore::new(JsonFileBackend::open(&preferences)));

    let client = generation_client(config);
    if !client.has_credential() {
        eprintln!(
            "Warning: {} is not set; generation will fail until it is.",
            config.generation.api_key_env
        );
    }

    let mut studio = Studio::new(
        app,
        client,
        MermaidCli::new(&config.renderer.mmdc),
        Exporter::new(&config.export.output_dir),
    );
    let stdin = std::io::stdin();
    studio
        .run(stdin.lock(), std::io::stdout())
        .context("Interactive session failed")
}

fn run_generate(config: &Config, kind: DiagramKind, text: Option<String>) -> Result<()> {
    let text = match text.as_deref() {
        Some("-") | None => read_stdin()?,
        Some(text) => text.to_string(),
    };
    if text.trim().is_empty() {
        bail!("Please enter some text.");
    }

    let code = generation_client(config).generate(&text, kind)?;
    println!("{}", code);
    Ok(())
}

fn run_render(config: &Config, input: &Path, output: &Path, theme: Theme) -> Result<()> {
    let source = if input.to_str() == Some("-") {
        read_stdin()?
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read input file {}", input.display()))?
    };

    let format = output
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("Output file has no extension"))?
        .parse::<ExportFormat>()
        .map_err(|e| anyhow!(e))?;

    let mut adapter = RendererAdapter::new(MermaidCli::new(&config.renderer.mmdc));
    let image = match adapter.render(&source, theme) {
        RenderOutcome::Image(image) => image,
        RenderOutcome::Cleared => bail!("Input contains no diagram"),
        RenderOutcome::Failed(message) => bail!("Render error: {}", message),
    };

    let bytes = encode(&image, theme, format)?;
    std::fs::write(output, bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    eprintln!("{} saved to: {}", format.to_string().to_uppercase(), output.display());
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}
