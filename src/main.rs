use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sophia::ai::StreamMode;
use sophia::cli::commands::assist::Operation;
use sophia::cli::commands::{assist, config, embed, models, solve, stream};
use sophia::cli::ui::Output;
use sophia::cli::{CommandContext, read_history, read_input, read_optional};
use sophia::types::EmbeddingTask;

#[derive(Parser)]
#[command(name = "sophia")]
#[command(version, about = "AI code assistant for a code-snippet manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Model preference, e.g. gemini-2.5-pro or minimax/minimax-m2:free
    #[arg(long, short, global = true, env = "SOPHIA_MODEL")]
    model: Option<String>,

    /// Print structured JSON output
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

/// Text from an argument, `--file`, or stdin
#[derive(Args)]
struct InputArgs {
    /// Input text (read from --file or stdin when omitted)
    text: Option<String>,

    #[arg(long, short)]
    file: Option<PathBuf>,
}

impl InputArgs {
    fn read(self) -> sophia::Result<String> {
        read_input(self.text, self.file.as_deref())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedTaskArg {
    Document,
    Query,
}

impl From<EmbedTaskArg> for EmbeddingTask {
    fn from(arg: EmbedTaskArg) -> Self {
        match arg {
            EmbedTaskArg::Document => EmbeddingTask::RetrievalDocument,
            EmbedTaskArg::Query => EmbeddingTask::RetrievalQuery,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code from a natural-language prompt
    Generate {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Explain a code snippet
    Explain {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Reformat a code snippet
    Format {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, short)]
        language: Option<String>,
    },

    /// Suggest up to five tags for a code snippet
    Tags {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Fix code given the error or output it produced
    Refine {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, short, help = "Error message or program output")]
        error: String,
        #[arg(long, short)]
        language: Option<String>,
    },

    /// Classify a solution by algorithm and data structure
    Classify {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, short, help = "Problem description")]
        description: String,
    },

    /// Embed text for semantic search
    Embed {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value = "document")]
        task: EmbedTaskArg,
        #[arg(long, help = "Second text; prints the cosine similarity of the two")]
        compare: Option<String>,
    },

    /// Ask the coding assistant
    Chat {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, help = "System preamble")]
        preamble: Option<String>,
        #[arg(long, help = "JSON file with previous turns")]
        history: Option<PathBuf>,
    },

    /// LeetCode-style solution generation and explanation
    Solution {
        #[command(subcommand)]
        action: SolutionAction,
    },

    /// Run the four-stage architect/coder/tester/refiner solver
    Solve {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, help = "Additional test cases for the testing stage")]
        test_cases: Option<String>,
        #[arg(long, help = "File with additional test cases")]
        test_cases_file: Option<PathBuf>,
        #[arg(long, help = "Complexity hints for the refining stage")]
        complexity: Option<String>,
    },

    /// Stream generated code, then its explanation
    Stream {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, help = "Stop after the code")]
        code_only: bool,
    },

    /// Show routing state and model tiers
    Models,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SolutionAction {
    /// Generate a solution from a problem description
    Generate {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, short)]
        title: String,
        #[arg(long, short, default_value = "python")]
        language: String,
    },
    /// Explain an existing solution
    Explain {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, short)]
        title: String,
        #[arg(long, short, default_value = "python")]
        language: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show,
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mSophia encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let output = Output::new(cli.json);

    // Commands that need no providers
    match cli.command {
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => config::show(cli.json)?,
                ConfigAction::Path => config::path()?,
                ConfigAction::Init { global, force } => config::init(global, force, &output)?,
            }
            return Ok(());
        }
        command => {
            let ctx = CommandContext::load()?;
            let preference = cli.model.as_deref();
            let rt = Runtime::new()?;
            rt.block_on(run_command(command, &ctx, preference, &output))?;
        }
    }

    Ok(())
}

async fn run_command(
    command: Commands,
    ctx: &CommandContext,
    preference: Option<&str>,
    output: &Output,
) -> sophia::Result<()> {
    let router = &ctx.router;

    let operation = match command {
        Commands::Generate { input } => Operation::Generate {
            prompt: input.read()?,
        },
        Commands::Explain { input } => Operation::Explain { code: input.read()? },
        Commands::Format { input, language } => Operation::Format {
            code: input.read()?,
            language,
        },
        Commands::Tags { input } => Operation::Tags { code: input.read()? },
        Commands::Refine {
            input,
            error,
            language,
        } => Operation::Refine {
            code: input.read()?,
            error_output: error,
            language,
        },
        Commands::Classify { input, description } => Operation::Classify {
            code: input.read()?,
            description,
        },
        Commands::Chat {
            input,
            preamble,
            history,
        } => Operation::Chat {
            preamble,
            history: read_history(history.as_deref())?,
            message: input.read()?,
        },
        Commands::Solution { action } => match action {
            SolutionAction::Generate {
                input,
                title,
                language,
            } => Operation::GenerateSolution {
                title,
                description: input.read()?,
                language,
            },
            SolutionAction::Explain {
                input,
                title,
                language,
            } => Operation::ExplainSolution {
                code: input.read()?,
                title,
                language,
            },
        },
        Commands::Embed {
            input,
            task,
            compare,
        } => {
            let text = input.read()?;
            return embed::run(
                router,
                preference,
                &text,
                task.into(),
                compare.as_deref(),
                output,
            )
            .await;
        }
        Commands::Solve {
            input,
            test_cases,
            test_cases_file,
            complexity,
        } => {
            let problem = input.read()?;
            let test_cases = read_optional(test_cases, test_cases_file)?;
            return solve::run(
                router,
                preference,
                &problem,
                test_cases.as_deref(),
                complexity.as_deref(),
                output,
            )
            .await;
        }
        Commands::Stream { input, code_only } => {
            let prompt = input.read()?;
            let mode = if code_only {
                StreamMode::Code
            } else {
                StreamMode::Chained
            };
            return stream::run(router, preference, &prompt, mode, output).await;
        }
        Commands::Models => return models::run(router, output),
        Commands::Config { .. } => return Ok(()),
    };

    assist::run(router, preference, operation, output).await
}
