use std::io::{self, Read};

use clap::{Parser as ClapParser, Subcommand};
use tansy_lang::cli::{self, CheckOptions, CheckResult, CliError};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "tansy")]
#[command(about = "Tansy - an embeddable expression language compiled to bytecode")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression
    Check {
        /// The expression to evaluate
        expression: String,

        /// JSON object with the context variables (reads from stdin if not provided)
        #[arg(short, long)]
        context: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Only validate syntax, don't execute
        #[arg(long)]
        syntax_only: bool,
    },

    /// Print the bytecode an expression compiles to
    Disasm {
        /// The expression to compile
        expression: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            expression,
            context,
            pretty,
            syntax_only,
        } => run_check(expression, context, pretty, syntax_only),
        Commands::Disasm { expression } => cli::execute_disasm(&expression).map(|listing| {
            print!("{}", listing);
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_check(
    expression: String,
    context: Option<String>,
    pretty: bool,
    syntax_only: bool,
) -> Result<(), CliError> {
    let context = match context {
        Some(s) => Some(s),
        None if !syntax_only && !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer)
        }
        None => None,
    };

    let options = CheckOptions {
        expression,
        context,
        syntax_only,
    };

    match cli::execute_check(&options)? {
        CheckResult::SyntaxValid => println!("Syntax is valid"),
        CheckResult::Success(output) => {
            let json = if pretty {
                serde_json::to_string_pretty(&output)
            } else {
                serde_json::to_string(&output)
            }?;
            println!("{}", json);
        }
    }
    Ok(())
}
