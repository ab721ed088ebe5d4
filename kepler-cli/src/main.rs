use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "kepler",
    version,
    about = "Turn a STEM problem statement into a validated SVG diagram"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into an exit code.
///
/// Exit codes:
///   0  — success
///   1  — general/unknown error
///   2  — configuration error
///   3  — input error (empty or unreadable problem text)
///   4  — output/persistence error
///   6  — LLM/VLM API error
///   10 — partial success (diagram produced with errors recorded)
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("empty problem text") || msg.contains("cannot read problem file") {
        3
    } else if msg.contains("config") {
        2
    } else if msg.contains("persist") || msg.contains("permission denied") {
        4
    } else if msg.contains("llm") || msg.contains("api_key") || msg.contains("api error") {
        6
    } else if msg.contains("completed with errors") {
        10
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
