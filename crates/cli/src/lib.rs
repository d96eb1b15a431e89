//! The capgen command-line interface.

pub mod generate;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "capgen",
    version,
    about = "Capture/replay code generators for graphics APIs"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full generation pipeline
    Generate(generate::GenerateArgs),
}

/// Parse arguments and dispatch; returns the process exit code.
pub fn run(args: Vec<String>) -> i32 {
    init_tracing();
    match Cli::try_parse_from(args) {
        Ok(cli) => match cli.command {
            Some(Commands::Generate(args)) => generate::run(args),
            None => {
                let mut cmd = Cli::command();
                let _ = cmd.print_help();
                println!();
                0
            }
        },
        Err(e) => {
            let code = e.exit_code();
            let _ = e.print();
            code
        }
    }
}

/// `CAPGEN_LOG` controls the log level: `trace`…`error`, or a full tracing
/// filter spec like `capgen_core=debug`.
fn init_tracing() {
    let filter = match std::env::var("CAPGEN_LOG") {
        Ok(level) if is_plain_level(&level) => format!("capgen={level},capgen_core={level}"),
        Ok(spec) => spec,
        Err(_) => "capgen=warn,capgen_core=warn".to_string(),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(EnvFilter::new(filter));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn is_plain_level(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "capgen",
            "generate",
            "--api",
            "vulkan",
            "--api",
            "opencl",
            "--emitter",
            "recorder",
            "--config",
            "capgen.toml",
            "--output",
            "out",
            "--jobs",
            "4",
            "--check",
            "--no-format",
        ])
        .unwrap();
        let Some(Commands::Generate(args)) = cli.command else {
            unreachable!("expected generate subcommand");
        };
        assert_eq!(args.apis, ["vulkan", "opencl"]);
        assert_eq!(args.emitters, ["recorder"]);
        assert_eq!(args.jobs, 4);
        assert!(args.check);
        assert!(args.no_format);
    }

    #[test]
    fn later_format_flag_wins() {
        let cli =
            Cli::try_parse_from(["capgen", "generate", "--format", "--no-format"]).unwrap();
        let Some(Commands::Generate(args)) = cli.command else {
            unreachable!("expected generate subcommand");
        };
        assert!(args.no_format);
        assert!(!args.format);
    }
}
