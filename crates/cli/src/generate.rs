//! `capgen generate`: run the full pipeline.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use capgen_common::Severity;
use capgen_core::config::RunConfig;
use capgen_core::pipeline::{Pipeline, PipelineOptions};

const DEFAULT_CONFIG: &str = "capgen.toml";

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// API families to generate (repeatable); defaults to every configured family
    #[arg(long = "api", value_name = "FAMILY")]
    pub apis: Vec<String>,

    /// Emitters to run (repeatable); defaults to all
    #[arg(long = "emitter", value_name = "NAME")]
    pub emitters: Vec<String>,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Output root, overriding the configuration
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Worker threads for the emit and post-process fan-out (0 = auto)
    #[arg(long, short = 'j', value_name = "N", default_value_t = 0)]
    pub jobs: usize,

    /// Fail (exit 6) if outputs would change, without writing anything
    #[arg(long)]
    pub check: bool,

    /// Run the formatter over emitted files (configuration default: on)
    #[arg(long, overrides_with = "no_format")]
    pub format: bool,

    /// Skip the formatter
    #[arg(long = "no-format", overrides_with = "format")]
    pub no_format: bool,
}

pub fn run(args: GenerateArgs) -> i32 {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{} {message}", style("error:").red().bold());
            return 2;
        }
    };

    let format = if args.no_format {
        Some(false)
    } else if args.format {
        Some(true)
    } else {
        None
    };

    let pipeline = Pipeline::new(PipelineOptions {
        config,
        apis: args.apis,
        emitters: args.emitters,
        output: args.output,
        jobs: args.jobs,
        check: args.check,
        format,
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(if args.check {
        "checking generated sources"
    } else {
        "generating sources"
    });
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = pipeline.run();
    spinner.finish_and_clear();

    // Human-readable findings for everything at warn and above.
    for diag in pipeline.sink().records() {
        if diag.severity >= Severity::Warn {
            eprintln!("{diag}");
        }
    }

    match result {
        Ok(summary) => {
            let infos = pipeline.sink().count_at_least(Severity::Info);
            if args.check {
                println!(
                    "{} {} file(s) up to date across {} module(s)",
                    style("ok:").green().bold(),
                    summary.files_unchanged.len(),
                    summary.modules
                );
            } else {
                println!(
                    "{} wrote {} file(s), {} unchanged, {} diagnostic(s)",
                    style("ok:").green().bold(),
                    summary.files_written.len(),
                    summary.files_unchanged.len(),
                    infos
                );
            }
            0
        }
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            for finding in err.findings() {
                eprintln!("  {finding}");
            }
            err.exit_code()
        }
    }
}

/// Load the configuration file. The default path may be absent (flag-only
/// invocations); an explicitly given path must exist.
fn load_config(args: &GenerateArgs) -> Result<RunConfig, String> {
    if args.config.exists() {
        debug!(config = %args.config.display(), "loading configuration");
        return RunConfig::load(&args.config).map_err(|e| e.to_string());
    }
    if args.config == PathBuf::from(DEFAULT_CONFIG) {
        debug!("no configuration file; using defaults");
        return Ok(RunConfig::default());
    }
    Err(format!(
        "configuration file `{}` not found",
        args.config.display()
    ))
}
