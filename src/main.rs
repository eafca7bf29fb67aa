//! hugetest-matrix entry point.
//!
//! ## CLI Subcommands
//!
//! - `hugetest-matrix` or `hugetest-matrix run` - Run the test matrix (default)
//! - `hugetest-matrix config show|defaults` - Print configuration
//! - `hugetest-matrix help [COMMAND]` - Usage
//! - `hugetest-matrix version` - Version

use std::process::ExitCode;
use std::sync::Arc;

use hugetest_matrix::cli::{command_help, config_cmd, parse_args, usage, Command, RunOptions};
use hugetest_matrix::config;
use hugetest_matrix::host::HostIdentity;
use hugetest_matrix::invoker::ProcessRunner;
use hugetest_matrix::matrix::render_summary;
use hugetest_matrix::shutdown::{InterruptCoordinator, INTERRUPTED_EXIT_CODE};
use hugetest_matrix::telemetry::{init_logging, LogConfig};
use hugetest_matrix::{run_harness, HarnessConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'hugetest-matrix help' for usage.");
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Run(opts) => run(opts).await,
        Command::ConfigShow { config_file } => {
            ExitCode::from(config_cmd::run_show(config_file.as_deref()) as u8)
        }
        Command::ConfigDefaults => {
            config_cmd::run_defaults();
            ExitCode::SUCCESS
        }
        Command::Help(None) => {
            eprint!("{}", usage());
            ExitCode::SUCCESS
        }
        Command::Help(Some(topic)) => {
            match command_help(&topic) {
                Some(text) => eprint!("{}", text),
                None => eprintln!(
                    "No detailed help available for '{}'. Use 'hugetest-matrix help' for general usage.",
                    topic
                ),
            }
            ExitCode::SUCCESS
        }
        Command::Version => {
            println!("hugetest-matrix {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
    }
}

async fn run(opts: RunOptions) -> ExitCode {
    let env = match config::load_layered(opts.config_file.as_deref()) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log = LogConfig {
        format: env.log_format,
        level: env
            .log_filter
            .clone()
            .unwrap_or_else(|| opts.log_level().to_string()),
        output_path: None,
    };
    if let Err(e) = init_logging(&log) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let coordinator = InterruptCoordinator::new();
    let listener = coordinator.listen_for_ctrl_c();
    let runner = Arc::new(ProcessRunner::new(coordinator.token()));

    let harness = HarnessConfig::from_parts(&env, &opts, HostIdentity::detect());
    let report = run_harness(&harness, runner, coordinator.token()).await;
    listener.abort();

    if opts.json {
        match serde_json::to_string_pretty(&report.matrix.report()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: cannot serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", render_summary(&report.matrix));
    }

    if report.is_interrupted() {
        ExitCode::from(INTERRUPTED_EXIT_CODE as u8)
    } else {
        ExitCode::SUCCESS
    }
}
