use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use testpilot_core::{CliErrorDisplay, LoggingConfig, TestPilotError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

use commands::{
    handle_config_command, handle_run_command, handle_steps_command, RunArgs,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "testpilot")]
#[command(version = VERSION)]
#[command(about = "testpilot - follow MCP pipeline runs live from the terminal")]
#[command(long_about = r#"
testpilot submits repositories to the pipeline service, which clones them,
extracts their OpenAPI specs, generates and deploys MCP servers, and finally
tests the deployed tools as an end user would. Progress is streamed back and
shown stage by stage.

Use 'testpilot steps' to list the pipeline stages and 'testpilot run <URL>...'
to start a run.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start a pipeline run and follow its progress")]
    Run(RunArgs),

    #[command(about = "List the pipeline stages in order")]
    Steps {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show the effective configuration")]
    Config {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<TestPilotError>() {
                Some(err) => eprint!("{}: {}", "Error".red().bold(), CliErrorDisplay::new(err)),
                None => eprintln!("{}: {:#}", "Error".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Version { detailed } => {
            cmd_version(detailed);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Steps { format } => {
            handle_steps_command(&format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { format } => {
            let config = config::load(None)?;
            handle_config_command(&config, &format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => {
            let config = config::load(args.server.clone())?;
            if !config.display.color {
                colored::control::set_override(false);
            }
            init_logging(cli.verbose, &config.logging);
            handle_run_command(args, &config).await
        }
    }
}

fn cmd_version(detailed: bool) {
    if detailed {
        println!("{}", "testpilot Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!();
        println!("  {}", "Pipeline Stages:".bold());
        for step in testpilot_core::StepRegistry::pipeline().iter() {
            println!("    {:>2}  {}", step.ordinal, step.label);
        }
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("testpilot {}", VERSION);
    }
}
