use std::collections::HashMap;
use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use testpilot_core::{
    RunController, RunPhase, RunSnapshot, StepRegistry, StepStatus, TestPilotConfig,
    TestPilotResult, TestResult, ToolSafety,
};
use tracing::debug;

/// Exit code used when the run was interrupted with Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[derive(Args)]
pub struct RunArgs {
    #[arg(required = true, help = "Repository URLs to run through the pipeline")]
    pub identifiers: Vec<String>,

    #[arg(short, long, help = "Pipeline service base URL (overrides configuration)")]
    pub server: Option<String>,

    #[arg(long, help = "Print the final run snapshot as JSON instead of live progress")]
    pub json: bool,
}

pub async fn handle_run_command(args: RunArgs, config: &TestPilotConfig) -> Result<ExitCode> {
    let controller = RunController::from_config(config)?;
    let mut printer = ProgressPrinter::new(*controller.registry(), !args.json);

    if !args.json {
        println!("{}", "Starting pipeline run".cyan().bold());
        println!("  {} {}", "Server:".dimmed(), config.server.base_url);
        println!("{}", "═".repeat(60).dimmed());
    }

    let snapshot = follow_run(
        &controller,
        &args.identifiers,
        &mut printer,
        Duration::from_millis(config.display.refresh_rate_ms),
        tokio::signal::ctrl_c(),
    )
    .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        printer.summary(&snapshot);
    }

    Ok(match snapshot.phase {
        RunPhase::Completed => ExitCode::SUCCESS,
        RunPhase::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::FAILURE,
    })
}

/// Starts a run and polls it every `refresh` until it reaches a terminal phase.
///
/// `interrupt` is polled for the whole call, including while the submission
/// is waiting for acknowledgement, and cancels the run once it resolves.
async fn follow_run<F: Future>(
    controller: &RunController,
    identifiers: &[String],
    printer: &mut ProgressPrinter,
    refresh: Duration,
    interrupt: F,
) -> TestPilotResult<RunSnapshot> {
    tokio::pin!(interrupt);

    let handle = tokio::select! {
        biased;
        _ = &mut interrupt => {
            debug!("Interrupt received before acknowledgement");
            controller.cancel();
            return Ok(controller.snapshot());
        }
        started = controller.start(identifiers) => started?,
    };
    printer.announce(handle.as_str());

    let mut interrupted = false;
    let mut ticker = tokio::time::interval(refresh);
    loop {
        tokio::select! {
            _ = &mut interrupt, if !interrupted => {
                debug!("Interrupt received");
                interrupted = true;
                controller.cancel();
            }
            _ = ticker.tick() => {}
        }

        let snapshot = controller.snapshot();
        printer.render(&snapshot);
        if snapshot.phase.is_terminal() {
            return Ok(snapshot);
        }
    }
}

/// Prints status changes and newly reported items between snapshots.
struct ProgressPrinter {
    registry: StepRegistry,
    enabled: bool,
    seen: HashMap<usize, (StepStatus, Vec<String>)>,
}

impl ProgressPrinter {
    fn new(registry: StepRegistry, enabled: bool) -> Self {
        Self {
            registry,
            enabled,
            seen: HashMap::new(),
        }
    }

    fn announce(&self, run_id: &str) {
        if self.enabled {
            println!("  {} {}", "Run:".dimmed(), run_id.bold());
            println!();
        }
    }

    fn render(&mut self, snapshot: &RunSnapshot) {
        if !self.enabled {
            return;
        }

        for (ordinal, data) in &snapshot.step_data {
            let Some(meta) = self.registry.lookup(*ordinal) else {
                continue;
            };
            let previous = self.seen.get(ordinal);

            if previous.map(|(status, _)| *status) != Some(data.status) {
                println!(
                    "{} {:>2}  {}",
                    status_marker(data.status),
                    ordinal,
                    meta.label.bold()
                );
            }

            let already = previous.map(|(_, items)| items.as_slice()).unwrap_or(&[]);
            let fresh = if data.items.starts_with(already) {
                &data.items[already.len()..]
            } else {
                &data.items[..]
            };
            for item in fresh {
                println!("      {} {}", "·".dimmed(), item);
            }

            self.seen
                .insert(*ordinal, (data.status, data.items.clone()));
        }
    }

    fn summary(&self, snapshot: &RunSnapshot) {
        println!();
        println!("{}", "═".repeat(60).dimmed());

        let phase = match snapshot.phase {
            RunPhase::Completed => "completed".green().bold(),
            RunPhase::Cancelled => "cancelled".yellow().bold(),
            _ => snapshot.phase.to_string().red().bold(),
        };
        println!("  {:<12} {}", "Run:".bold(), phase);
        println!(
            "  {:<12} {}/{}",
            "Stages:".bold(),
            snapshot.completed.len(),
            self.registry.len()
        );
        if let Some(secs) = snapshot.duration_secs() {
            println!("  {:<12} {}s", "Duration:".bold(), secs);
        }
        if let Some(error) = &snapshot.error {
            println!("  {:<12} {}", "Error:".bold(), error.red());
        }

        self.print_tools(snapshot);
        self.print_tests(snapshot);
    }

    fn print_tools(&self, snapshot: &RunSnapshot) {
        let Some(rows) = self
            .registry
            .index_of("policy")
            .and_then(|ordinal| snapshot.step(ordinal))
            .and_then(|data| data.tool_rows.as_ref())
        else {
            return;
        };
        if rows.is_empty() {
            return;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Tool").fg(comfy_table::Color::Cyan),
                Cell::new("Method").fg(comfy_table::Color::Cyan),
                Cell::new("Path").fg(comfy_table::Color::Cyan),
                Cell::new("Safety").fg(comfy_table::Color::Cyan),
                Cell::new("Execution").fg(comfy_table::Color::Cyan),
                Cell::new("Rate/min").fg(comfy_table::Color::Cyan),
            ]);

        for row in rows {
            let safety_color = match row.safety {
                ToolSafety::Destructive => comfy_table::Color::Red,
                ToolSafety::Write => comfy_table::Color::Yellow,
                ToolSafety::Read | ToolSafety::Enabled => comfy_table::Color::Green,
            };
            table.add_row(vec![
                Cell::new(&row.name),
                Cell::new(&row.method),
                Cell::new(&row.path),
                Cell::new(row.safety).fg(safety_color),
                Cell::new(row.execution),
                Cell::new(row.rate_limit),
            ]);
        }

        println!();
        println!("{}", table);
    }

    fn print_tests(&self, snapshot: &RunSnapshot) {
        let Some(data) = self
            .registry
            .index_of("user-test")
            .and_then(|ordinal| snapshot.step(ordinal))
        else {
            return;
        };

        if let (Some(passed), Some(total)) = (data.passed, data.total) {
            println!();
            println!("  {:<12} {}/{} passed", "Tests:".bold(), passed, total);
        }

        for result in data.test_results.iter().flatten() {
            for line in describe_test(result) {
                println!("    {}", line);
            }
        }
    }
}

/// Lines shown for one end-user test: outcome, summary, then every step.
fn describe_test(result: &TestResult) -> Vec<String> {
    let marker = if result.passed {
        "✓".green()
    } else {
        "✗".red()
    };
    let mut title = format!("{} {}", marker, result.test_name.bold());
    if !result.description.is_empty() {
        title.push_str(&format!(" {}", result.description.dimmed()));
    }
    title.push_str(&format!(" {}", format!("({}ms)", result.duration_ms).dimmed()));

    let mut lines = vec![title];
    if !result.summary.is_empty() {
        lines.push(format!("    {}", result.summary));
    }
    for step in &result.steps {
        let marker = if step.success {
            "✓".green()
        } else {
            "✗".red()
        };
        lines.push(format!(
            "    {} {} {}",
            marker,
            step.action,
            format!("({}ms)", step.duration_ms).dimmed()
        ));
        if let Some(error) = &step.error {
            lines.push(format!("        {}", error.red()));
        }
    }
    lines
}

fn status_marker(status: StepStatus) -> ColoredString {
    match status {
        StepStatus::Pending => "○".dimmed(),
        StepStatus::Running => "●".blue(),
        StepStatus::Done => "✓".green(),
        StepStatus::Error => "✗".red(),
    }
}
