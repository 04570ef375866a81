use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use testpilot_core::StepRegistry;

pub fn handle_steps_command(format: &str) -> Result<()> {
    let registry = StepRegistry::pipeline();
    let steps: Vec<_> = registry.iter().collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    println!("{}", "Pipeline Stages".cyan().bold());
    println!("{}", "═".repeat(80).dimmed());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(comfy_table::Color::Cyan),
            Cell::new("Id").fg(comfy_table::Color::Cyan),
            Cell::new("Stage").fg(comfy_table::Color::Cyan),
            Cell::new("Description").fg(comfy_table::Color::Cyan),
        ]);

    for step in &steps {
        table.add_row(vec![
            Cell::new(step.ordinal),
            Cell::new(step.id),
            Cell::new(step.label),
            Cell::new(step.subtitle),
        ]);
    }

    println!("{}", table);
    println!();
    println!("  Total: {} stages", registry.len());

    Ok(())
}
