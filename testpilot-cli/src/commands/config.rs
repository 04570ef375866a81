use anyhow::Result;
use colored::Colorize;
use testpilot_core::{get_config_dir, TestPilotConfig};

pub fn handle_config_command(config: &TestPilotConfig, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{}", "Effective Configuration".cyan().bold());
    println!("{}", "═".repeat(50).dimmed());

    println!();
    println!("  {}", "Server".yellow().bold());
    println!("    {:<22} {}", "base_url:", config.server.base_url);
    println!("    {:<22} {}", "start_path:", config.server.start_path);
    println!("    {:<22} {}", "stream_path:", config.server.stream_path);
    println!(
        "    {:<22} {}s",
        "connect_timeout_secs:", config.server.connect_timeout_secs
    );
    println!(
        "    {:<22} {}s",
        "request_timeout_secs:", config.server.request_timeout_secs
    );

    println!();
    println!("  {}", "Stream".yellow().bold());
    println!("    {:<22} {:?}", "event_prefix:", config.stream.event_prefix);

    println!();
    println!("  {}", "Logging".yellow().bold());
    println!("    {:<22} {}", "level:", config.logging.level);
    println!("    {:<22} {}", "json_format:", config.logging.json_format);

    println!();
    println!("  {}", "Display".yellow().bold());
    println!("    {:<22} {}", "color:", config.display.color);
    println!("    {:<22} {}ms", "refresh_rate_ms:", config.display.refresh_rate_ms);

    println!();
    match get_config_dir() {
        Some(dir) => println!(
            "  {} {}",
            "Config directory:".dimmed(),
            dir.join("config.toml").display()
        ),
        None => println!("  {}", "No platform config directory".dimmed()),
    }

    Ok(())
}
