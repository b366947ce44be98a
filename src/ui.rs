use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use terminal_size::{terminal_size, Height, Width};

pub fn print_header(model: &str, providers: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = width.0 as usize;

    let line = "─".repeat(width);
    println!("{}", line.black().bold());

    let name = "Gravity".magenta().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);

    let info = format!("  {}  •  {}", model, providers).cyan();
    println!("{}", info);

    if let Ok(path) = std::env::current_dir() {
        let path_str = path.to_string_lossy().black().bold();
        println!("  {}", path_str);
    }

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

pub fn print_tool_call(name: &str, arguments: &Map<String, Value>) {
    let args = Value::Object(arguments.clone()).to_string();
    println!("  {} {} {}", "⚙".blue().bold(), name.blue().bold(), args.black().bold());
}

pub fn print_tool_result(name: &str, result: &str) {
    let preview = crate::adapters::truncate(result, 200);
    println!("  {} {} {}", "↳".green(), name.green(), preview.replace('\n', " ").dimmed());
}

/// Spinner shown while waiting for the first model output.
pub fn spinner(msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("  {spinner:.magenta} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "]),
    );
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
