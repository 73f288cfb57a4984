//! Terminal styling helpers

use console::{style, Emoji};
use std::path::Path;

use crate::pipeline::ExperimentConfig;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static TARGET: Emoji<'_, '_> = Emoji("🎯 ", "");
pub static CALENDAR: Emoji<'_, '_> = Emoji("📅 ", "");
pub static TREE: Emoji<'_, '_> = Emoji("🌲 ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    let banner = r#"
    ┌─┐┬─┐┬┌─┐┌─┐┌┬┐┬┌─┐┬─┐
    ├─┘├┬┘││  ├┤  │ │├┤ ├┬┘
    ┴  ┴└─┴└─┘└─┘ ┴ ┴└─┘┴└─
    "#;

    println!();
    println!("{}", style(banner).cyan().bold());
    println!(
        "    {}",
        style("Two-stage sale price models, validated fold by fold").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print the experiment configuration card
pub fn print_config(input: &Path, config: &ExperimentConfig) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    println!("    ┌{}┐", line);
    println!(
        "    │ {}{}│",
        style("⚙️  Configuration").cyan().bold(),
        " ".repeat(box_width - 20)
    );
    println!("    ├{}┤", line);
    println!(
        "    │  {} Input:  {:<39}│",
        FOLDER,
        truncate_path(input, 38)
    );
    println!(
        "    │  {} Target: {:<39}│",
        TARGET,
        truncate_string(&config.target, 38)
    );
    println!(
        "    │  {} Period: {:<39}│",
        CALENDAR,
        config.period.to_string()
    );
    println!("    ├{}┤", line);
    println!(
        "    │  {} Folds / seed:   {:<31}│",
        CHART,
        style(format!("{} / {}", config.folds, config.seed)).yellow()
    );
    println!(
        "    │  {} Stage 2 trees:  {:<31}│",
        TREE,
        style(format!(
            "{} @ lr {} depth {}",
            config.stage2.n_estimators, config.stage2.learning_rate, config.stage2.max_depth
        ))
        .yellow()
    );
    println!(
        "    │  {} Price buckets:  {:<31}│",
        CHART,
        style(config.bucket_count).yellow()
    );
    println!("    └{}┘", line);
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print a warning message to stderr
pub fn print_warning(message: &str) {
    eprintln!("    {} {}", WARN, style(message).yellow());
}

/// Print each warning, if any
pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        print_warning(warning);
    }
}

/// Print elapsed time for a step
pub fn print_step_time(elapsed: std::time::Duration) {
    println!(
        "      {}",
        style(format!("⏱  {:.2}s", elapsed.as_secs_f64())).dim()
    );
}

/// Print the final completion message
pub fn print_completion(message: &str) {
    println!();
    println!("    {} {}", ROCKET, style(message).green().bold());
    println!();
}

/// Print a styled count message
pub fn print_count(description: &str, count: usize, detail: Option<&str>) {
    if let Some(info) = detail {
        println!(
            "      Found {} {} {}",
            style(count).yellow().bold(),
            description,
            style(info).dim()
        );
    } else {
        println!(
            "      Found {} {}",
            style(count).yellow().bold(),
            description
        );
    }
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    let path_str = path.display().to_string();
    truncate_string(&path_str, max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
