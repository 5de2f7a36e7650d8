//! deskbot setup wizard.
//!
//! Asks for the Telegram and Zendesk credentials in the terminal and writes
//! a starter `config.toml` to `DESKBOT_ROOT` (default: the current
//! directory).

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    tg_token: &'a str,
    command_prefix: &'a str,
    zd_email: &'a str,
    zd_token: &'a str,
    zd_subdomain: &'a str,
    collect_email: bool,
    check_ownership: bool,
    log_dir: &'a str,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let log_line = if p.log_dir.is_empty() {
        "# directory = \"logs\"".to_owned()
    } else {
        format!("directory = \"{}\"", p.log_dir)
    };

    let tg_token = p.tg_token;
    let command_prefix = p.command_prefix;
    let zd_email = p.zd_email;
    let zd_token = p.zd_token;
    let zd_subdomain = p.zd_subdomain;
    let collect_email = p.collect_email;
    let check_ownership = p.check_ownership;

    format!(
        r#"[telegram]
bot_token = "{tg_token}"
command_prefix = "{command_prefix}"
# home_chat_id = -1001234567890

[zendesk]
email = "{zd_email}"
api_token = "{zd_token}"
subdomain = "{zd_subdomain}"
request_timeout_secs = 30

[flows]
collect_email = {collect_email}
check_ownership = {check_ownership}
reply_timeout_secs = 900

[logging]
{log_line}
file_prefix = "deskbot"
"#
    )
}

/// Interpret a yes/no answer, falling back to `default` on anything else.
fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" => true,
        "n" | "no" | "false" => false,
        _ => default,
    }
}

// ── CLI mode ───────────────────────────────────────────────────────────────────

fn run_cli(project_root: &Path) -> Result<()> {
    println!("=== deskbot setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let tg_token = read_line("Telegram bot token: ")?;
    let command_prefix = or_default(read_line("Command prefix [/]: ")?, "/");
    let zd_email = read_line("Zendesk agent email: ")?;
    let zd_token = read_line("Zendesk API token: ")?;
    let zd_subdomain = read_line("Zendesk subdomain (the part before .zendesk.com): ")?;
    let collect_email = parse_yes_no(&read_line("Ask users for their email? [Y/n]: ")?, true);
    let check_ownership = parse_yes_no(
        &read_line("Only let ticket owners post updates? [Y/n]: ")?,
        true,
    );
    let log_dir = or_default(
        read_line("Log directory, or \"none\" for console only [logs]: ")?,
        "logs",
    );
    let log_dir = if log_dir == "none" { String::new() } else { log_dir };

    let config = format_config(&ConfigParams {
        tg_token: &tg_token,
        command_prefix: &command_prefix,
        zd_email: &zd_email,
        zd_token: &zd_token,
        zd_subdomain: &zd_subdomain,
        collect_email,
        check_ownership,
        log_dir: &log_dir,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the bot with:  cargo run --bin deskbot");
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let project_root =
        PathBuf::from(std::env::var("DESKBOT_ROOT").unwrap_or_else(|_| ".".to_string()));
    run_cli(&project_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
