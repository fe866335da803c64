use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use scorebot_core::config::{Config, ConfigWarning, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration, defaults filled in
    Show,

    /// Check the config for values the scheduler cannot run with
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let findings = config.validate();
    let (errors, warnings): (Vec<&ConfigWarning>, Vec<&ConfigWarning>) = findings
        .iter()
        .partition(|f| f.level == WarnLevel::Error);

    if json {
        print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "warnings": findings,
        }))?;
    } else {
        // Errors first; they are what stops `scorebot run`.
        for f in errors.iter().chain(&warnings) {
            let tag = match f.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            println!("[{tag}] {}", f.message);
        }
        match (errors.len(), warnings.len()) {
            (0, 0) => println!("Config is valid. No warnings."),
            (0, n) => println!("Config is valid with {n} warning(s)."),
            _ => {}
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("config has {} error(s)", errors.len());
    }
    Ok(())
}
