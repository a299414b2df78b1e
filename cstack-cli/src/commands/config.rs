//! `cstack config` command - show or template the configuration.

use anyhow::Result;
use colored::Colorize;
use cstack_core::config::CONFIG_TEMPLATE;
use cstack_core::Config;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

/// Show the resolved configuration, or print a starter template.
pub fn run(config_path: &Path, template: bool) -> Result<()> {
    if template {
        print!("{}", CONFIG_TEMPLATE);
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let registry = config.registry()?;

    println!("{}: {}", "Config".bold(), config_path.display());
    println!("{}: {}", "Engine".bold(), config.engine.join(" "));
    println!();

    if registry.is_empty() {
        println!("{}", "no stacks configured".dimmed());
        return Ok(());
    }

    #[derive(Tabled)]
    struct StackRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "PATH")]
        path: String,
        #[tabled(rename = "IGNORED")]
        ignored: String,
        #[tabled(rename = "EXISTS")]
        exists: String,
    }

    let rows: Vec<StackRow> = registry
        .iter()
        .map(|def| StackRow {
            name: def.name.clone(),
            path: def.path.display().to_string(),
            ignored: if def.ignored { "yes".yellow().to_string() } else { "no".to_string() },
            exists: if def.path.is_file() {
                "yes".green().to_string()
            } else {
                "no".red().to_string()
            },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);

    Ok(())
}
