// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use mysis_core::domain::swarm_config::SwarmConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./mysis-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(&output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let manifest = SwarmConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. MYSIS_CONFIG_PATH: {}",
            std::env::var("MYSIS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./mysis-config.yaml");
        println!("  4. ~/.mysis/config.yaml");
        println!("  5. /etc/mysis/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", manifest.to_yaml_string()?);
        return Ok(());
    }

    let spec = &manifest.spec;
    println!("{} {}", "Swarm:".bold(), manifest.metadata.name);
    println!("  Max agents: {}", spec.max_agents);
    println!();

    println!("{}", "LLM Providers:".bold());
    for provider in &spec.llm_providers {
        let status = if provider.enabled { "enabled".green() } else { "disabled".dimmed() };
        println!("  {} ({}, {})", provider.name.bold(), provider.provider_type, status);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!(
        "  Default provider: {}",
        spec.llm_selection.default_provider.as_deref().unwrap_or("(none)")
    );
    println!();

    println!("{}", "Turns:".bold());
    println!("  Context window: {}", spec.agent.context_window);
    println!("  Turn timeout: {}s", spec.agent.turn_timeout_seconds);
    println!("  Stop timeout: {}s", spec.agent.stop_timeout_seconds);
    println!();

    println!("{}", "Nudges:".bold());
    if spec.nudge.enabled {
        println!(
            "  Every {}s of silence, idle revival after {}s, {} attempts",
            spec.nudge.interval_seconds, spec.nudge.idle_interval_seconds, spec.nudge.max_attempts
        );
    } else {
        println!("  {}", "disabled".dimmed());
    }
    println!();

    println!("{}", "Agents:".bold());
    for agent in &spec.agents {
        let autostart = if agent.autostart { " (autostart)" } else { "" };
        println!(
            "  {} via {}{}",
            agent.name.bold(),
            agent
                .provider
                .as_deref()
                .or(spec.llm_selection.default_provider.as_deref())
                .unwrap_or("(default)"),
            autostart
        );
    }
    if !spec.accounts.is_empty() {
        println!("  Accounts in pool: {}", spec.accounts.len());
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest = SwarmConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    manifest
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, with_examples: bool) -> Result<()> {
    std::fs::write(output, sample_config(with_examples))
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_samples_are_valid() {
        for with_examples in [false, true] {
            let manifest = SwarmConfigManifest::from_yaml_str(sample_config(with_examples)).unwrap();
            manifest.validate().unwrap();
        }
    }

    #[test]
    fn test_generate_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mysis-config.yaml");

        generate(&path, true).unwrap();

        let manifest = SwarmConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(manifest.spec.agents.len(), 2);
        assert_eq!(manifest.spec.accounts, vec!["pilot_alpha", "pilot_bravo"]);
    }
}
