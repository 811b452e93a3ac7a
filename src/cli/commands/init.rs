//! # Pipeline Initialization Module / 流水线初始化模块
//!
//! This module provides functionality for initializing a new pipeline
//! configuration through an interactive command-line wizard. It helps users
//! create a `Stagehand.toml` file with common stage templates and
//! configurations.
//!
//! 此模块通过交互式命令行向导提供初始化新流水线配置的功能。
//! 它帮助用户创建带有常见阶段模板和配置的 `Stagehand.toml` 文件。
//!
//! ## Features / 功能特性
//!
//! - **Interactive Wizard**: Step-by-step guidance for configuration setup
//! - **Template Selection**: Pre-defined section templates for common scenarios
//! - **Overwrite Protection**: Confirmation prompts before overwriting existing configurations
//!
//! - **交互式向导**: 配置设置的逐步指导
//! - **模板选择**: 常见场景的预定义部分模板
//! - **覆盖保护**: 覆盖现有配置前的确认提示

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use std::fs;
use std::path::Path;

use crate::core::config::{DocCheck, FixtureSpec, Pipeline, PluginConfig, Settings, StageSpec};
use crate::core::models::TestGroup;
use crate::infra::t;

/// Runs the interactive wizard to generate a `Stagehand.toml` file.
///
/// This function provides a step-by-step guided process for creating a new
/// pipeline configuration file with user-selected templates for the pipeline
/// sections.
///
/// 运行交互式向导以生成 `Stagehand.toml` 文件。
///
/// 此函数提供逐步指导过程，用于创建带有用户选择的流水线部分模板的新配置文件。
pub fn run_init_wizard(language: &str, non_interactive: bool) -> Result<()> {
    let config_path = Path::new("Stagehand.toml");
    let theme = ColorfulTheme::default();

    if !non_interactive {
        println!("\n{}", t!("init.wizard_welcome", locale = language).cyan().bold());
        println!("{}", t!("init.wizard_description", locale = language));
    }

    if config_path.exists() && !non_interactive {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!(
                "init.overwrite_prompt",
                locale = language,
                path = config_path.display()
            ))
            .default(false)
            .interact()
            .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = language));
            return Ok(());
        }
    }

    let default_pipeline = generate_default_pipeline();

    if non_interactive {
        write_config(config_path, &default_pipeline, language)?;
        return Ok(());
    }

    // Interactive part starts here
    let runtimes_input: String = Input::with_theme(&theme)
        .with_prompt(t!("init.runtimes_prompt", locale = language))
        .default("system".to_string())
        .interact_text()?;
    let runtimes: Vec<String> = runtimes_input
        .split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let options = vec![
        ("parallel_stage", t!("init.template_parallel", locale = language)),
        ("serial_stage", t!("init.template_serial", locale = language)),
        ("server_fixture", t!("init.template_fixture", locale = language)),
        ("plugin_check", t!("init.template_plugins", locale = language)),
        ("doc_check", t!("init.template_docs", locale = language)),
    ];

    let selections = MultiSelect::with_theme(&theme)
        .with_prompt(t!("init.section_selection_prompt", locale = language))
        .items(&options.iter().map(|o| o.1.clone()).collect::<Vec<_>>())
        .interact()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;

    if selections.is_empty() {
        println!("{}", t!("init.no_sections_selected", locale = language).yellow());
    }

    let mut stages = Vec::new();
    let mut fixtures = Vec::new();
    let mut plugins = None;
    let mut docs = Vec::new();

    for i in selections {
        let selection_key = options[i].0;
        match selection_key {
            "parallel_stage" => {
                let command: String = Input::with_theme(&theme)
                    .with_prompt(t!("init.parallel_command_prompt", locale = language))
                    .default("make test".to_string())
                    .interact_text()?;
                stages.push(StageSpec {
                    name: "unit-tests".to_string(),
                    command,
                    group: TestGroup::Parallel,
                    ..StageSpec::default()
                });
            }
            "serial_stage" => {
                let command: String = Input::with_theme(&theme)
                    .with_prompt(t!("init.serial_command_prompt", locale = language))
                    .default("make integration".to_string())
                    .interact_text()?;
                stages.push(StageSpec {
                    name: "integration-tests".to_string(),
                    command,
                    group: TestGroup::Serial,
                    ..StageSpec::default()
                });
            }
            "server_fixture" => {
                fixtures.push(FixtureSpec {
                    name: "api-server".to_string(),
                    build: None,
                    serve: Some("python3 -m http.server {port}".to_string()),
                    artifact: None,
                    port: Some(8080),
                    ready_timeout_secs: 30,
                    working_dir: None,
                    env: Default::default(),
                });
            }
            "plugin_check" => {
                plugins = Some(PluginConfig {
                    plugins: vec!["example-plugin".to_string()],
                    install: None,
                    discovery_env: "APP_PLUGINS".to_string(),
                    probe: "app plugins list --json".to_string(),
                    working_dir: None,
                });
            }
            "doc_check" => {
                docs.push(DocCheck {
                    name: "cli-reference".to_string(),
                    command: "app docs generate".to_string(),
                    path: "docs/cli.md".into(),
                    working_dir: None,
                });
            }
            _ => continue,
        }
    }

    let final_pipeline = if stages.is_empty() && fixtures.is_empty() && plugins.is_none() && docs.is_empty() {
        default_pipeline
    } else {
        Pipeline {
            language: language.to_string(),
            runtimes: if runtimes.is_empty() {
                vec!["system".to_string()]
            } else {
                runtimes
            },
            settings: Settings::default(),
            fixtures,
            stages,
            plugins,
            docs,
        }
    };

    write_config(config_path, &final_pipeline, language)
}

fn generate_default_pipeline() -> Pipeline {
    Pipeline {
        language: "en".to_string(),
        runtimes: vec!["system".to_string()],
        settings: Settings::default(),
        fixtures: vec![],
        stages: vec![
            StageSpec {
                name: "unit-tests".to_string(),
                command: "make test".to_string(),
                group: TestGroup::Parallel,
                ..StageSpec::default()
            },
            StageSpec {
                name: "integration-tests".to_string(),
                command: "make integration".to_string(),
                group: TestGroup::Serial,
                ..StageSpec::default()
            },
        ],
        plugins: None,
        docs: vec![],
    }
}

fn write_config(path: &Path, pipeline: &Pipeline, language: &str) -> Result<()> {
    let toml_string = toml::to_string_pretty(pipeline)
        .context(t!("init.serialize_failed", locale = language).to_string())?;

    fs::write(path, toml_string)
        .with_context(|| t!("init.write_failed", locale = language, path = path.display()))?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init.success_created", locale = language, path = path.display()).bold()
    );
    println!("{}", t!("init.usage_hint", locale = language));

    Ok(())
}
