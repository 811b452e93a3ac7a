//! # CLI Commands Module / CLI 命令模块
//!
//! This module groups the subcommand implementations of the Stagehand CLI.
//!
//! 此模块汇集 Stagehand CLI 的子命令实现。

pub mod init;
pub mod run;
