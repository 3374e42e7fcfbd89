mod args;
mod commands;

use clap::Parser;
use std::process::ExitCode;
use tracing::Level;
use wiregraph::config::ConfigLoader;
use wiregraph::errors::ConfigError;
use wiregraph::logging::{init_logging, LoggingConfig};
use wiregraph::ResolverConfig;

use args::{Args, Command};

fn load_config(args: &Args) -> Result<ResolverConfig, ConfigError> {
    let loader = ConfigLoader::new();
    match &args.config {
        Some(path) => loader.load_from_path(path),
        None => loader.load_config(),
    }
}

/// 返回 `Ok(false)` 表示检查未通过（非错误）
fn run(args: &Args, config: &ResolverConfig) -> anyhow::Result<bool> {
    match &args.command {
        Command::Check { manifest, format } => {
            commands::handle_check(config, manifest, *format)?;
            Ok(true)
        }
        Command::Contract {
            manifest,
            scope,
            format,
        } => {
            commands::handle_contract(config, manifest, scope.as_deref(), *format)?;
            Ok(true)
        }
        Command::Compat { old, new } => commands::handle_compat(old, new),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ 配置错误: {}", e);
            return ExitCode::from(2);
        }
    };

    let logging = if args.verbose {
        LoggingConfig::development()
            .with_settings(&config.logging)
            .with_level(Level::DEBUG)
    } else {
        LoggingConfig::default().with_settings(&config.logging)
    };
    if let Err(e) = init_logging(logging) {
        eprintln!("⚠️ 日志初始化失败: {}", e);
    }

    match run(&args, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            wiregraph::log_error!(e, "wiregraph");
            eprintln!("❌ {:#}", e);
            ExitCode::from(2)
        }
    }
}
