use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// wiregraph - 服务图解析与契约检查
#[derive(Parser, Debug)]
#[command(name = "wiregraph", version)]
#[command(about = "服务图解析器 - 校验作用域装配、导出作用域契约、检查契约兼容性")]
pub struct Args {
    /// 子命令
    #[command(subcommand)]
    pub command: Command,

    /// 配置文件路径（默认 ~/.config/wiregraph/config.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 解析并校验装配清单，输出解析报告
    Check {
        /// 装配清单（TOML）
        manifest: PathBuf,
        /// 输出格式
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// 输出作用域契约
    Contract {
        /// 装配清单（TOML）
        manifest: PathBuf,
        /// 作用域路径，例如 app/web（默认根作用域）
        #[arg(long)]
        scope: Option<String>,
        /// 输出格式
        #[arg(long, value_enum, default_value_t = ContractFormat::Text)]
        format: ContractFormat,
    },
    /// 检查新契约是否向后兼容旧契约（不兼容时退出码为 1）
    Compat {
        /// 旧契约文件（.toml 或 .json）
        old: PathBuf,
        /// 新契约文件（.toml 或 .json）
        new: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractFormat {
    Text,
    Json,
    Toml,
}
