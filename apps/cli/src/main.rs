//! # ECU Com CLI
//!
//! CAN 通信栈的命令行工具。
//!
//! ## 用法
//!
//! ```bash
//! # CRC-8/SAE-J1850
//! ecucom-cli crc 313233343536373839
//!
//! # E2E 保护 / 检查（数据包含 2 字节头部）
//! ecucom-cli protect --data-id 5 0000112233445566
//! ecucom-cli check --data-id 5 15b3112233445566
//!
//! # 校验栈配置
//! ecucom-cli config check configs/pedal.toml
//!
//! # 在 vcan0 上运行一个仿真 ECU
//! ecucom-cli run --config configs/pedal.toml --heartbeat 0
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{CheckCommand, ConfigCommand, CrcCommand, ProtectCommand, RunCommand};

/// ECU Com CLI - CAN 通信栈工具
#[derive(Parser, Debug)]
#[command(name = "ecucom-cli")]
#[command(about = "Command-line tool for the ECU CAN communication stack", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 计算 CRC-8/SAE-J1850
    Crc {
        #[command(flatten)]
        args: CrcCommand,
    },

    /// 为 PDU 写入 E2E 头部
    Protect {
        #[command(flatten)]
        args: ProtectCommand,
    },

    /// 检查 PDU 的 E2E 头部
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },

    /// 栈配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 运行一个仿真 ECU
    Run {
        #[command(flatten)]
        args: RunCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ecucom_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crc { args } => args.execute(),
        Commands::Protect { args } => args.execute(),
        Commands::Check { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
        Commands::Run { args } => args.execute().await,
    }
}
