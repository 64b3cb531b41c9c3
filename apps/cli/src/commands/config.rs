//! 配置管理命令
//!
//! 校验与显示 TOML 栈配置

use anyhow::{Context, Result};
use clap::Subcommand;
use ecucom_stack::StackConfig;
use std::path::PathBuf;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 校验配置文件
    Check {
        /// 配置文件路径
        path: PathBuf,
    },

    /// 输出规范化后的配置
    Show {
        /// 配置文件路径
        path: PathBuf,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Check { path } => Self::check_(path),
            ConfigCommand::Show { path } => Self::show_(path),
        }
    }

    fn check_(path: PathBuf) -> Result<()> {
        let config = StackConfig::load(&path)
            .with_context(|| format!("配置校验失败: {}", path.display()))?;

        let name = if config.name.is_empty() { "(unnamed)" } else { config.name.as_str() };
        println!("✅ {}: {}", path.display(), name);
        println!("  CanIf TX 路由: {}", config.canif.tx_routes.len());
        println!("  CanIf RX 路由: {}", config.canif.rx_routes.len());
        println!("  PduR 路由: {}", config.pdur.routes.len());
        println!("  信号: {}", config.com.signals.len());
        println!("  TX PDU: {}", config.com.tx_pdus.len());
        println!("  RX PDU: {}", config.com.rx_pdus.len());
        println!("  E2E 报文: {}", config.e2e.len());
        Ok(())
    }

    fn show_(path: PathBuf) -> Result<()> {
        let config = StackConfig::load(&path)?;
        print!("{}", config.to_toml_string()?);
        Ok(())
    }
}
