//! crc / protect / check 命令
//!
//! 直接在十六进制数据上调用 CRC-8 与 E2E 库，便于和总线抓包对照。

use super::{parse_hex, parse_u8};
use anyhow::{Context, Result, bail};
use clap::Args;
use ecucom_protocol::e2e::{self, E2eCheckStatus, E2eConfig, E2eState};
use ecucom_protocol::{PduId, calc_crc8};
use ecucom_stack::StackConfig;
use std::path::PathBuf;

/// CRC 命令参数
#[derive(Args, Debug)]
pub struct CrcCommand {
    /// 十六进制数据
    pub data: String,

    /// 起始值
    #[arg(long, default_value = "0xFF", value_parser = parse_u8)]
    pub start: u8,
}

impl CrcCommand {
    pub fn execute(&self) -> Result<()> {
        let bytes = parse_hex(&self.data)?;
        println!("0x{:02X}", calc_crc8(&bytes, self.start));
        Ok(())
    }
}

/// E2E 参数来源：命令行或栈配置文件
#[derive(Args, Debug)]
pub struct E2eArgs {
    /// 4-bit Data ID
    #[arg(long, value_parser = parse_u8)]
    pub data_id: Option<u8>,

    /// 允许的最大计数器跳变
    #[arg(long, default_value_t = 1)]
    pub max_delta: u8,

    /// 从栈配置文件读取 E2E 参数（需配合 --pdu）
    #[arg(long, requires = "pdu")]
    pub config: Option<PathBuf>,

    /// 配置文件中的 PDU ID
    #[arg(long)]
    pub pdu: Option<PduId>,

    /// 当前计数器状态（发送方：上一次写入的值；接收方：上一次收到的值）
    #[arg(long, default_value_t = 0)]
    pub counter: u8,
}

impl E2eArgs {
    fn resolve(&self, data_length: usize) -> Result<E2eConfig> {
        if let (Some(path), Some(pdu)) = (&self.config, self.pdu) {
            let stack = StackConfig::load(path)?;
            return stack
                .e2e_for(pdu)
                .copied()
                .with_context(|| format!("PDU {} has no E2E entry in {}", pdu, path.display()));
        }

        let Some(data_id) = self.data_id else {
            bail!("either --data-id or --config/--pdu is required");
        };
        let data_length = u16::try_from(data_length).context("data too long")?;
        Ok(E2eConfig::new(data_id, self.max_delta, data_length)?)
    }

    fn state(&self) -> Result<E2eState> {
        if self.counter > 0x0F {
            bail!("counter must be 0..=15, got {}", self.counter);
        }
        Ok(E2eState {
            counter: self.counter,
        })
    }
}

/// protect 命令参数
#[derive(Args, Debug)]
pub struct ProtectCommand {
    /// 完整 PDU（十六进制，前 2 字节为头部占位）
    pub data: String,

    #[command(flatten)]
    pub e2e: E2eArgs,
}

impl ProtectCommand {
    pub fn execute(&self) -> Result<()> {
        let mut bytes = parse_hex(&self.data)?;
        let config = self.e2e.resolve(bytes.len())?;
        let mut state = self.e2e.state()?;

        e2e::protect(&config, &mut state, &mut bytes)?;
        println!("{}", hex::encode(&bytes));
        println!("counter={}", state.counter);
        Ok(())
    }
}

/// check 命令参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 收到的 PDU（十六进制）
    pub data: String,

    #[command(flatten)]
    pub e2e: E2eArgs,
}

impl CheckCommand {
    pub fn execute(&self) -> Result<()> {
        let bytes = parse_hex(&self.data)?;
        let config = self.e2e.resolve(bytes.len())?;
        let mut state = self.e2e.state()?;

        let status = e2e::check(&config, &mut state, &bytes);
        println!("{:?} counter={}", status, state.counter);

        if status != E2eCheckStatus::Ok {
            bail!("E2E check did not pass: {:?}", status);
        }
        Ok(())
    }
}
