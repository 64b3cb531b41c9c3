//! 命令定义和实现

pub mod config;
pub mod e2e;
pub mod run;

pub use config::ConfigCommand;
pub use e2e::{CheckCommand, CrcCommand, ProtectCommand};
pub use run::RunCommand;

use anyhow::{Context, Result};

/// 解析十六进制字节串，忽略空白、`:` 与可选的 `0x` 前缀
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).with_context(|| format!("invalid hex data: {:?}", input))
}

/// 解析 `u8`，支持十进制与 `0x` 前缀的十六进制
pub fn parse_u8(input: &str) -> std::result::Result<u8, String> {
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|e| format!("invalid byte value '{}': {}", input, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_formats() {
        assert_eq!(parse_hex("0011ff").unwrap(), vec![0x00, 0x11, 0xFF]);
        assert_eq!(parse_hex("00 11 FF").unwrap(), vec![0x00, 0x11, 0xFF]);
        assert_eq!(parse_hex("0x00:11:ff").unwrap(), vec![0x00, 0x11, 0xFF]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_parse_u8() {
        assert_eq!(parse_u8("255"), Ok(255));
        assert_eq!(parse_u8("0xFF"), Ok(255));
        assert!(parse_u8("256").is_err());
    }
}
