//! 通信栈配置（TOML）
//!
//! 一个 ECU 的全部静态配置放在一个文件里：驱动参数、接口层路由、
//! 路由表、信号表，以及各报文的 E2E 参数。
//!
//! ```toml
//! name = "body"
//! interface = "vcan0"
//!
//! [driver]
//! baudrate = 500000
//!
//! [[canif.tx_routes]]
//! pdu_id = 0
//! can_id = 0x100
//! dlc = 8
//! ```
//!
//! 配置在任何运行时调用之前由 [`StackConfig::validate`] 完整校验。

use crate::StackError;
use crate::canif::CanIfConfig;
use crate::com::{COM_PDU_SIZE, ComConfig};
use crate::pdur::PduRConfig;
use ecucom_can::CanDriverConfig;
use ecucom_protocol::{E2eConfig, PduId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// 单条 E2E 保护报文的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eProtectedPdu {
    /// 受保护的 Com PDU
    pub pdu_id: PduId,
    #[serde(flatten)]
    pub config: E2eConfig,
}

/// 单个 ECU 的通信栈配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// ECU 名称（仅用于日志）
    pub name: String,
    /// SocketCAN 接口名；未设置时使用 `CAN_INTERFACE` 环境变量或 `vcan0`
    pub interface: Option<String>,
    pub driver: CanDriverConfig,
    pub canif: CanIfConfig,
    pub pdur: PduRConfig,
    pub com: ComConfig,
    pub e2e: Vec<E2eProtectedPdu>,
}

impl StackConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, StackError> {
        let config: StackConfig =
            toml::from_str(s).map_err(|e| StackError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StackError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StackError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, StackError> {
        toml::to_string(self).map_err(|e| StackError::InvalidConfig(e.to_string()))
    }

    /// 校验全部表
    pub fn validate(&self) -> Result<(), StackError> {
        self.canif.validate()?;
        self.pdur.validate()?;
        self.com.validate()?;

        let mut protected = HashSet::new();
        for entry in &self.e2e {
            entry.config.validate()?;
            if usize::from(entry.config.data_length) > COM_PDU_SIZE {
                return Err(StackError::InvalidConfig(format!(
                    "E2E PDU {}: data length {} exceeds {}",
                    entry.pdu_id, entry.config.data_length, COM_PDU_SIZE
                )));
            }
            if !protected.insert(entry.pdu_id) {
                return Err(StackError::InvalidConfig(format!(
                    "duplicate E2E entry for PDU {}",
                    entry.pdu_id
                )));
            }
        }

        Ok(())
    }

    /// 查找某个 PDU 的 E2E 参数
    pub fn e2e_for(&self, pdu_id: PduId) -> Option<&E2eConfig> {
        self.e2e
            .iter()
            .find(|e| e.pdu_id == pdu_id)
            .map(|e| &e.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::com::SignalType;
    use crate::pdur::PduRDestination;
    use ecucom_protocol::ProtocolError;

    const SAMPLE: &str = r#"
name = "pedal"
interface = "vcan0"

[driver]
baudrate = 500000
controller_id = 0

[[canif.tx_routes]]
pdu_id = 0
can_id = 0x100
dlc = 8

[[canif.rx_routes]]
can_id = 0x200
pdu_id = 0
dlc = 8

[[pdur.routes]]
rx_pdu_id = 0
destination = "com"
upper_pdu_id = 1

[[com.signals]]
signal_id = 0
bit_position = 16
bit_size = 8
type = "u8"
pdu_id = 0

[[com.signals]]
signal_id = 1
bit_position = 16
bit_size = 16
type = "s16"
pdu_id = 1

[[com.tx_pdus]]
pdu_id = 0
dlc = 8
cycle_time_ms = 10

[[com.rx_pdus]]
pdu_id = 1
dlc = 8
timeout_ms = 100

[[e2e]]
pdu_id = 0
data_id = 3
max_delta_counter = 2
data_length = 8
"#;

    #[test]
    fn test_parse_sample() {
        let config = StackConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.name, "pedal");
        assert_eq!(config.interface.as_deref(), Some("vcan0"));
        assert_eq!(config.driver.baudrate, 500_000);
        assert_eq!(config.canif.tx_routes[0].can_id, 0x100);
        assert_eq!(config.canif.tx_routes[0].hth, 0);
        assert!(!config.canif.rx_routes[0].is_extended);
        assert_eq!(config.pdur.routes[0].destination, PduRDestination::Com);
        assert_eq!(config.com.signals[1].signal_type, SignalType::S16);
        assert_eq!(config.com.tx_pdus[0].cycle_time_ms, 10);
        assert_eq!(
            config.e2e_for(0),
            Some(&E2eConfig::new(3, 2, 8).unwrap())
        );
        assert_eq!(config.e2e_for(1), None);
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = StackConfig::from_toml_str("").unwrap();
        assert_eq!(config, StackConfig::default());
        assert_eq!(config.driver.baudrate, 500_000);
    }

    #[test]
    fn test_to_toml_reparses() {
        let config = StackConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(StackConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_parse_error_is_invalid_config() {
        let err = StackConfig::from_toml_str("[[com.signals]]\nsignal_id = \"x\"").unwrap_err();
        assert!(matches!(err, StackError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_e2e_rejected() {
        let text = SAMPLE.replace("data_id = 3", "data_id = 16");
        assert_eq!(
            StackConfig::from_toml_str(&text),
            Err(StackError::E2e(ProtocolError::InvalidDataId(16)))
        );

        let text = SAMPLE.replace("data_length = 8", "data_length = 12");
        assert!(matches!(
            StackConfig::from_toml_str(&text),
            Err(StackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_table_errors_propagate() {
        let text = SAMPLE.replace("can_id = 0x100", "can_id = 0x900");
        assert!(StackConfig::from_toml_str(&text).is_err());

        let text = SAMPLE.replace("destination = \"com\"", "destination = \"nm\"");
        assert!(StackConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = StackConfig::load("/nonexistent/ecucom.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
