//! 端到端（E2E）报文保护
//!
//! 与传输层可靠性无关地检测报文损坏、重复、丢失与乱序。
//!
//! ## 头部布局
//!
//! ```text
//! Byte 0: [counter:4][data_id:4]
//! Byte 1: CRC-8/SAE-J1850(payload[2..len] ++ data_id)
//! Byte 2..len: 应用数据（由调用方填写，本模块不修改）
//! ```
//!
//! E2E 不会自动接入收发链路，调用方需要在 PDU 经过协议栈之前/之后
//! 显式调用 [`protect`] / [`check`]。
//!
//! ## 计数器
//!
//! 4-bit 活动计数器，模 16 回绕。发送方和接收方各自维护独立的
//! [`E2eState`]，即使是同一条逻辑报文也不能共用。

use crate::ProtocolError;
use crate::crc::{CRC8_INIT, CRC8_SAE_J1850};

/// Byte 0：计数器 + Data ID
pub const E2E_BYTE_COUNTER_ID: usize = 0;
/// Byte 1：CRC
pub const E2E_BYTE_CRC: usize = 1;
/// 应用数据起始偏移
pub const E2E_PAYLOAD_OFFSET: usize = 2;
/// Data ID 数量上限（4-bit）
pub const E2E_MAX_DATA_IDS: u8 = 16;

const NIBBLE_MASK: u8 = 0x0F;

/// 单条报文的 E2E 配置（构建期确定，运行期只读）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct E2eConfig {
    /// 4-bit 报文标识
    pub data_id: u8,
    /// 允许的最大计数器跳变
    pub max_delta_counter: u8,
    /// PDU 长度（字节）
    pub data_length: u16,
}

impl E2eConfig {
    /// 创建并校验配置
    ///
    /// # 错误
    ///
    /// - `ProtocolError::InvalidDataId`: `data_id` 超过 4 bit
    /// - `ProtocolError::TooShort`: `data_length` 容纳不下 2 字节头部
    pub fn new(
        data_id: u8,
        max_delta_counter: u8,
        data_length: u16,
    ) -> Result<Self, ProtocolError> {
        let config = Self {
            data_id,
            max_delta_counter,
            data_length,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验配置字段
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.data_id >= E2E_MAX_DATA_IDS {
            return Err(ProtocolError::InvalidDataId(self.data_id));
        }
        if usize::from(self.data_length) < E2E_PAYLOAD_OFFSET {
            return Err(ProtocolError::TooShort {
                min: E2E_PAYLOAD_OFFSET,
                actual: usize::from(self.data_length),
            });
        }
        Ok(())
    }

    fn data_id_nibble(&self) -> u8 {
        self.data_id & NIBBLE_MASK
    }
}

/// 单方向的 E2E 运行时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct E2eState {
    /// 当前活动计数器（0..=15）
    pub counter: u8,
}

impl E2eState {
    /// 新建状态（计数器为 0）
    pub fn new() -> Self {
        Self::default()
    }
}

/// 接收检查结果（封闭的四种结果）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum E2eCheckStatus {
    /// CRC 正确，计数器在允许范围内
    Ok,
    /// 与上一帧计数器相同
    Repeated,
    /// 计数器跳变超过 `max_delta_counter`
    WrongSequence,
    /// 参数非法、Data ID 不符或 CRC 不符
    Error,
}

impl E2eCheckStatus {
    /// 是否为 `Ok`
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// 计算 PDU 的 CRC：`payload[2..len]` 之后追加 Data ID
fn compute_pdu_crc(data: &[u8], data_id: u8) -> u8 {
    let mut digest = CRC8_SAE_J1850.digest_with_initial(CRC8_INIT);
    digest.update(&data[E2E_PAYLOAD_OFFSET..]);
    digest.update(&[data_id]);
    digest.finalize()
}

fn validate_length(config: &E2eConfig, len: usize) -> Result<(), ProtocolError> {
    if len < E2E_PAYLOAD_OFFSET {
        return Err(ProtocolError::TooShort {
            min: E2E_PAYLOAD_OFFSET,
            actual: len,
        });
    }
    if len != usize::from(config.data_length) {
        return Err(ProtocolError::InvalidLength {
            expected: usize::from(config.data_length),
            actual: len,
        });
    }
    Ok(())
}

/// 为待发送的 PDU 添加 E2E 保护
///
/// 计数器先自增（模 16），因此新状态第一次保护写入的计数器为 1。
/// 只写 Byte 0 与 Byte 1，应用数据保持不变。
///
/// # 错误
///
/// `data.len()` 与 `config.data_length` 不一致或小于 2 时返回错误，
/// 此时状态和缓冲区都不会被修改。
pub fn protect(
    config: &E2eConfig,
    state: &mut E2eState,
    data: &mut [u8],
) -> Result<(), ProtocolError> {
    validate_length(config, data.len())?;

    state.counter = state.counter.wrapping_add(1) & NIBBLE_MASK;

    let data_id = config.data_id_nibble();
    data[E2E_BYTE_COUNTER_ID] = (state.counter << 4) | data_id;
    data[E2E_BYTE_CRC] = compute_pdu_crc(data, data_id);

    Ok(())
}

/// 检查接收到的 PDU
///
/// 检查顺序：长度 → Data ID → CRC → 计数器。
///
/// CRC 通过后，状态**无条件**更新为接收到的计数器，再根据
/// `delta = (rx - last) mod 16` 分类：
///
/// | delta | 结果 |
/// |-------|------|
/// | 0 | `Repeated` |
/// | 1 | `Ok`（即使 `max_delta_counter == 0`） |
/// | > max_delta_counter | `WrongSequence` |
/// | 其他 | `Ok` |
pub fn check(config: &E2eConfig, state: &mut E2eState, data: &[u8]) -> E2eCheckStatus {
    if validate_length(config, data.len()).is_err() {
        return E2eCheckStatus::Error;
    }

    let header = data[E2E_BYTE_COUNTER_ID];
    let rx_counter = (header >> 4) & NIBBLE_MASK;
    let rx_data_id = header & NIBBLE_MASK;

    // Data ID 不符：冒充检测，与 CRC 无关
    if rx_data_id != config.data_id_nibble() {
        return E2eCheckStatus::Error;
    }

    if data[E2E_BYTE_CRC] != compute_pdu_crc(data, config.data_id_nibble()) {
        return E2eCheckStatus::Error;
    }

    let delta = rx_counter.wrapping_sub(state.counter) & NIBBLE_MASK;
    state.counter = rx_counter;

    match delta {
        0 => E2eCheckStatus::Repeated,
        1 => E2eCheckStatus::Ok,
        d if d > config.max_delta_counter => E2eCheckStatus::WrongSequence,
        _ => E2eCheckStatus::Ok,
    }
}
