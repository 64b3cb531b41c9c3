//! 信号服务（Com）
//!
//! 在强类型的应用信号与按字节组织的 PDU 之间搬运数据。
//!
//! ## 打包规则
//!
//! - 仅字节粒度：字节偏移 = `bit_position / 8`
//! - 8-bit 信号占 1 字节，16-bit 信号按小端占 2 字节
//!
//! ## 发送
//!
//! `send_signal` 只打包并把所属 PDU 标记为 `Pending`，从不同步发送。
//! `main_function_tx` 按配置顺序发送所有 `Pending` 的 PDU，成功后变为 `Sent`，
//! 失败则保持 `Pending` 等下一个周期重试（无上限、无退避）。
//!
//! ## 影子单元
//!
//! 每个信号只有一个影子单元，收发共用：读取本 ECU 自己发送的信号，
//! 得到的是最后一次发送的值。

use crate::{PduIndication, PduTransmit, StackError};
use ecucom_protocol::{PduId, SignalId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::trace;

/// 信号服务可管理的 PDU 数量
pub const COM_MAX_PDUS: usize = 16;

/// 每个 PDU 缓冲区的字节数
pub const COM_PDU_SIZE: usize = 8;

/// 信号数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    U8,
    U16,
    S16,
    Bool,
}

impl SignalType {
    /// 该类型在 PDU 中占用的位宽
    pub fn bit_size(self) -> u8 {
        match self {
            SignalType::U8 | SignalType::Bool => 8,
            SignalType::U16 | SignalType::S16 => 16,
        }
    }
}

/// 带类型标签的信号值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalValue {
    U8(u8),
    U16(u16),
    S16(i16),
    Bool(bool),
}

impl SignalValue {
    /// 指定类型的零值
    pub fn zero(signal_type: SignalType) -> Self {
        match signal_type {
            SignalType::U8 => SignalValue::U8(0),
            SignalType::U16 => SignalValue::U16(0),
            SignalType::S16 => SignalValue::S16(0),
            SignalType::Bool => SignalValue::Bool(false),
        }
    }

    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalValue::U8(_) => SignalType::U8,
            SignalValue::U16(_) => SignalType::U16,
            SignalValue::S16(_) => SignalType::S16,
            SignalValue::Bool(_) => SignalType::Bool,
        }
    }

    /// 线上表示（最多 16 位）
    fn to_raw(self) -> u16 {
        match self {
            SignalValue::U8(v) => u16::from(v),
            SignalValue::U16(v) => v,
            SignalValue::S16(v) => v as u16,
            SignalValue::Bool(v) => u16::from(v),
        }
    }

    fn from_raw(signal_type: SignalType, raw: u16) -> Self {
        match signal_type {
            SignalType::U8 => SignalValue::U8(raw as u8),
            SignalType::U16 => SignalValue::U16(raw),
            SignalType::S16 => SignalValue::S16(raw as i16),
            SignalType::Bool => SignalValue::Bool(raw & 0xFF != 0),
        }
    }

    /// 按有符号整数读取（用于显示与日志）
    pub fn as_i32(&self) -> i32 {
        match *self {
            SignalValue::U8(v) => i32::from(v),
            SignalValue::U16(v) => i32::from(v),
            SignalValue::S16(v) => i32::from(v),
            SignalValue::Bool(v) => i32::from(v),
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Bool(v) => write!(f, "{}", v),
            other => write!(f, "{}", other.as_i32()),
        }
    }
}

impl From<u8> for SignalValue {
    fn from(v: u8) -> Self {
        SignalValue::U8(v)
    }
}

impl From<u16> for SignalValue {
    fn from(v: u16) -> Self {
        SignalValue::U16(v)
    }
}

impl From<i16> for SignalValue {
    fn from(v: i16) -> Self {
        SignalValue::S16(v)
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

/// TX PDU 的发送状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComPduState {
    /// 自初始化以来没有待发送的数据
    #[default]
    Idle,
    /// 有信号写入，等待下一次 `main_function_tx`
    Pending,
    /// 最近一次发送成功
    Sent,
}

/// 信号描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComSignalConfig {
    /// 必须等于该信号在表中的下标
    pub signal_id: SignalId,
    /// 起始位（必须是 8 的倍数）
    pub bit_position: u8,
    /// 位宽：8 或 16
    pub bit_size: u8,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    /// 所属 PDU
    pub pdu_id: PduId,
}

impl ComSignalConfig {
    fn byte_offset(&self) -> usize {
        usize::from(self.bit_position / 8)
    }

    fn byte_len(&self) -> usize {
        if self.bit_size <= 8 { 1 } else { 2 }
    }

    fn byte_range(&self) -> std::ops::Range<usize> {
        let start = self.byte_offset();
        start..start + self.byte_len()
    }
}

/// TX PDU 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComTxPduConfig {
    pub pdu_id: PduId,
    pub dlc: u8,
    /// 发送周期，由外部调度器解释
    #[serde(default)]
    pub cycle_time_ms: u16,
}

/// RX PDU 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComRxPduConfig {
    pub pdu_id: PduId,
    pub dlc: u8,
    /// 接收超时，由外部看门狗解释
    #[serde(default)]
    pub timeout_ms: u16,
}

/// 信号服务配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComConfig {
    pub signals: Vec<ComSignalConfig>,
    pub tx_pdus: Vec<ComTxPduConfig>,
    pub rx_pdus: Vec<ComRxPduConfig>,
}

impl ComConfig {
    /// 校验信号表与 PDU 表
    pub fn validate(&self) -> Result<(), StackError> {
        for (index, signal) in self.signals.iter().enumerate() {
            if usize::from(signal.signal_id) != index {
                return Err(invalid(format!(
                    "signal ids must be dense: entry {} has id {}",
                    index, signal.signal_id
                )));
            }
            if signal.bit_size != signal.signal_type.bit_size() {
                return Err(invalid(format!(
                    "signal {}: width {} does not match type {:?}",
                    signal.signal_id, signal.bit_size, signal.signal_type
                )));
            }
            if signal.bit_position % 8 != 0 {
                return Err(invalid(format!(
                    "signal {}: bit position {} is not byte aligned",
                    signal.signal_id, signal.bit_position
                )));
            }
            if signal.byte_range().end > COM_PDU_SIZE {
                return Err(invalid(format!(
                    "signal {}: bytes {:?} exceed the {}-byte PDU",
                    signal.signal_id,
                    signal.byte_range(),
                    COM_PDU_SIZE
                )));
            }
            check_pdu_id(signal.pdu_id)?;
        }

        let mut tx_ids = HashSet::new();
        for pdu in &self.tx_pdus {
            check_pdu_id(pdu.pdu_id)?;
            check_dlc(pdu.pdu_id, pdu.dlc)?;
            if !tx_ids.insert(pdu.pdu_id) {
                return Err(invalid(format!("duplicate Com TX PDU {}", pdu.pdu_id)));
            }
        }

        let mut rx_ids = HashSet::new();
        for pdu in &self.rx_pdus {
            check_pdu_id(pdu.pdu_id)?;
            check_dlc(pdu.pdu_id, pdu.dlc)?;
            if !rx_ids.insert(pdu.pdu_id) {
                return Err(invalid(format!("duplicate Com RX PDU {}", pdu.pdu_id)));
            }
        }

        Ok(())
    }
}

fn invalid(msg: String) -> StackError {
    StackError::InvalidConfig(msg)
}

fn check_pdu_id(pdu_id: PduId) -> Result<(), StackError> {
    if usize::from(pdu_id) >= COM_MAX_PDUS {
        return Err(invalid(format!(
            "Com PDU id {} out of range (max {})",
            pdu_id,
            COM_MAX_PDUS - 1
        )));
    }
    Ok(())
}

fn check_dlc(pdu_id: PduId, dlc: u8) -> Result<(), StackError> {
    if usize::from(dlc) > COM_PDU_SIZE {
        return Err(invalid(format!("Com PDU {}: DLC {} exceeds 8", pdu_id, dlc)));
    }
    Ok(())
}

/// 信号服务
///
/// # 示例
///
/// ```rust
/// use ecucom_stack::com::{Com, ComConfig, ComSignalConfig, SignalType, SignalValue};
///
/// let mut com = Com::new();
/// com.init(ComConfig {
///     signals: vec![ComSignalConfig {
///         signal_id: 0,
///         bit_position: 16,
///         bit_size: 8,
///         signal_type: SignalType::U8,
///         pdu_id: 0,
///     }],
///     ..Default::default()
/// })
/// .unwrap();
///
/// com.send_signal(0, 128u8).unwrap();
/// assert_eq!(com.receive_signal(0).unwrap(), SignalValue::U8(128));
/// ```
#[derive(Debug, Default)]
pub struct Com {
    config: Option<ComConfig>,
    shadows: Vec<SignalValue>,
    tx_buffers: [[u8; COM_PDU_SIZE]; COM_MAX_PDUS],
    rx_buffers: [[u8; COM_PDU_SIZE]; COM_MAX_PDUS],
    tx_state: [ComPduState; COM_MAX_PDUS],
}

impl Com {
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验并装载配置，清空所有缓冲区、影子单元与发送状态
    pub fn init(&mut self, config: ComConfig) -> Result<(), StackError> {
        config.validate()?;

        self.shadows = config
            .signals
            .iter()
            .map(|s| SignalValue::zero(s.signal_type))
            .collect();
        self.tx_buffers = Default::default();
        self.rx_buffers = Default::default();
        self.tx_state = Default::default();
        self.config = Some(config);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    /// 写信号：更新影子单元，打包进所属 PDU，并标记为 `Pending`
    ///
    /// # 错误
    ///
    /// - `StackError::NotInitialized`
    /// - `StackError::UnknownSignal`: ID 越界
    /// - `StackError::SignalTypeMismatch`: 值的类型与配置不符
    ///
    /// 出错时不修改任何状态。
    pub fn send_signal(
        &mut self,
        signal_id: SignalId,
        value: impl Into<SignalValue>,
    ) -> Result<(), StackError> {
        let value = value.into();
        let config = self.config.as_ref().ok_or(StackError::NotInitialized("Com"))?;
        let index = usize::from(signal_id);
        let signal = config
            .signals
            .get(index)
            .ok_or(StackError::UnknownSignal(signal_id))?;

        if value.signal_type() != signal.signal_type {
            return Err(StackError::SignalTypeMismatch {
                signal_id,
                expected: signal.signal_type,
                actual: value.signal_type(),
            });
        }

        if let Some(shadow) = self.shadows.get_mut(index) {
            *shadow = value;
        }

        let pdu = usize::from(signal.pdu_id);
        if let (Some(buf), Some(state)) = (self.tx_buffers.get_mut(pdu), self.tx_state.get_mut(pdu))
        {
            let raw = value.to_raw().to_le_bytes();
            let range = signal.byte_range();
            let len = range.len();
            if let Some(dst) = buf.get_mut(range) {
                dst.copy_from_slice(&raw[..len]);
            }
            *state = ComPduState::Pending;
        }

        Ok(())
    }

    /// 读信号：返回影子单元的当前值
    pub fn receive_signal(&self, signal_id: SignalId) -> Result<SignalValue, StackError> {
        if self.config.is_none() {
            return Err(StackError::NotInitialized("Com"));
        }
        self.shadows
            .get(usize::from(signal_id))
            .copied()
            .ok_or(StackError::UnknownSignal(signal_id))
    }

    /// 接收指示：复制 `min(len, 8)` 字节到该 PDU 的接收缓冲区，
    /// 然后解包所有属于该 PDU 的信号
    ///
    /// 未初始化或 PDU ID 越界时静默忽略。
    pub fn rx_indication(&mut self, pdu_id: PduId, sdu: &[u8]) {
        let Some(config) = self.config.as_ref() else {
            return;
        };
        let Some(buf) = self.rx_buffers.get_mut(usize::from(pdu_id)) else {
            trace!("Com: ignoring RX for out-of-range PDU {}", pdu_id);
            return;
        };

        let len = sdu.len().min(COM_PDU_SIZE);
        buf[..len].copy_from_slice(&sdu[..len]);

        for (signal, shadow) in config.signals.iter().zip(self.shadows.iter_mut()) {
            if signal.pdu_id != pdu_id {
                continue;
            }
            let raw = match buf.get(signal.byte_range()) {
                Some([lo]) => u16::from(*lo),
                Some([lo, hi]) => u16::from_le_bytes([*lo, *hi]),
                _ => continue,
            };
            *shadow = SignalValue::from_raw(signal.signal_type, raw);
        }
    }

    /// 周期发送：按配置顺序发送所有 `Pending` 的 TX PDU
    ///
    /// # 返回
    ///
    /// 本次成功发送的 PDU 数
    pub fn main_function_tx(&mut self, router: &mut impl PduTransmit) -> usize {
        let Some(config) = self.config.as_ref() else {
            return 0;
        };

        let mut sent = 0;
        for pdu in &config.tx_pdus {
            let index = usize::from(pdu.pdu_id);
            let (Some(state), Some(buf)) = (self.tx_state.get_mut(index), self.tx_buffers.get(index))
            else {
                continue;
            };
            if *state != ComPduState::Pending {
                continue;
            }

            let len = usize::from(pdu.dlc).min(COM_PDU_SIZE);
            match router.transmit(pdu.pdu_id, &buf[..len]) {
                Ok(()) => {
                    *state = ComPduState::Sent;
                    sent += 1;
                },
                Err(e) => {
                    trace!("Com: PDU {} still pending, retry next cycle: {}", pdu.pdu_id, e);
                },
            }
        }
        sent
    }

    /// 查询 PDU 的发送状态
    pub fn pdu_state(&self, pdu_id: PduId) -> Option<ComPduState> {
        self.config.as_ref()?;
        self.tx_state.get(usize::from(pdu_id)).copied()
    }

    /// 读取 PDU 的发送缓冲区
    pub fn tx_buffer(&self, pdu_id: PduId) -> Option<&[u8; COM_PDU_SIZE]> {
        self.config.as_ref()?;
        self.tx_buffers.get(usize::from(pdu_id))
    }
}

impl PduIndication for Com {
    fn rx_indication(&mut self, pdu_id: PduId, sdu: &[u8]) {
        Com::rx_indication(self, pdu_id, sdu);
    }
}
