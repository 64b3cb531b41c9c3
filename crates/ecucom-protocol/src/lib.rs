//! # ECU Com Protocol
//!
//! CAN 通信栈的协议层定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: CAN ID / PDU ID 类型与范围常量
//! - `crc`: CRC-8/SAE-J1850 校验
//! - `e2e`: 端到端（E2E）报文保护：CRC + 活动计数器 + Data ID
//!
//! ## 字节序
//!
//! 信号打包使用 Intel（LSB）低位在前（小端字节序）。
//! E2E 头部固定占用 PDU 的前两个字节。

pub mod crc;
pub mod e2e;
pub mod ids;

// 重新导出常用类型
pub use crc::calc_crc8;
pub use e2e::{E2eCheckStatus, E2eConfig, E2eState};
pub use ids::*;

use thiserror::Error;

/// CAN 2.0 标准帧的统一抽象
///
/// `CanFrame` 是协议层与控制器驱动之间的中间抽象：
/// - 驱动层从硬件读取后构造 `CanFrame`
/// - Mock / SocketCAN 后端使用同一帧类型
///
/// # 设计特性
///
/// - **Copy trait**：零成本复制，适合周期性调度场景
/// - **固定 8 字节**：避免堆分配
/// - **仅支持 11-bit 标准 ID**：不支持 CAN FD 与扩展帧
///
/// ```rust
/// use ecucom_protocol::CanFrame;
///
/// let frame = CanFrame::new_standard(0x100, &[1, 2, 3, 4]);
/// assert_eq!(frame.id(), 0x100);
/// assert_eq!(frame.data_slice(), &[1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanFrame {
    /// CAN ID（11-bit 标准帧）
    pub id: CanId,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; CAN_MAX_DLC],

    /// 有效数据长度 (0-8)
    pub len: u8,
}

impl CanFrame {
    /// 创建标准帧
    ///
    /// ID 截断到低 11 位，数据超过 8 字节的部分被丢弃。
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; CAN_MAX_DLC];
        let len = data.len().min(CAN_MAX_DLC);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id: CanId::from(id) & CAN_STANDARD_ID_MASK,
            data: fixed_data,
            len: len as u8,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..usize::from(self.len).min(CAN_MAX_DLC)]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> CanId {
        self.id
    }

    /// 获取完整数据（8字节固定数组）
    pub fn data(&self) -> &[u8; CAN_MAX_DLC] {
        &self.data
    }
}

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid data length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Data too short for E2E header: {actual} bytes (min {min})")]
    TooShort { min: usize, actual: usize },

    #[error("Invalid E2E data id: 0x{0:X} (must fit in 4 bits)")]
    InvalidDataId(u8),

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: CanId },
}
