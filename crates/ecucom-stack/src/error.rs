//! 通信栈错误类型定义

use crate::com::SignalType;
use ecucom_can::CanError;
use ecucom_protocol::{PduId, ProtocolError, SignalId};
use thiserror::Error;

/// 接口层 / 路由层 / 信号服务的统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    /// CAN 驱动错误（初始化、模式切换）
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 发送失败
    ///
    /// 接口层把驱动的所有失败（包括可重试的 `Busy`）合并为这一种结果，
    /// 原始原因保留在 `source` 中。
    #[error("Transmit of PDU {pdu_id} failed")]
    TransmitFailed {
        pdu_id: PduId,
        #[source]
        source: CanError,
    },

    /// 模块未初始化
    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    /// PDU ID 不在路由表中
    #[error("Unknown PDU id: {0}")]
    UnknownPdu(PduId),

    /// 信号 ID 越界
    #[error("Unknown signal id: {0}")]
    UnknownSignal(SignalId),

    /// 信号值类型与配置不符
    #[error("Signal {signal_id} expects {expected:?}, got {actual:?}")]
    SignalTypeMismatch {
        signal_id: SignalId,
        expected: SignalType,
        actual: SignalType,
    },

    /// 配置表非法
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// E2E 配置非法
    #[error("Invalid E2E configuration: {0}")]
    E2e(#[from] ProtocolError),
}

impl StackError {
    /// 包装驱动发送错误
    pub(crate) fn transmit_failed(pdu_id: PduId, source: CanError) -> Self {
        StackError::TransmitFailed { pdu_id, source }
    }
}
