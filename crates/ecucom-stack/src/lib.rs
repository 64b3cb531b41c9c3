//! # ECU Com Stack
//!
//! CAN 通信栈的上三层：接口层（CanIf）、路由层（PduR）与信号服务（Com），
//! 以及把它们与驱动组合在一起的 [`EcuStack`] 上下文。
//!
//! ## 数据流
//!
//! ```text
//! 接收: 硬件 → CanDriver::poll_receive → CanIf (CAN ID → PDU ID)
//!       → PduR (→ Com / Dcm) → Com 解包 → receive_signal
//! 发送: send_signal → Com 打包 + Pending → main_function_tx
//!       → PduR → CanIf (PDU ID → CAN ID) → CanDriver::write → 硬件
//! ```
//!
//! ## 执行模型
//!
//! 单线程、协作式：外部周期调度器按固定周期调用 `main_function_*`。
//! 所有状态都属于一个 [`EcuStack`] 实例，同一进程可以运行多个独立实例。
//!
//! E2E 保护不会自动接入链路，调用方通过 `ecucom_protocol::e2e` 显式调用。

pub mod canif;
pub mod com;
pub mod config;
mod error;
pub mod metrics;
pub mod pdur;
mod stack;

pub use canif::{CanIf, CanIfConfig, CanIfRxRoute, CanIfTxRoute};
pub use com::{
    COM_MAX_PDUS, COM_PDU_SIZE, Com, ComConfig, ComPduState, ComRxPduConfig, ComSignalConfig,
    ComTxPduConfig, SignalType, SignalValue,
};
pub use config::{E2eProtectedPdu, StackConfig};
pub use error::StackError;
pub use metrics::{MetricsSnapshot, StackMetrics};
pub use pdur::{PduR, PduRConfig, PduRDestination, PduRRoute};
pub use stack::EcuStack;

use ecucom_protocol::PduId;

/// 上层接收入口（信号服务、诊断服务）
///
/// 同步调用，没有异步的发送确认。
pub trait PduIndication {
    fn rx_indication(&mut self, pdu_id: PduId, sdu: &[u8]);
}

/// 下层发送入口（路由层 → 接口层）
pub trait PduTransmit {
    fn transmit(&mut self, pdu_id: PduId, sdu: &[u8]) -> Result<(), StackError>;
}

/// 不接诊断服务时使用：丢弃所有诊断 PDU
impl PduIndication for () {
    fn rx_indication(&mut self, pdu_id: PduId, _sdu: &[u8]) {
        tracing::trace!("no diagnostic service attached, dropping PDU {}", pdu_id);
    }
}
