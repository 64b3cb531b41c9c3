//! # ECU Com CAN Driver
//!
//! CAN 控制器驱动层：拥有硬件收发边界与控制器模式状态机，
//! 向上层提供与硬件无关的统一接口。
//!
//! ## 分层
//!
//! ```text
//! Interface Layer (ecucom-stack::CanIf)
//!     ↑ CanIndication::rx_indication / controller_bus_off
//!     ↓ CanDriver::write
//! CanDriver (此 crate)
//!     ↓ CanHardware trait
//! SocketCAN / Mock
//! ```

use thiserror::Error;

// 重新导出 ecucom-protocol 中的 CanFrame
pub use ecucom_protocol::{CAN_MAX_DLC, CanFrame, CanId};

mod driver;

pub use driver::{
    CAN_MAX_RX_PER_CALL, CanDriver, CanDriverConfig, CanPdu, ControllerErrorState,
    ControllerMode,
};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockHardware;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use self::socketcan::SocketCanHardware;

/// CAN 驱动层统一错误类型
///
/// `Write` 的失败分为两类，必须保持区分：
/// - **可重试**：[`CanError::Busy`]，硬件邮箱已满
/// - **不可重试**：其余变体（参数校验失败、状态不对）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanError {
    #[error("Controller not initialized")]
    Uninit,
    #[error("Controller not started")]
    NotStarted,
    #[error("Invalid controller mode transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ControllerMode,
        to: ControllerMode,
    },
    #[error("Invalid DLC: {0} (max 8)")]
    InvalidLength(u8),
    #[error("Missing payload for DLC {0}")]
    MissingData(u8),
    #[error("Hardware busy, retry later")]
    Busy,
    #[error("Hardware error: {0}")]
    Hardware(String),
}

impl CanError {
    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, CanError::Busy)
    }
}

/// 硬件抽象（按平台实现）
///
/// 对应控制器的 init/start/stop、发送、轮询接收、bus-off 查询与错误计数器查询。
/// 所有方法都不能阻塞。
pub trait CanHardware {
    /// 初始化硬件
    fn init(&mut self, baudrate: u32) -> Result<(), CanError>;
    /// 启动控制器
    fn start(&mut self);
    /// 停止控制器
    fn stop(&mut self);
    /// 发送一帧（`data.len() <= 8`）
    fn transmit(&mut self, id: CanId, data: &[u8]) -> Result<(), CanError>;
    /// 非阻塞接收，没有更多帧时返回 `None`
    fn receive(&mut self) -> Option<CanFrame>;
    /// 硬件是否处于 bus-off
    fn is_bus_off(&self) -> bool;
    /// 读取 (TEC, REC) 错误计数器
    fn error_counters(&self) -> (u8, u8);
}

impl<H: CanHardware + ?Sized> CanHardware for Box<H> {
    fn init(&mut self, baudrate: u32) -> Result<(), CanError> {
        (**self).init(baudrate)
    }

    fn start(&mut self) {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn transmit(&mut self, id: CanId, data: &[u8]) -> Result<(), CanError> {
        (**self).transmit(id, data)
    }

    fn receive(&mut self) -> Option<CanFrame> {
        (**self).receive()
    }

    fn is_bus_off(&self) -> bool {
        (**self).is_bus_off()
    }

    fn error_counters(&self) -> (u8, u8) {
        (**self).error_counters()
    }
}

/// 驱动向上层（接口层）的回调
///
/// 两个回调都在驱动的周期函数内同步调用。
pub trait CanIndication {
    /// 收到一帧
    fn rx_indication(&mut self, can_id: CanId, sdu: &[u8]);

    /// 控制器进入 bus-off（边沿触发，每次进入只通知一次）
    fn controller_bus_off(&mut self, controller_id: u8);
}
