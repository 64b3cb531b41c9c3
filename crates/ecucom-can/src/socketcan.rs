//! SocketCAN 硬件后端
//!
//! 基于 Linux SocketCAN 的 [`CanHardware`] 实现，典型用法是配合 `vcan0` 做仿真。
//!
//! ## 行为
//!
//! - `init` 打开接口并切换到非阻塞模式；波特率由 `ip link` 配置，这里忽略
//! - 发送失败锁存 bus-off，之后任意一次成功接收清除
//! - 错误计数器不可读，始终报告 (0, 0)
//! - 只接收标准数据帧，远程帧与错误帧被丢弃
//!
//! ## 依赖
//!
//! - `socketcan` crate (版本 3.5)
//! - CAN 接口必须已配置并处于 UP 状态

use crate::{CAN_MAX_DLC, CanError, CanFrame, CanHardware, CanId};
use ::socketcan::{CanFrame as SocketFrame, CanSocket, EmbeddedFrame, Frame, Socket, StandardId};
use std::io::ErrorKind;
use tracing::{trace, warn};

/// 接口名环境变量
pub const CAN_INTERFACE_ENV: &str = "CAN_INTERFACE";

/// 默认接口名
pub const DEFAULT_INTERFACE: &str = "vcan0";

/// SocketCAN 硬件
///
/// # 示例
///
/// ```no_run
/// use ecucom_can::{CanDriver, CanDriverConfig, SocketCanHardware};
///
/// let mut driver = CanDriver::new(SocketCanHardware::new("vcan0"));
/// driver.init(&CanDriverConfig::default()).unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanHardware {
    interface: String,
    socket: Option<CanSocket>,
    bus_off: bool,
}

impl SocketCanHardware {
    /// 指定接口名创建（不打开 socket，`init` 时才打开）
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            socket: None,
            bus_off: false,
        }
    }

    /// 接口名取自 `CAN_INTERFACE` 环境变量，未设置时为 `vcan0`
    pub fn from_env() -> Self {
        let interface = std::env::var(CAN_INTERFACE_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_INTERFACE.to_string());
        Self::new(interface)
    }

    /// 接口名
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl CanHardware for SocketCanHardware {
    fn init(&mut self, _baudrate: u32) -> Result<(), CanError> {
        let socket = CanSocket::open(&self.interface).map_err(|e| {
            CanError::Hardware(format!(
                "Failed to open CAN interface '{}': {}",
                self.interface, e
            ))
        })?;

        socket.set_nonblocking(true).map_err(|e| {
            CanError::Hardware(format!(
                "Failed to set '{}' non-blocking: {}",
                self.interface, e
            ))
        })?;

        self.socket = Some(socket);
        self.bus_off = false;
        trace!("SocketCAN interface '{}' opened", self.interface);
        Ok(())
    }

    // SocketCAN 打开即参与总线通信，启停由驱动的模式状态决定
    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn transmit(&mut self, id: CanId, data: &[u8]) -> Result<(), CanError> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(CanError::Hardware(format!(
                "CAN interface '{}' not open",
                self.interface
            )));
        };

        let frame = u16::try_from(id)
            .ok()
            .and_then(StandardId::new)
            .and_then(|sid| SocketFrame::new(sid, data))
            .ok_or_else(|| {
                CanError::Hardware(format!("Failed to create standard frame with ID 0x{:X}", id))
            })?;

        if let Err(e) = socket.write_frame(&frame) {
            if !self.bus_off {
                warn!("SocketCAN transmit on '{}' failed: {}", self.interface, e);
            }
            self.bus_off = true;
            return Err(CanError::Hardware(format!("SocketCAN transmit error: {}", e)));
        }

        trace!("Sent CAN frame: ID=0x{:03X}, len={}", id, data.len());
        Ok(())
    }

    fn receive(&mut self) -> Option<CanFrame> {
        let socket = self.socket.as_ref()?;

        loop {
            let frame = match socket.read_frame() {
                Ok(frame) => frame,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) => {
                    trace!("SocketCAN read on '{}' failed: {}", self.interface, e);
                    return None;
                },
            };

            // 数据帧之外（远程帧、错误帧、扩展帧）直接跳过
            let SocketFrame::Data(data_frame) = frame else {
                continue;
            };
            if data_frame.is_extended() {
                continue;
            }

            self.bus_off = false;

            let payload = data_frame.data();
            let len = payload.len().min(CAN_MAX_DLC);
            let id = data_frame.raw_id() & 0x7FF;
            trace!("Received CAN frame: ID=0x{:03X}, len={}", id, len);
            return Some(CanFrame::new_standard(id as u16, &payload[..len]));
        }
    }

    fn is_bus_off(&self) -> bool {
        self.bus_off
    }

    fn error_counters(&self) -> (u8, u8) {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmit_before_init_fails() {
        let mut hw = SocketCanHardware::new("vcan-missing");
        assert!(matches!(
            hw.transmit(0x100, &[1, 2]),
            Err(CanError::Hardware(_))
        ));
        assert_eq!(hw.receive(), None);
        assert!(!hw.is_bus_off());
        assert_eq!(hw.error_counters(), (0, 0));
    }

    #[test]
    fn test_open_missing_interface_fails() {
        let mut hw = SocketCanHardware::new("ecucom-does-not-exist");
        assert!(hw.init(500_000).is_err());
    }
}
