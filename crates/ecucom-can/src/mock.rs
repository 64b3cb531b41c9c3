//! Mock 硬件（用于测试与仿真）
//!
//! 内存中的 CAN 控制器：发送的帧被记录下来，接收队列由测试注入。
//! bus-off、发送忙、初始化失败与错误计数器都可以手动设置。

use crate::{CAN_MAX_DLC, CanError, CanFrame, CanHardware, CanId};
use std::collections::VecDeque;

/// Mock CAN 硬件
#[derive(Debug, Default)]
pub struct MockHardware {
    rx_queue: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
    started: bool,
    bus_off: bool,
    tx_busy: bool,
    init_fails: bool,
    tec: u8,
    rec: u8,
    init_calls: usize,
    start_calls: usize,
    stop_calls: usize,
}

impl MockHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入一帧到接收队列末尾
    pub fn queue_rx(&mut self, frame: CanFrame) {
        self.rx_queue.push_back(frame);
    }

    /// 接收队列中剩余的帧数
    pub fn pending_rx(&self) -> usize {
        self.rx_queue.len()
    }

    /// 已发送的帧（按发送顺序）
    pub fn sent_frames(&self) -> &[CanFrame] {
        &self.sent
    }

    /// 取出并清空已发送的帧
    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.sent)
    }

    /// 把已发送的帧回环到接收队列（模拟 vcan 回环）
    pub fn loopback(&mut self) {
        let sent = self.take_sent();
        self.rx_queue.extend(sent);
    }

    pub fn set_bus_off(&mut self, bus_off: bool) {
        self.bus_off = bus_off;
    }

    /// 设置后 `transmit` 返回硬件错误
    pub fn set_tx_busy(&mut self, busy: bool) {
        self.tx_busy = busy;
    }

    /// 设置后 `init` 返回硬件错误
    pub fn set_init_fails(&mut self, fails: bool) {
        self.init_fails = fails;
    }

    pub fn set_error_counters(&mut self, tec: u8, rec: u8) {
        self.tec = tec;
        self.rec = rec;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls
    }
}

impl CanHardware for MockHardware {
    fn init(&mut self, _baudrate: u32) -> Result<(), CanError> {
        self.init_calls += 1;
        if self.init_fails {
            return Err(CanError::Hardware("mock init failure".to_string()));
        }
        self.started = false;
        Ok(())
    }

    fn start(&mut self) {
        self.start_calls += 1;
        self.started = true;
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
        self.started = false;
    }

    fn transmit(&mut self, id: CanId, data: &[u8]) -> Result<(), CanError> {
        if self.tx_busy {
            return Err(CanError::Hardware("mock mailbox full".to_string()));
        }
        if data.len() > CAN_MAX_DLC {
            return Err(CanError::InvalidLength(data.len() as u8));
        }
        // 与真实控制器一致：只保留 11-bit ID
        self.sent.push(CanFrame::new_standard(id as u16, data));
        Ok(())
    }

    fn receive(&mut self) -> Option<CanFrame> {
        self.rx_queue.pop_front()
    }

    fn is_bus_off(&self) -> bool {
        self.bus_off
    }

    fn error_counters(&self) -> (u8, u8) {
        (self.tec, self.rec)
    }
}
