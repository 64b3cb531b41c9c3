//! 通信栈运行指标
//!
//! 静默丢弃点（未映射的 CAN ID、未映射的 PDU ID）在这里计数。
//! 计数不改变丢弃行为：不返回错误，也不触碰任何缓冲区。

use std::sync::atomic::{AtomicU64, Ordering};

/// 通信栈实时指标
///
/// 计数器是原子的，可以通过 `Arc` 与监控线程共享，读取不需要锁。
///
/// # 使用示例
///
/// ```rust
/// use ecucom_stack::StackMetrics;
///
/// let metrics = StackMetrics::new();
/// metrics.record_rx_frame();
/// assert_eq!(metrics.snapshot().rx_frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct StackMetrics {
    /// 驱动交给接口层的总帧数
    pub rx_frames_total: AtomicU64,

    /// 接口层丢弃的帧数（CAN ID 不在 RX 表中）
    pub rx_unmapped_can_id: AtomicU64,

    /// 路由层丢弃的 PDU 数（PDU ID 不在路由表中）
    pub rx_unmapped_pdu_id: AtomicU64,

    /// 驱动接受的发送次数
    pub tx_frames_ok: AtomicU64,

    /// 驱动拒绝的发送次数（含可重试的 busy）
    pub tx_frames_failed: AtomicU64,

    /// 进入 bus-off 的次数
    pub bus_off_events: AtomicU64,
}

impl StackMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx_frame(&self) {
        self.rx_frames_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unmapped_can_id(&self) {
        self.rx_unmapped_can_id.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unmapped_pdu_id(&self) {
        self.rx_unmapped_pdu_id.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx(&self, ok: bool) {
        if ok {
            self.tx_frames_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tx_frames_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bus_off(&self) {
        self.bus_off_events.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            rx_unmapped_can_id: self.rx_unmapped_can_id.load(Ordering::Relaxed),
            rx_unmapped_pdu_id: self.rx_unmapped_pdu_id.load(Ordering::Relaxed),
            tx_frames_ok: self.tx_frames_ok.load(Ordering::Relaxed),
            tx_frames_failed: self.tx_frames_failed.load(Ordering::Relaxed),
            bus_off_events: self.bus_off_events.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.rx_frames_total.store(0, Ordering::Relaxed);
        self.rx_unmapped_can_id.store(0, Ordering::Relaxed);
        self.rx_unmapped_pdu_id.store(0, Ordering::Relaxed);
        self.tx_frames_ok.store(0, Ordering::Relaxed);
        self.tx_frames_failed.store(0, Ordering::Relaxed);
        self.bus_off_events.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变，用于读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub rx_unmapped_can_id: u64,
    pub rx_unmapped_pdu_id: u64,
    pub tx_frames_ok: u64,
    pub tx_frames_failed: u64,
    pub bus_off_events: u64,
}

impl MetricsSnapshot {
    /// 被丢弃的接收帧总数
    pub fn rx_discarded(&self) -> u64 {
        self.rx_unmapped_can_id + self.rx_unmapped_pdu_id
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rx={} (unmapped can={} pdu={}) tx_ok={} tx_failed={} bus_off={}",
            self.rx_frames_total,
            self.rx_unmapped_can_id,
            self.rx_unmapped_pdu_id,
            self.tx_frames_ok,
            self.tx_frames_failed,
            self.bus_off_events
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = StackMetrics::new();
        metrics.record_rx_frame();
        metrics.record_rx_frame();
        metrics.record_unmapped_can_id();
        metrics.record_unmapped_pdu_id();
        metrics.record_tx(true);
        metrics.record_tx(false);
        metrics.record_bus_off();

        let snap = metrics.snapshot();
        assert_eq!(snap.rx_frames_total, 2);
        assert_eq!(snap.rx_discarded(), 2);
        assert_eq!(snap.tx_frames_ok, 1);
        assert_eq!(snap.tx_frames_failed, 1);
        assert_eq!(snap.bus_off_events, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
