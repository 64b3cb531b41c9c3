//! CAN 控制器驱动
//!
//! 与平台无关的驱动逻辑，硬件访问通过 [`CanHardware`] 抽象。
//!
//! # 状态机
//!
//! ```text
//! Uninit --init()--> Stopped --Started--> Started --Stopped--> Stopped
//! ```
//!
//! `Sleep` 只作为数据存在，没有任何转换可以到达。

use crate::{CAN_MAX_DLC, CanError, CanHardware, CanId, CanIndication};
use tracing::{debug, trace, warn};

/// 每次 `poll_receive` 最多处理的帧数（保护调用方的周期时间预算）
pub const CAN_MAX_RX_PER_CALL: usize = 16;

/// 错误被动阈值（TEC/REC）
const ERROR_PASSIVE_THRESHOLD: u8 = 128;

/// 控制器模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ControllerMode {
    /// 未初始化（默认）
    #[default]
    Uninit = 0,
    /// 已初始化，未参与总线通信
    Stopped = 1,
    /// 正常收发
    Started = 2,
    /// 睡眠（不可达）
    Sleep = 3,
}

/// 控制器错误状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerErrorState {
    Active,
    Passive,
    BusOff,
}

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CanDriverConfig {
    /// 波特率（bps），虚拟总线忽略
    pub baudrate: u32,
    /// 控制器索引
    pub controller_id: u8,
}

impl Default for CanDriverConfig {
    fn default() -> Self {
        Self {
            baudrate: 500_000,
            controller_id: 0,
        }
    }
}

/// 待发送的 CAN PDU
///
/// `sdu` 为 `None` 时只允许 `length == 0`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanPdu<'a> {
    /// CAN ID（11-bit 标准帧）
    pub id: CanId,
    /// 数据长度 0..8
    pub length: u8,
    /// 数据
    pub sdu: Option<&'a [u8]>,
}

impl<'a> CanPdu<'a> {
    /// 由数据切片构造，长度取切片长度
    pub fn new(id: CanId, data: &'a [u8]) -> Self {
        Self {
            id,
            length: u8::try_from(data.len()).unwrap_or(u8::MAX),
            sdu: Some(data),
        }
    }
}

/// CAN 控制器驱动
///
/// 每个实例拥有自己的硬件与状态，多个实例可以在同一进程中独立运行。
///
/// # 示例
///
/// ```rust
/// # #[cfg(feature = "mock")] {
/// use ecucom_can::{CanDriver, CanDriverConfig, CanPdu, ControllerMode, MockHardware};
///
/// let mut driver = CanDriver::new(MockHardware::new());
/// driver.init(&CanDriverConfig::default()).unwrap();
/// driver.set_controller_mode(ControllerMode::Started).unwrap();
///
/// driver.write(0, &CanPdu::new(0x100, &[1, 2, 3])).unwrap();
/// assert_eq!(driver.hardware().sent_frames().len(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct CanDriver<H> {
    hardware: H,
    mode: ControllerMode,
    controller_id: u8,
    bus_off_active: bool,
}

impl<H: CanHardware> CanDriver<H> {
    /// 创建未初始化的驱动
    pub fn new(hardware: H) -> Self {
        Self {
            hardware,
            mode: ControllerMode::Uninit,
            controller_id: 0,
            bus_off_active: false,
        }
    }

    /// 初始化驱动与硬件
    ///
    /// 硬件初始化失败时驱动保持 `Uninit`。
    pub fn init(&mut self, config: &CanDriverConfig) -> Result<(), CanError> {
        self.controller_id = config.controller_id;

        if let Err(e) = self.hardware.init(config.baudrate) {
            warn!(
                "CAN controller {} hardware init failed: {}",
                config.controller_id, e
            );
            self.mode = ControllerMode::Uninit;
            return Err(e);
        }

        self.bus_off_active = false;
        self.mode = ControllerMode::Stopped;
        debug!(
            "CAN controller {} initialized ({} bps)",
            self.controller_id, config.baudrate
        );
        Ok(())
    }

    /// 反初始化：停止硬件，回到 `Uninit`
    pub fn de_init(&mut self) {
        self.hardware.stop();
        self.mode = ControllerMode::Uninit;
        self.bus_off_active = false;
        debug!("CAN controller {} de-initialized", self.controller_id);
    }

    /// 请求模式切换（仅支持 Stopped <-> Started）
    ///
    /// # 错误
    ///
    /// - `CanError::Uninit`: 驱动未初始化
    /// - `CanError::InvalidTransition`: 不支持的转换，无副作用
    pub fn set_controller_mode(&mut self, mode: ControllerMode) -> Result<(), CanError> {
        match (self.mode, mode) {
            (ControllerMode::Uninit, _) => Err(CanError::Uninit),
            (ControllerMode::Stopped, ControllerMode::Started) => {
                self.hardware.start();
                self.mode = ControllerMode::Started;
                debug!("CAN controller {} -> Started", self.controller_id);
                Ok(())
            },
            (ControllerMode::Started, ControllerMode::Stopped) => {
                self.hardware.stop();
                self.mode = ControllerMode::Stopped;
                debug!("CAN controller {} -> Stopped", self.controller_id);
                Ok(())
            },
            (from, to) => Err(CanError::InvalidTransition { from, to }),
        }
    }

    /// 当前控制器模式
    pub fn controller_mode(&self) -> ControllerMode {
        self.mode
    }

    /// 控制器索引
    pub fn controller_id(&self) -> u8 {
        self.controller_id
    }

    /// 发送一帧
    ///
    /// 校验顺序：模式 → DLC → 数据 → 硬件发送。
    ///
    /// # 错误
    ///
    /// - `CanError::NotStarted` / `InvalidLength` / `MissingData`: 不可重试
    /// - `CanError::Busy`: 硬件拒绝发送，可重试
    pub fn write(&mut self, hth: u8, pdu: &CanPdu<'_>) -> Result<(), CanError> {
        if self.mode != ControllerMode::Started {
            return Err(CanError::NotStarted);
        }

        let length = usize::from(pdu.length);
        if length > CAN_MAX_DLC {
            return Err(CanError::InvalidLength(pdu.length));
        }

        let data = match pdu.sdu {
            Some(sdu) if sdu.len() >= length => &sdu[..length],
            _ if length > 0 => return Err(CanError::MissingData(pdu.length)),
            _ => &[][..],
        };

        self.hardware.transmit(pdu.id, data).map_err(|e| {
            trace!("HTH {} transmit of 0x{:03X} rejected: {}", hth, pdu.id, e);
            CanError::Busy
        })
    }

    /// 周期接收处理
    ///
    /// 仅在 `Started` 时生效；按接收顺序把帧交给上层，
    /// 单次最多 [`CAN_MAX_RX_PER_CALL`] 帧，硬件无更多帧时提前结束。
    ///
    /// # 返回
    ///
    /// 本次处理的帧数
    pub fn poll_receive(&mut self, upper: &mut impl CanIndication) -> usize {
        if self.mode != ControllerMode::Started {
            return 0;
        }

        let mut count = 0;
        while count < CAN_MAX_RX_PER_CALL {
            let Some(frame) = self.hardware.receive() else {
                break;
            };
            upper.rx_indication(frame.id, frame.data_slice());
            count += 1;
        }
        count
    }

    /// 周期 bus-off 检测（边沿触发）
    ///
    /// 进入 bus-off 时通知上层一次；离开时只清除内部锁存，不发通知。
    /// 驱动本身不改变控制器模式，恢复策略由外部决定。
    pub fn poll_bus_off(&mut self, upper: &mut impl CanIndication) {
        if self.mode != ControllerMode::Started {
            return;
        }

        if self.hardware.is_bus_off() {
            if !self.bus_off_active {
                self.bus_off_active = true;
                warn!("CAN controller {} entered bus-off", self.controller_id);
                upper.controller_bus_off(self.controller_id);
            }
        } else if self.bus_off_active {
            self.bus_off_active = false;
            debug!("CAN controller {} left bus-off", self.controller_id);
        }
    }

    /// bus-off 锁存状态
    pub fn is_bus_off_latched(&self) -> bool {
        self.bus_off_active
    }

    /// 读取 (TEC, REC) 错误计数器
    pub fn error_counters(&self) -> (u8, u8) {
        self.hardware.error_counters()
    }

    /// 控制器错误状态
    ///
    /// 硬件报告 bus-off 为 `BusOff`；TEC 或 REC >= 128 为 `Passive`；否则 `Active`。
    pub fn controller_error_state(&self) -> ControllerErrorState {
        if self.hardware.is_bus_off() {
            return ControllerErrorState::BusOff;
        }
        let (tec, rec) = self.hardware.error_counters();
        if tec >= ERROR_PASSIVE_THRESHOLD || rec >= ERROR_PASSIVE_THRESHOLD {
            ControllerErrorState::Passive
        } else {
            ControllerErrorState::Active
        }
    }

    /// 获取硬件引用
    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    /// 获取硬件可变引用
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CanFrame, MockHardware};

    #[derive(Default)]
    struct Recorder {
        rx: Vec<(CanId, Vec<u8>)>,
        bus_off: Vec<u8>,
    }

    impl CanIndication for Recorder {
        fn rx_indication(&mut self, can_id: CanId, sdu: &[u8]) {
            self.rx.push((can_id, sdu.to_vec()));
        }

        fn controller_bus_off(&mut self, controller_id: u8) {
            self.bus_off.push(controller_id);
        }
    }

    fn started() -> CanDriver<MockHardware> {
        let mut driver = CanDriver::new(MockHardware::new());
        driver.init(&CanDriverConfig::default()).unwrap();
        driver.set_controller_mode(ControllerMode::Started).unwrap();
        driver
    }

    #[test]
    fn test_init_moves_to_stopped() {
        let mut driver = CanDriver::new(MockHardware::new());
        assert_eq!(driver.controller_mode(), ControllerMode::Uninit);

        driver.init(&CanDriverConfig::default()).unwrap();
        assert_eq!(driver.controller_mode(), ControllerMode::Stopped);
        assert_eq!(driver.hardware().init_calls(), 1);
    }

    #[test]
    fn test_init_failure_stays_uninit() {
        let mut hw = MockHardware::new();
        hw.set_init_fails(true);
        let mut driver = CanDriver::new(hw);

        assert!(driver.init(&CanDriverConfig::default()).is_err());
        assert_eq!(driver.controller_mode(), ControllerMode::Uninit);
    }

    #[test]
    fn test_mode_request_while_uninit() {
        let mut driver = CanDriver::new(MockHardware::new());
        assert_eq!(
            driver.set_controller_mode(ControllerMode::Started),
            Err(CanError::Uninit)
        );
        assert_eq!(driver.controller_mode(), ControllerMode::Uninit);
        assert_eq!(driver.hardware().start_calls(), 0);
    }

    #[test]
    fn test_mode_transitions() {
        let mut driver = CanDriver::new(MockHardware::new());
        driver.init(&CanDriverConfig::default()).unwrap();

        // Stopped -> Stopped 不支持
        assert!(matches!(
            driver.set_controller_mode(ControllerMode::Stopped),
            Err(CanError::InvalidTransition { .. })
        ));

        driver.set_controller_mode(ControllerMode::Started).unwrap();
        assert_eq!(driver.controller_mode(), ControllerMode::Started);
        assert!(driver.hardware().is_started());

        // Started -> Started / Sleep 不支持
        assert!(driver.set_controller_mode(ControllerMode::Started).is_err());
        assert!(driver.set_controller_mode(ControllerMode::Sleep).is_err());
        assert_eq!(driver.controller_mode(), ControllerMode::Started);

        driver.set_controller_mode(ControllerMode::Stopped).unwrap();
        assert_eq!(driver.controller_mode(), ControllerMode::Stopped);
        assert!(!driver.hardware().is_started());
    }

    #[test]
    fn test_de_init() {
        let mut driver = started();
        driver.de_init();
        assert_eq!(driver.controller_mode(), ControllerMode::Uninit);
        assert!(!driver.hardware().is_started());
    }

    #[test]
    fn test_write_requires_started() {
        let mut driver = CanDriver::new(MockHardware::new());
        driver.init(&CanDriverConfig::default()).unwrap();

        let pdu = CanPdu::new(0x100, &[1, 2]);
        assert_eq!(driver.write(0, &pdu), Err(CanError::NotStarted));
        assert!(driver.hardware().sent_frames().is_empty());
    }

    #[test]
    fn test_write_validation() {
        let mut driver = started();

        let too_long = [0u8; 9];
        assert_eq!(
            driver.write(0, &CanPdu::new(0x100, &too_long)),
            Err(CanError::InvalidLength(9))
        );

        let missing = CanPdu {
            id: 0x100,
            length: 4,
            sdu: None,
        };
        assert_eq!(driver.write(0, &missing), Err(CanError::MissingData(4)));

        let short = CanPdu {
            id: 0x100,
            length: 4,
            sdu: Some(&[1, 2]),
        };
        assert_eq!(driver.write(0, &short), Err(CanError::MissingData(4)));

        let empty = CanPdu {
            id: 0x100,
            length: 0,
            sdu: None,
        };
        assert_eq!(driver.write(0, &empty), Ok(()));
        assert_eq!(driver.hardware().sent_frames().len(), 1);
    }

    #[test]
    fn test_write_busy_is_retryable() {
        let mut driver = started();
        driver.hardware_mut().set_tx_busy(true);

        let err = driver.write(0, &CanPdu::new(0x100, &[1])).unwrap_err();
        assert_eq!(err, CanError::Busy);
        assert!(err.is_retryable());

        driver.hardware_mut().set_tx_busy(false);
        driver.write(0, &CanPdu::new(0x100, &[1])).unwrap();
        assert_eq!(driver.hardware().sent_frames()[0].data_slice(), &[1]);
    }

    #[test]
    fn test_poll_receive_only_when_started() {
        let mut driver = CanDriver::new(MockHardware::new());
        driver.init(&CanDriverConfig::default()).unwrap();
        driver
            .hardware_mut()
            .queue_rx(CanFrame::new_standard(0x200, &[9]));

        let mut upper = Recorder::default();
        assert_eq!(driver.poll_receive(&mut upper), 0);
        assert!(upper.rx.is_empty());
        assert_eq!(driver.hardware().pending_rx(), 1);
    }

    #[test]
    fn test_poll_receive_in_order_and_bounded() {
        let mut driver = started();
        for i in 0..20u16 {
            driver
                .hardware_mut()
                .queue_rx(CanFrame::new_standard(0x200 + i, &[i as u8]));
        }

        let mut upper = Recorder::default();
        assert_eq!(driver.poll_receive(&mut upper), CAN_MAX_RX_PER_CALL);
        assert_eq!(upper.rx.len(), CAN_MAX_RX_PER_CALL);
        assert_eq!(upper.rx[0], (0x200, vec![0]));
        assert_eq!(upper.rx[15], (0x20F, vec![15]));

        assert_eq!(driver.poll_receive(&mut upper), 4);
        assert_eq!(upper.rx[19], (0x213, vec![19]));
        assert_eq!(driver.poll_receive(&mut upper), 0);
    }

    #[test]
    fn test_bus_off_edge_triggered() {
        let mut driver = started();
        let mut upper = Recorder::default();

        driver.hardware_mut().set_bus_off(true);
        driver.poll_bus_off(&mut upper);
        driver.poll_bus_off(&mut upper);
        assert_eq!(upper.bus_off, vec![0]);
        assert!(driver.is_bus_off_latched());

        // 离开 bus-off：静默清除
        driver.hardware_mut().set_bus_off(false);
        driver.poll_bus_off(&mut upper);
        assert_eq!(upper.bus_off.len(), 1);
        assert!(!driver.is_bus_off_latched());

        // 再次进入：第二次通知
        driver.hardware_mut().set_bus_off(true);
        driver.poll_bus_off(&mut upper);
        assert_eq!(upper.bus_off.len(), 2);

        // 驱动不自行改变模式
        assert_eq!(driver.controller_mode(), ControllerMode::Started);
    }

    #[test]
    fn test_bus_off_ignored_when_stopped() {
        let mut driver = CanDriver::new(MockHardware::new());
        driver.init(&CanDriverConfig::default()).unwrap();
        driver.hardware_mut().set_bus_off(true);

        let mut upper = Recorder::default();
        driver.poll_bus_off(&mut upper);
        assert!(upper.bus_off.is_empty());
    }

    #[test]
    fn test_controller_error_state() {
        let mut driver = started();
        assert_eq!(driver.controller_error_state(), ControllerErrorState::Active);

        driver.hardware_mut().set_error_counters(130, 5);
        assert_eq!(driver.error_counters(), (130, 5));
        assert_eq!(driver.controller_error_state(), ControllerErrorState::Passive);

        driver.hardware_mut().set_bus_off(true);
        assert_eq!(driver.controller_error_state(), ControllerErrorState::BusOff);
    }
}
