//! 单个 ECU 的通信栈上下文
//!
//! [`EcuStack`] 拥有驱动、接口层、路由层、信号服务以及诊断服务入口。
//! 层与层之间的回调通过借用不相交的字段实现，不需要全局状态或内部锁。

use crate::{
    CanIf, Com, ComPduState, PduIndication, PduR, PduTransmit, SignalValue, StackConfig,
    StackError, StackMetrics,
};
use ecucom_can::{
    CanDriver, CanHardware, CanIndication, ControllerErrorState, ControllerMode,
};
use ecucom_protocol::{CanId, PduId, SignalId};
use std::sync::Arc;
use tracing::debug;

/// 单个 ECU 的通信栈
///
/// `H` 为硬件后端，`D` 为诊断服务的接收入口（默认 `()` 丢弃诊断 PDU）。
///
/// # 示例
///
/// ```rust
/// use ecucom_can::MockHardware;
/// use ecucom_stack::{EcuStack, StackConfig};
///
/// let config = StackConfig::from_toml_str(r#"
/// [[canif.tx_routes]]
/// pdu_id = 0
/// can_id = 0x100
/// dlc = 8
///
/// [[com.signals]]
/// signal_id = 0
/// bit_position = 16
/// bit_size = 8
/// type = "u8"
/// pdu_id = 0
///
/// [[com.tx_pdus]]
/// pdu_id = 0
/// dlc = 8
/// "#).unwrap();
///
/// let mut ecu = EcuStack::new(MockHardware::new(), config).unwrap();
/// ecu.start().unwrap();
/// ecu.send_signal(0, 128u8).unwrap();
/// assert_eq!(ecu.main_function_tx(), 1);
/// assert_eq!(ecu.hardware().sent_frames()[0].data[2], 128);
/// ```
#[derive(Debug)]
pub struct EcuStack<H, D = ()> {
    name: String,
    driver: CanDriver<H>,
    canif: CanIf,
    pdur: PduR,
    com: Com,
    dcm: D,
    metrics: Arc<StackMetrics>,
    bus_off_pending: bool,
}

impl<H: CanHardware> EcuStack<H, ()> {
    /// 创建不接诊断服务的通信栈
    pub fn new(hardware: H, config: StackConfig) -> Result<Self, StackError> {
        Self::with_dcm(hardware, (), config)
    }
}

impl<H: CanHardware, D: PduIndication> EcuStack<H, D> {
    /// 校验配置、初始化驱动与各层
    ///
    /// 配置非法时不触碰硬件；硬件初始化失败返回 `StackError::Can`。
    /// 成功后控制器处于 `Stopped`，需要调用 [`EcuStack::start`]。
    pub fn with_dcm(hardware: H, dcm: D, config: StackConfig) -> Result<Self, StackError> {
        config.validate()?;

        let StackConfig {
            name,
            driver: driver_config,
            canif: canif_config,
            pdur: pdur_config,
            com: com_config,
            ..
        } = config;

        let mut canif = CanIf::new();
        canif.init(canif_config)?;
        let mut pdur = PduR::new();
        pdur.init(pdur_config)?;
        let mut com = Com::new();
        com.init(com_config)?;

        let mut driver = CanDriver::new(hardware);
        driver.init(&driver_config)?;

        debug!("ECU stack '{}' initialized", name);
        Ok(Self {
            name,
            driver,
            canif,
            pdur,
            com,
            dcm,
            metrics: Arc::new(StackMetrics::new()),
            bus_off_pending: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 控制器切到 `Started`
    pub fn start(&mut self) -> Result<(), StackError> {
        self.set_controller_mode(ControllerMode::Started)
    }

    /// 控制器切到 `Stopped`
    pub fn stop(&mut self) -> Result<(), StackError> {
        self.set_controller_mode(ControllerMode::Stopped)
    }

    pub fn set_controller_mode(&mut self, mode: ControllerMode) -> Result<(), StackError> {
        self.driver.set_controller_mode(mode)?;
        Ok(())
    }

    pub fn controller_mode(&self) -> ControllerMode {
        self.driver.controller_mode()
    }

    pub fn controller_error_state(&self) -> ControllerErrorState {
        self.driver.controller_error_state()
    }

    /// 周期接收：驱动 → 接口层 → 路由层 → 信号服务 / 诊断服务
    ///
    /// # 返回
    ///
    /// 本次从硬件取出的帧数
    pub fn main_function_read(&mut self) -> usize {
        let (driver, mut upper) = self.split_rx();
        driver.poll_receive(&mut upper)
    }

    /// 周期 bus-off 检测
    ///
    /// 进入 bus-off 时记一次指标，并置位通知标志（见 [`EcuStack::take_bus_off_notification`]）。
    pub fn main_function_bus_off(&mut self) {
        let (driver, mut upper) = self.split_rx();
        driver.poll_bus_off(&mut upper);
    }

    /// 周期发送：把所有 `Pending` 的 PDU 交给路由层
    ///
    /// # 返回
    ///
    /// 本次成功发送的 PDU 数
    pub fn main_function_tx(&mut self) -> usize {
        let mut router = RouterTx {
            pdur: &self.pdur,
            lower: CanIfTx {
                canif: &self.canif,
                driver: &mut self.driver,
                metrics: &self.metrics,
            },
        };
        self.com.main_function_tx(&mut router)
    }

    /// 接口层接收入口：按收到一帧处理
    pub fn rx_indication(&mut self, can_id: CanId, sdu: &[u8]) {
        let (_, mut upper) = self.split_rx();
        upper.rx_indication(can_id, sdu);
    }

    pub fn send_signal(
        &mut self,
        signal_id: SignalId,
        value: impl Into<SignalValue>,
    ) -> Result<(), StackError> {
        self.com.send_signal(signal_id, value)
    }

    pub fn receive_signal(&self, signal_id: SignalId) -> Result<SignalValue, StackError> {
        self.com.receive_signal(signal_id)
    }

    pub fn pdu_state(&self, pdu_id: PduId) -> Option<ComPduState> {
        self.com.pdu_state(pdu_id)
    }

    /// 经路由层立即发送一个 PDU（不经过信号服务）
    pub fn transmit(&mut self, pdu_id: PduId, sdu: &[u8]) -> Result<(), StackError> {
        let mut lower = CanIfTx {
            canif: &self.canif,
            driver: &mut self.driver,
            metrics: &self.metrics,
        };
        self.pdur.transmit(pdu_id, sdu, &mut lower)
    }

    /// 诊断服务的发送路径
    pub fn dcm_transmit(&mut self, pdu_id: PduId, sdu: &[u8]) -> Result<(), StackError> {
        let mut lower = CanIfTx {
            canif: &self.canif,
            driver: &mut self.driver,
            metrics: &self.metrics,
        };
        self.pdur.dcm_transmit(pdu_id, sdu, &mut lower)
    }

    /// 取出并清除 bus-off 通知标志
    ///
    /// 恢复策略由调用方决定，通信栈本身不切换控制器模式。
    pub fn take_bus_off_notification(&mut self) -> bool {
        std::mem::take(&mut self.bus_off_pending)
    }

    /// 指标（可与监控线程共享）
    pub fn metrics(&self) -> &Arc<StackMetrics> {
        &self.metrics
    }

    pub fn hardware(&self) -> &H {
        self.driver.hardware()
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        self.driver.hardware_mut()
    }

    pub fn dcm(&self) -> &D {
        &self.dcm
    }

    pub fn dcm_mut(&mut self) -> &mut D {
        &mut self.dcm
    }

    fn split_rx(&mut self) -> (&mut CanDriver<H>, RxPath<'_, D>) {
        (
            &mut self.driver,
            RxPath {
                canif: &self.canif,
                router: RouterRx {
                    pdur: &self.pdur,
                    com: &mut self.com,
                    dcm: &mut self.dcm,
                    metrics: &self.metrics,
                },
                bus_off_pending: &mut self.bus_off_pending,
            },
        )
    }
}

/// 驱动 → 接口层
struct RxPath<'a, D> {
    canif: &'a CanIf,
    router: RouterRx<'a, D>,
    bus_off_pending: &'a mut bool,
}

impl<D: PduIndication> CanIndication for RxPath<'_, D> {
    fn rx_indication(&mut self, can_id: CanId, sdu: &[u8]) {
        self.router.metrics.record_rx_frame();
        if !self.canif.rx_indication(can_id, sdu, &mut self.router) {
            self.router.metrics.record_unmapped_can_id();
        }
    }

    fn controller_bus_off(&mut self, controller_id: u8) {
        debug!("bus-off reported by controller {}", controller_id);
        self.router.metrics.record_bus_off();
        *self.bus_off_pending = true;
    }
}

/// 接口层 → 路由层
struct RouterRx<'a, D> {
    pdur: &'a PduR,
    com: &'a mut Com,
    dcm: &'a mut D,
    metrics: &'a StackMetrics,
}

impl<D: PduIndication> PduIndication for RouterRx<'_, D> {
    fn rx_indication(&mut self, pdu_id: PduId, sdu: &[u8]) {
        if !self
            .pdur
            .rx_indication(pdu_id, sdu, &mut *self.com, &mut *self.dcm)
        {
            self.metrics.record_unmapped_pdu_id();
        }
    }
}

/// 信号服务 → 路由层
struct RouterTx<'a, H> {
    pdur: &'a PduR,
    lower: CanIfTx<'a, H>,
}

impl<H: CanHardware> PduTransmit for RouterTx<'_, H> {
    fn transmit(&mut self, pdu_id: PduId, sdu: &[u8]) -> Result<(), StackError> {
        self.pdur.transmit(pdu_id, sdu, &mut self.lower)
    }
}

/// 路由层 → 接口层 → 驱动
struct CanIfTx<'a, H> {
    canif: &'a CanIf,
    driver: &'a mut CanDriver<H>,
    metrics: &'a StackMetrics,
}

impl<H: CanHardware> PduTransmit for CanIfTx<'_, H> {
    fn transmit(&mut self, pdu_id: PduId, sdu: &[u8]) -> Result<(), StackError> {
        let result = self.canif.transmit(&mut *self.driver, pdu_id, sdu);
        match &result {
            Ok(()) => self.metrics.record_tx(true),
            Err(StackError::TransmitFailed { .. }) => self.metrics.record_tx(false),
            Err(_) => {},
        }
        result
    }
}
