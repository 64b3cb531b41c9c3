//! CAN 接口层（CanIf）
//!
//! 在硬件寻址（CAN ID）与逻辑 PDU ID 之间做双向映射：
//! - TX：PDU ID → CAN ID / DLC / HTH，委托给驱动的 `write`
//! - RX：CAN ID → PDU ID，转发给路由层；未映射的 CAN ID 静默丢弃

use crate::{PduIndication, StackError};
use ecucom_can::{CanDriver, CanHardware, CanPdu};
use ecucom_protocol::{CAN_MAX_DLC, CanId, PduId, is_standard_id};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::trace;

/// TX 路由：一个 PDU ID 对应一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanIfTxRoute {
    pub pdu_id: PduId,
    pub can_id: CanId,
    pub dlc: u8,
    /// 硬件发送句柄
    #[serde(default)]
    pub hth: u8,
}

/// RX 路由：一个 CAN ID 对应一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanIfRxRoute {
    pub can_id: CanId,
    /// 上层（路由层）PDU ID
    pub pdu_id: PduId,
    pub dlc: u8,
    /// 保留字段，不参与匹配
    #[serde(default)]
    pub is_extended: bool,
}

/// 接口层配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanIfConfig {
    pub tx_routes: Vec<CanIfTxRoute>,
    pub rx_routes: Vec<CanIfRxRoute>,
}

impl CanIfConfig {
    /// 校验路由表
    ///
    /// - 每个 PDU ID 最多一条 TX 路由，每个 CAN ID 最多一条 RX 路由
    /// - CAN ID 必须是 11-bit 标准 ID，DLC <= 8
    pub fn validate(&self) -> Result<(), StackError> {
        let mut tx_pdus = HashSet::new();
        for route in &self.tx_routes {
            if !tx_pdus.insert(route.pdu_id) {
                return Err(StackError::InvalidConfig(format!(
                    "duplicate CanIf TX route for PDU {}",
                    route.pdu_id
                )));
            }
            check_frame(route.can_id, route.dlc)?;
        }

        let mut rx_ids = HashSet::new();
        for route in &self.rx_routes {
            if !rx_ids.insert(route.can_id) {
                return Err(StackError::InvalidConfig(format!(
                    "duplicate CanIf RX route for CAN id 0x{:03X}",
                    route.can_id
                )));
            }
            check_frame(route.can_id, route.dlc)?;
        }

        Ok(())
    }

    fn tx_route(&self, pdu_id: PduId) -> Option<&CanIfTxRoute> {
        self.tx_routes.iter().find(|r| r.pdu_id == pdu_id)
    }

    fn rx_route(&self, can_id: CanId) -> Option<&CanIfRxRoute> {
        self.rx_routes.iter().find(|r| r.can_id == can_id)
    }
}

fn check_frame(can_id: CanId, dlc: u8) -> Result<(), StackError> {
    if !is_standard_id(can_id) {
        return Err(StackError::InvalidConfig(format!(
            "CAN id 0x{:X} is not an 11-bit standard id",
            can_id
        )));
    }
    if usize::from(dlc) > CAN_MAX_DLC {
        return Err(StackError::InvalidConfig(format!(
            "DLC {} for CAN id 0x{:03X} exceeds {}",
            dlc, can_id, CAN_MAX_DLC
        )));
    }
    Ok(())
}

/// CAN 接口层
#[derive(Debug, Default)]
pub struct CanIf {
    config: Option<CanIfConfig>,
}

impl CanIf {
    /// 创建未初始化的接口层，所有操作返回 `NotInitialized` / 丢弃
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验并装载配置
    pub fn init(&mut self, config: CanIfConfig) -> Result<(), StackError> {
        config.validate()?;
        self.config = Some(config);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    /// 发送一个 PDU
    ///
    /// 驱动的两类失败（校验失败、硬件忙）在这里合并为
    /// [`StackError::TransmitFailed`]，由上层做粗粒度重试。
    ///
    /// # 错误
    ///
    /// - `StackError::NotInitialized`: 未装载配置
    /// - `StackError::UnknownPdu`: PDU ID 不在 TX 表中（不调用驱动）
    /// - `StackError::TransmitFailed`: 驱动拒绝
    pub fn transmit<H: CanHardware>(
        &self,
        driver: &mut CanDriver<H>,
        pdu_id: PduId,
        sdu: &[u8],
    ) -> Result<(), StackError> {
        let config = self.config.as_ref().ok_or(StackError::NotInitialized("CanIf"))?;
        let route = config.tx_route(pdu_id).ok_or(StackError::UnknownPdu(pdu_id))?;

        driver
            .write(route.hth, &CanPdu::new(route.can_id, sdu))
            .map_err(|e| StackError::transmit_failed(pdu_id, e))
    }

    /// 接收指示
    ///
    /// # 返回
    ///
    /// 帧被转发给路由层时返回 `true`；未初始化或 CAN ID 未映射时返回 `false`（静默丢弃）
    pub fn rx_indication(
        &self,
        can_id: CanId,
        sdu: &[u8],
        router: &mut impl PduIndication,
    ) -> bool {
        let Some(config) = self.config.as_ref() else {
            return false;
        };

        match config.rx_route(can_id) {
            Some(route) => {
                router.rx_indication(route.pdu_id, sdu);
                true
            },
            None => {
                trace!("CanIf: discarding frame with unmapped CAN id 0x{:03X}", can_id);
                false
            },
        }
    }
}
