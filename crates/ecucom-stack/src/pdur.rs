//! PDU 路由层（PduR）
//!
//! 把接口层收到的 PDU 分发给信号服务或诊断服务；
//! 发送方向是到接口层的同步直通，不做缓冲。

use crate::{PduIndication, PduTransmit, StackError};
use ecucom_protocol::PduId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::trace;

/// 路由目的地
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PduRDestination {
    /// 信号服务
    Com,
    /// 诊断服务
    Dcm,
}

/// 路由表条目：一个源 PDU ID 对应一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PduRRoute {
    /// 接口层 PDU ID
    pub rx_pdu_id: PduId,
    pub destination: PduRDestination,
    /// 目的模块内的 PDU ID
    pub upper_pdu_id: PduId,
}

/// 路由层配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PduRConfig {
    pub routes: Vec<PduRRoute>,
}

impl PduRConfig {
    /// 校验每个源 PDU ID 只出现一次
    pub fn validate(&self) -> Result<(), StackError> {
        let mut seen = HashSet::new();
        for route in &self.routes {
            if !seen.insert(route.rx_pdu_id) {
                return Err(StackError::InvalidConfig(format!(
                    "duplicate PduR route for PDU {}",
                    route.rx_pdu_id
                )));
            }
        }
        Ok(())
    }
}

/// PDU 路由层
#[derive(Debug, Default)]
pub struct PduR {
    config: Option<PduRConfig>,
}

impl PduR {
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验并装载配置
    pub fn init(&mut self, config: PduRConfig) -> Result<(), StackError> {
        config.validate()?;
        self.config = Some(config);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    /// 接收分发
    ///
    /// 按路由表把 PDU 同步转发给 `com` 或 `dcm`。
    ///
    /// # 返回
    ///
    /// 已转发返回 `true`；未初始化或 PDU ID 未映射返回 `false`（静默丢弃）
    pub fn rx_indication(
        &self,
        pdu_id: PduId,
        sdu: &[u8],
        com: &mut impl PduIndication,
        dcm: &mut impl PduIndication,
    ) -> bool {
        let Some(config) = self.config.as_ref() else {
            return false;
        };

        let Some(route) = config.routes.iter().find(|r| r.rx_pdu_id == pdu_id) else {
            trace!("PduR: discarding unmapped PDU {}", pdu_id);
            return false;
        };

        match route.destination {
            PduRDestination::Com => com.rx_indication(route.upper_pdu_id, sdu),
            PduRDestination::Dcm => dcm.rx_indication(route.upper_pdu_id, sdu),
        }
        true
    }

    /// 发送直通到接口层
    pub fn transmit(
        &self,
        pdu_id: PduId,
        sdu: &[u8],
        lower: &mut impl PduTransmit,
    ) -> Result<(), StackError> {
        if self.config.is_none() {
            return Err(StackError::NotInitialized("PduR"));
        }
        lower.transmit(pdu_id, sdu)
    }

    /// 诊断服务发送路径，与 [`PduR::transmit`] 相同
    pub fn dcm_transmit(
        &self,
        pdu_id: PduId,
        sdu: &[u8],
        lower: &mut impl PduTransmit,
    ) -> Result<(), StackError> {
        self.transmit(pdu_id, sdu, lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sink(Vec<(PduId, Vec<u8>)>);

    impl PduIndication for Sink {
        fn rx_indication(&mut self, pdu_id: PduId, sdu: &[u8]) {
            self.0.push((pdu_id, sdu.to_vec()));
        }
    }

    impl PduTransmit for Sink {
        fn transmit(&mut self, pdu_id: PduId, sdu: &[u8]) -> Result<(), StackError> {
            self.0.push((pdu_id, sdu.to_vec()));
            Ok(())
        }
    }

    fn pdur() -> PduR {
        let mut pdur = PduR::new();
        pdur.init(PduRConfig {
            routes: vec![
                PduRRoute {
                    rx_pdu_id: 0,
                    destination: PduRDestination::Com,
                    upper_pdu_id: 3,
                },
                PduRRoute {
                    rx_pdu_id: 1,
                    destination: PduRDestination::Dcm,
                    upper_pdu_id: 0,
                },
            ],
        })
        .unwrap();
        pdur
    }

    #[test]
    fn test_rx_fan_out() {
        let pdur = pdur();
        let mut com = Sink::default();
        let mut dcm = Sink::default();

        assert!(pdur.rx_indication(0, &[1], &mut com, &mut dcm));
        assert!(pdur.rx_indication(1, &[2], &mut com, &mut dcm));
        assert!(!pdur.rx_indication(5, &[3], &mut com, &mut dcm));

        assert_eq!(com.0, vec![(3, vec![1])]);
        assert_eq!(dcm.0, vec![(0, vec![2])]);
    }

    #[test]
    fn test_transmit_pass_through() {
        let pdur = pdur();
        let mut lower = Sink::default();

        pdur.transmit(2, &[9, 9], &mut lower).unwrap();
        pdur.dcm_transmit(4, &[7], &mut lower).unwrap();
        assert_eq!(lower.0, vec![(2, vec![9, 9]), (4, vec![7])]);
    }

    #[test]
    fn test_uninitialized() {
        let pdur = PduR::new();
        let mut sink = Sink::default();
        let mut other = Sink::default();

        assert_eq!(
            pdur.transmit(0, &[1], &mut sink),
            Err(StackError::NotInitialized("PduR"))
        );
        assert!(!pdur.rx_indication(0, &[1], &mut sink, &mut other));
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let route = PduRRoute {
            rx_pdu_id: 0,
            destination: PduRDestination::Com,
            upper_pdu_id: 0,
        };
        let config = PduRConfig {
            routes: vec![route.clone(), route],
        };
        assert!(PduR::new().init(config).is_err());
    }
}
