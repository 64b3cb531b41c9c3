//! 信号打包的属性测试

use ecucom_can::MockHardware;
use ecucom_stack::{
    CanIfRxRoute, CanIfTxRoute, ComConfig, ComSignalConfig, ComTxPduConfig, EcuStack, PduRConfig,
    PduRDestination, PduRRoute, SignalType, SignalValue, StackConfig,
};
use proptest::prelude::*;

/// 一个 U16 信号与一个 S16 信号放在给定的字节偏移上（互不重叠）
fn config(u16_byte: u8, s16_byte: u8) -> StackConfig {
    let mut config = StackConfig::default();
    config.canif.tx_routes.push(CanIfTxRoute {
        pdu_id: 0,
        can_id: 0x123,
        dlc: 8,
        hth: 0,
    });
    config.canif.rx_routes.push(CanIfRxRoute {
        can_id: 0x123,
        pdu_id: 0,
        dlc: 8,
        is_extended: false,
    });
    config.pdur = PduRConfig {
        routes: vec![PduRRoute {
            rx_pdu_id: 0,
            destination: PduRDestination::Com,
            upper_pdu_id: 0,
        }],
    };
    config.com = ComConfig {
        signals: vec![
            ComSignalConfig {
                signal_id: 0,
                bit_position: u16_byte * 8,
                bit_size: 16,
                signal_type: SignalType::U16,
                pdu_id: 0,
            },
            ComSignalConfig {
                signal_id: 1,
                bit_position: s16_byte * 8,
                bit_size: 16,
                signal_type: SignalType::S16,
                pdu_id: 0,
            },
        ],
        tx_pdus: vec![ComTxPduConfig {
            pdu_id: 0,
            dlc: 8,
            cycle_time_ms: 0,
        }],
        rx_pdus: Vec::new(),
    };
    config
}

proptest! {
    /// 两个实例经由总线交换信号：接收方读到的值与发送值相同，
    /// 且 16-bit 值在帧中按小端存放
    #[test]
    fn values_survive_the_bus(
        u16_byte in 0u8..=2,
        gap in 2u8..=4,
        a in any::<u16>(),
        b in any::<i16>(),
    ) {
        let s16_byte = u16_byte + gap;
        let cfg = config(u16_byte, s16_byte);
        let mut tx = EcuStack::new(MockHardware::new(), cfg.clone()).unwrap();
        let mut rx = EcuStack::new(MockHardware::new(), cfg).unwrap();
        tx.start().unwrap();
        rx.start().unwrap();

        tx.send_signal(0, a).unwrap();
        tx.send_signal(1, b).unwrap();
        prop_assert_eq!(tx.main_function_tx(), 1);

        let frames = tx.hardware_mut().take_sent();
        prop_assert_eq!(frames.len(), 1);
        let frame = frames[0];
        let lo = usize::from(u16_byte);
        prop_assert_eq!(&frame.data[lo..lo + 2], &a.to_le_bytes()[..]);

        rx.hardware_mut().queue_rx(frame);
        prop_assert_eq!(rx.main_function_read(), 1);
        prop_assert_eq!(rx.receive_signal(0).unwrap(), SignalValue::U16(a));
        prop_assert_eq!(rx.receive_signal(1).unwrap(), SignalValue::S16(b));
    }

    /// 任意长度的接收数据都不会越界，只有前 8 字节生效
    #[test]
    fn rx_of_any_length_is_bounded(data in proptest::collection::vec(any::<u8>(), 0..32)) {
        let mut ecu = EcuStack::new(MockHardware::new(), config(0, 4)).unwrap();
        ecu.start().unwrap();
        ecu.rx_indication(0x123, &data);

        let expected = if data.len() >= 2 {
            u16::from_le_bytes([data[0], data[1]])
        } else if data.len() == 1 {
            u16::from(data[0])
        } else {
            0
        };
        prop_assert_eq!(ecu.receive_signal(0).unwrap(), SignalValue::U16(expected));
    }
}
