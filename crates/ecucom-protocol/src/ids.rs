//! 标识符类型与协议常量

/// CAN 标识符（仅使用低 11 位）
pub type CanId = u32;

/// 逻辑 PDU 标识符（各层独立编号）
pub type PduId = u16;

/// 应用信号标识符
pub type SignalId = u8;

/// CAN 2.0B 最大数据长度
pub const CAN_MAX_DLC: usize = 8;

/// 11-bit 标准帧 ID 掩码
pub const CAN_STANDARD_ID_MASK: CanId = 0x7FF;

/// 判断 ID 是否为合法的 11-bit 标准帧 ID
pub fn is_standard_id(id: CanId) -> bool {
    id <= CAN_STANDARD_ID_MASK
}
