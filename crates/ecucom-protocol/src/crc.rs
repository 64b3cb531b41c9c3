//! CRC-8/SAE-J1850
//!
//! 多项式 0x1D，初值 0xFF，输出异或 0xFF，不反射。
//! 查表实现由 `crc` crate 提供，标准校验值 `CRC("123456789") = 0x4B`。

use crc::{CRC_8_SAE_J1850, Crc};

/// CRC-8/SAE-J1850 计算器（编译期生成查找表）
pub const CRC8_SAE_J1850: Crc<u8> = Crc::<u8>::new(&CRC_8_SAE_J1850);

/// CRC 默认初值
pub const CRC8_INIT: u8 = 0xFF;

/// CRC 输出异或值
pub const CRC8_XOR_OUT: u8 = 0xFF;

/// 计算 CRC-8/SAE-J1850
///
/// # 参数
///
/// - `data`: 参与计算的字节（可以为空）
/// - `start_value`: 初始 CRC 值（通常为 `0xFF`）
///
/// # 返回
///
/// 异或 `0xFF` 之后的 CRC 值
///
/// ```rust
/// use ecucom_protocol::calc_crc8;
///
/// assert_eq!(calc_crc8(b"123456789", 0xFF), 0x4B);
/// ```
pub fn calc_crc8(data: &[u8], start_value: u8) -> u8 {
    let mut digest = CRC8_SAE_J1850.digest_with_initial(start_value);
    digest.update(data);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_check_value() {
        assert_eq!(calc_crc8(b"123456789", CRC8_INIT), 0x4B);
    }

    #[test]
    fn test_empty_input_is_init_xor_out() {
        assert_eq!(calc_crc8(&[], CRC8_INIT), CRC8_INIT ^ CRC8_XOR_OUT);
        assert_eq!(calc_crc8(&[], 0x00), 0xFF);
    }

    #[test]
    fn test_single_zero_byte() {
        // 0xFF ^ 0x00 查表 = 0xC4，输出异或 0xFF
        assert_eq!(calc_crc8(&[0x00], CRC8_INIT), 0x3B);
    }

    #[test]
    fn test_start_value_changes_result() {
        let a = calc_crc8(&[0x12, 0x34], 0xFF);
        let b = calc_crc8(&[0x12, 0x34], 0x00);
        assert_ne!(a, b);
    }
}
