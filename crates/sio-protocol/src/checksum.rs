//! SIO 校验和
//!
//! SIO 帧的校验和是逐字节累加、并把进位回卷到最低位的 8 位和
//! （end-around carry，即反码加法）：
//!
//! ```text
//! sum := sum + byte
//! if sum >= 256 { sum := (sum & 0xFF) + 1 }
//! ```

/// 增量校验和累加器
///
/// 帧装配器逐字节接收数据，使用增量累加可以避免在收到校验字节时
/// 重新遍历整个缓冲区。
///
/// # 示例
///
/// ```
/// use sio_protocol::{Checksum, checksum};
///
/// let mut acc = Checksum::new();
/// for byte in [0x31, 0x53, 0x00, 0x00] {
///     acc.push(byte);
/// }
/// assert_eq!(acc.value(), checksum(&[0x31, 0x53, 0x00, 0x00]));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    sum: u8,
}

impl Checksum {
    /// 创建空累加器（值为 0）
    pub const fn new() -> Self {
        Self { sum: 0 }
    }

    /// 累加一个字节
    #[inline]
    pub fn push(&mut self, byte: u8) {
        let (sum, carry) = self.sum.overflowing_add(byte);
        // 进位回卷：sum >= 256 时 (sum & 0xFF) + 1
        // 回卷后不会再次溢出（最大 0xFE + 1）
        self.sum = sum + carry as u8;
    }

    /// 累加一段字节
    pub fn extend(&mut self, data: &[u8]) {
        for &byte in data {
            self.push(byte);
        }
    }

    /// 当前校验和
    #[inline]
    pub const fn value(&self) -> u8 {
        self.sum
    }

    /// 重置为 0
    pub fn reset(&mut self) {
        self.sum = 0;
    }
}

/// 计算一段数据的 SIO 校验和
pub fn checksum(data: &[u8]) -> u8 {
    let mut acc = Checksum::new();
    acc.extend(data);
    acc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_checksum_carry_folds_into_low_byte() {
        // 0x80 + 0x80 = 0x100 -> 0x00 + 1
        assert_eq!(checksum(&[0x80, 0x80]), 0x01);
        assert_eq!(checksum(&[0xFF, 0x01]), 0x01);
        assert_eq!(checksum(&[0xFF, 0xFF]), 0xFF);
    }

    #[test]
    fn test_checksum_status_command() {
        // D1: STATUS
        // 0x31 + 0x53 = 0x84
        assert_eq!(checksum(&[0x31, 0x53, 0x00, 0x00]), 0x84);
    }

    #[test]
    fn test_checksum_drive_status_payload() {
        // 典型的软驱状态应答：0x10 0xFF 0xE0 0x00
        // 0x10 + 0xFF = 0x10F -> 0x10
        // 0x10 + 0xE0 = 0xF0
        assert_eq!(checksum(&[0x10, 0xFF, 0xE0, 0x00]), 0xF0);
    }

    #[test]
    fn test_incremental_matches_bulk() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut acc = Checksum::new();
        for &b in &data {
            acc.push(b);
        }
        assert_eq!(acc.value(), checksum(&data));

        acc.reset();
        assert_eq!(acc.value(), 0);
    }
}
