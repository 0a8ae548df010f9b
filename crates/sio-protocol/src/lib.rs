//! # SIO Protocol
//!
//! Atari 8-bit 外设总线（SIO）协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `checksum`: 帧校验和（进位回卷累加）
//! - `status`: 应答状态字节
//! - `ids`: 设备 ID 与命令码常量
//! - `constants`: 协议常量定义
//!
//! ## 帧格式
//!
//! ```text
//! 命令帧:  [device, command, aux1, aux2, checksum]
//! 数据帧:  [payload(N <= 2048)..., checksum]
//! 应答:    [status] 或 [status, payload(M)..., checksum]
//! ```

pub mod checksum;
pub mod constants;
pub mod ids;
pub mod status;

// 重新导出常用类型
pub use checksum::{Checksum, checksum};
pub use constants::*;
pub use ids::*;
pub use status::{Status, StatusByte};

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid status byte: 0x{0:02X}")]
    InvalidStatus(u8),
}

/// 命令帧
///
/// 主机在命令线拉低期间发送的 4 字节请求头。
///
/// # 示例
///
/// ```rust
/// use sio_protocol::{CommandFrame, DEVICE_DISK1, COMMAND_READ};
///
/// let frame = CommandFrame::new(DEVICE_DISK1, COMMAND_READ, 0x68, 0x01);
/// assert_eq!(frame.aux(), 360);
///
/// let wire = frame.encode();
/// assert_eq!(CommandFrame::decode(&wire).unwrap(), frame);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandFrame {
    /// 设备 ID
    pub device: u8,
    /// 命令码
    pub command: u8,
    /// 辅助字节 1（通常是扇区号低字节）
    pub aux1: u8,
    /// 辅助字节 2（通常是扇区号高字节）
    pub aux2: u8,
}

impl CommandFrame {
    pub const fn new(device: u8, command: u8, aux1: u8, aux2: u8) -> Self {
        Self {
            device,
            command,
            aux1,
            aux2,
        }
    }

    /// 从 4 字节负载解析（不含校验和）
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes {
            [device, command, aux1, aux2] => Ok(Self::new(*device, *command, *aux1, *aux2)),
            _ => Err(ProtocolError::InvalidLength {
                expected: COMMAND_FRAME_SIZE,
                actual: bytes.len(),
            }),
        }
    }

    /// 4 字节负载（不含校验和）
    pub const fn to_bytes(self) -> [u8; COMMAND_FRAME_SIZE] {
        [self.device, self.command, self.aux1, self.aux2]
    }

    /// 带校验和的完整线上帧
    pub fn encode(self) -> [u8; COMMAND_FRAME_SIZE + 1] {
        let payload = self.to_bytes();
        let [d, c, a1, a2] = payload;
        [d, c, a1, a2, checksum(&payload)]
    }

    /// 解析带校验和的完整线上帧
    pub fn decode(wire: &[u8]) -> Result<Self, ProtocolError> {
        Self::from_bytes(verify_frame(wire)?)
    }

    /// 16 位辅助参数（aux1 + aux2 * 256，小端）
    pub const fn aux(&self) -> u16 {
        u16::from_le_bytes([self.aux1, self.aux2])
    }
}

/// 为负载追加校验和，构造完整线上帧
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut wire = Vec::with_capacity(payload.len() + 1);
    wire.extend_from_slice(payload);
    wire.push(checksum(payload));
    Ok(wire)
}

/// 校验完整线上帧并返回负载部分
pub fn verify_frame(wire: &[u8]) -> Result<&[u8], ProtocolError> {
    let Some((&actual, payload)) = wire.split_last() else {
        return Err(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        });
    };
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let expected = checksum(payload);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_unpack_order() {
        let frame = CommandFrame::from_bytes(&[0x31, 0x53, 0x01, 0x02]).unwrap();
        assert_eq!(frame.device, 0x31);
        assert_eq!(frame.command, 0x53);
        assert_eq!(frame.aux1, 0x01);
        assert_eq!(frame.aux2, 0x02);
        assert_eq!(frame.aux(), 0x0201);
    }

    #[test]
    fn test_command_frame_invalid_length() {
        let err = CommandFrame::from_bytes(&[0x31, 0x53, 0x00]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_command_frame_encode_status() {
        let frame = CommandFrame::new(DEVICE_DISK1, COMMAND_STATUS, 0, 0);
        assert_eq!(frame.encode(), [0x31, 0x53, 0x00, 0x00, 0x84]);
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let err = CommandFrame::decode(&[0x31, 0x53, 0x00, 0x00, 0x85]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ChecksumMismatch {
                expected: 0x84,
                actual: 0x85
            }
        );
    }

    #[test]
    fn test_encode_frame_limits() {
        assert!(encode_frame(&[0u8; MAX_FRAME_SIZE]).is_ok());
        assert!(matches!(
            encode_frame(&[0u8; MAX_FRAME_SIZE + 1]),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_verify_frame_empty() {
        assert!(matches!(
            verify_frame(&[]),
            Err(ProtocolError::InvalidLength { .. })
        ));
        // 空负载 + 校验和 0 是合法的
        assert_eq!(verify_frame(&[0x00]).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_error_display() {
        let msg = format!(
            "{}",
            ProtocolError::ChecksumMismatch {
                expected: 0x84,
                actual: 0x12
            }
        );
        assert!(msg.contains("0x84") && msg.contains("0x12"), "{}", msg);
    }
}
