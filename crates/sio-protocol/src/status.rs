//! 设备应答状态

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 线上传输的单字节状态码
///
/// 原样发送给主机：ACK/NAK 用于命令帧的接收确认，
/// COMPLETE/ERROR 用于命令执行结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StatusByte {
    /// 'A'
    Ack = b'A',
    /// 'N'
    Nak = b'N',
    /// 'C'
    Complete = b'C',
    /// 'E'
    Error = b'E',
}

/// 设备回调返回的状态
///
/// 比 [`StatusByte`] 多一个 `NoResponse`：表示保持沉默、不发送任何字节，
/// 用于总线上不属于本设备的命令。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// 不应答
    #[default]
    NoResponse,
    /// 命令已接受
    Ack,
    /// 命令被拒绝
    Nak,
    /// 执行成功
    Complete,
    /// 执行失败
    Error,
}

impl Status {
    /// 对应的线上状态字节，`NoResponse` 返回 `None`
    pub const fn status_byte(self) -> Option<StatusByte> {
        match self {
            Status::NoResponse => None,
            Status::Ack => Some(StatusByte::Ack),
            Status::Nak => Some(StatusByte::Nak),
            Status::Complete => Some(StatusByte::Complete),
            Status::Error => Some(StatusByte::Error),
        }
    }

    /// 对应的原始字节
    pub fn wire_byte(self) -> Option<u8> {
        self.status_byte().map(u8::from)
    }

    /// 是否会在总线上产生应答
    pub const fn is_response(self) -> bool {
        !matches!(self, Status::NoResponse)
    }
}

impl From<StatusByte> for Status {
    fn from(byte: StatusByte) -> Self {
        match byte {
            StatusByte::Ack => Status::Ack,
            StatusByte::Nak => Status::Nak,
            StatusByte::Complete => Status::Complete,
            StatusByte::Error => Status::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes() {
        assert_eq!(Status::Ack.wire_byte(), Some(0x41));
        assert_eq!(Status::Nak.wire_byte(), Some(0x4E));
        assert_eq!(Status::Complete.wire_byte(), Some(0x43));
        assert_eq!(Status::Error.wire_byte(), Some(0x45));
        assert_eq!(Status::NoResponse.wire_byte(), None);
    }

    #[test]
    fn test_status_byte_try_from() {
        assert_eq!(StatusByte::try_from(0x41).unwrap(), StatusByte::Ack);
        assert_eq!(StatusByte::try_from(b'C').unwrap(), StatusByte::Complete);
        assert!(StatusByte::try_from(0x00).is_err());
        assert_eq!(Status::from(StatusByte::Error), Status::Error);
    }

    #[test]
    fn test_is_response() {
        assert!(!Status::NoResponse.is_response());
        assert!(Status::Nak.is_response());
        assert_eq!(Status::default(), Status::NoResponse);
    }
}
