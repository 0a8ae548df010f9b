//! # SIO Transport Layer
//!
//! SIO 总线的物理传输抽象：一条 UART（按字节收发、可切换波特率）
//! 加上一根命令线（边沿中断）。
//!
//! - 发送方向由 [`SerialPort`] 描述，归协议工作线程独占；
//! - 接收方向由 [`LineSink`] 描述，由传输后端（中断处理函数、轮询线程等）
//!   在字节到达或命令线跳变时调用。

use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockPortHandle, MockSerialPort};

#[cfg(feature = "serial")]
pub use serial::{CommandPin, LinePump, SerialLine, SerialLineConfig};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] TransportDeviceError),
    #[error("Write timeout")]
    Timeout,
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudrate(u32),
    #[error("Port closed")]
    Closed,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct TransportDeviceError {
    pub kind: TransportDeviceErrorKind,
    pub message: String,
}

impl TransportDeviceError {
    pub fn new(kind: TransportDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 不可恢复的错误（设备消失、无权限）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            TransportDeviceErrorKind::NotFound | TransportDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for TransportDeviceError {
    fn from(message: String) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for TransportDeviceError {
    fn from(message: &str) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

/// UART 发送端
///
/// 由协议工作线程独占使用；命令线监视器在恢复波特率时也会短暂借用
/// （驱动层用锁串行化两者）。
pub trait SerialPort: Send {
    /// 发送字节，返回时数据至少已进入发送 FIFO
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// 切换波特率
    ///
    /// 实现必须先等待已排队的字节发送完毕，再切换速率，
    /// 否则正在发送的 ACK 会以错误的速率出现在线上。
    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), TransportError>;

    /// 等待发送 FIFO 清空
    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<P: SerialPort + ?Sized> SerialPort for Box<P> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), TransportError> {
        (**self).set_baudrate(baudrate)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }
}

/// 命令线电平
///
/// SIO 命令线低电平有效：`Asserted` 即主机把 COMMAND 拉低。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLevel {
    Asserted,
    Released,
}

impl CommandLevel {
    /// 由 GPIO 读数转换（低电平 = 有效）
    pub fn from_pin_high(pin_high: bool) -> Self {
        if pin_high {
            CommandLevel::Released
        } else {
            CommandLevel::Asserted
        }
    }

    pub fn is_asserted(self) -> bool {
        self == CommandLevel::Asserted
    }
}

/// 接收方向的事件入口（中断上下文）
///
/// 传输后端在命令线跳变、收到字节时调用。实现不得阻塞。
pub trait LineSink: Send {
    /// 命令线边沿
    fn on_command_line(&mut self, level: CommandLevel);

    /// 收到一个字节
    fn on_byte(&mut self, byte: u8);

    /// 收到一段字节（默认逐字节转发）
    fn on_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.on_byte(byte);
        }
    }
}
