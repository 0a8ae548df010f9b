//! 驱动层错误类型定义

use sio_protocol::ProtocolError;
use sio_transport::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口传输错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 控制通道已关闭（工作线程退出）
    #[error("Control channel closed")]
    ChannelClosed,

    /// 工作线程未在超时内应答
    #[error("Operation timeout")]
    Timeout,

    /// 在设备/流回调内部调用了需要工作线程应答的接口
    ///
    /// 回调运行在工作线程上，等待自己应答只会超时。
    #[error("Called from the SIO worker thread (inside a device or stream callback)")]
    CalledFromWorker,

    /// 工作线程错误
    #[error("Worker thread error: {0}")]
    WorkerThread(String),

    /// 无效配置
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
