//! 请求上下文
//!
//! 一次 SIO 事务的全部状态：命令帧四个字段、数据阶段长度与负载、
//! 应答负载、波特率变更意图、流模式请求。工作线程在每个命令帧到达时
//! 复用同一个 [`Request`]，设备回调通过 `&mut Request` 读写它。

use sio_protocol::{CommandFrame, MAX_FRAME_SIZE, ProtocolError};

/// 设备请求的波特率变更
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BaudChange {
    /// 仅对本次事务的数据阶段生效（XF551 高速命令）
    ///
    /// 须在命令回调中设置：ACK 发出后立即切换，下一次命令线拉低时恢复。
    DataPhase(u32),
    /// 持续生效，之后的命令帧都使用该速率（US-Doubler / HSIO 速率索引）
    ///
    /// 在应答发送完毕后才切换。
    Persistent(u32),
}

impl BaudChange {
    pub fn baudrate(self) -> u32 {
        match self {
            BaudChange::DataPhase(rate) | BaudChange::Persistent(rate) => rate,
        }
    }
}

/// 单次事务的请求上下文
///
/// 设备回调看到的 `device/command/aux1/aux2` 与命令帧按接收顺序一一对应。
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub device: u8,
    pub command: u8,
    pub aux1: u8,
    pub aux2: u8,
    baudrate: u32,
    rx_size: usize,
    rx_data: Vec<u8>,
    tx_data: Vec<u8>,
    baud_change: Option<BaudChange>,
    stream_requested: bool,
}

impl Request {
    /// 以命令帧构造请求（测试或设备单元测试使用）
    pub fn from_frame(frame: CommandFrame, baudrate: u32) -> Self {
        let mut request = Self::default();
        request.begin(frame, baudrate);
        request
    }

    /// 附带数据阶段负载（测试用）
    pub fn with_received_data(mut self, data: &[u8]) -> Self {
        self.rx_size = data.len();
        self.set_received(data);
        self
    }

    /// 命令帧
    pub fn frame(&self) -> CommandFrame {
        CommandFrame::new(self.device, self.command, self.aux1, self.aux2)
    }

    /// 16 位辅助参数（小端）
    pub fn aux(&self) -> u16 {
        self.frame().aux()
    }

    /// 数据阶段（或紧随其后的应答）所用的波特率
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// 期望主机随后发送的数据帧长度，0 表示无数据阶段
    pub fn rx_size(&self) -> usize {
        self.rx_size
    }

    /// 声明本命令带数据阶段
    ///
    /// 在命令回调中调用；仅当回调返回 [`Status::Ack`](sio_protocol::Status::Ack)
    /// 时才会进入数据阶段。
    pub fn expect_data(&mut self, size: usize) -> Result<(), ProtocolError> {
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        self.rx_size = size;
        Ok(())
    }

    /// 数据阶段收到的负载（无数据阶段时为空）
    pub fn rx_data(&self) -> &[u8] {
        &self.rx_data
    }

    /// 待发送的应答负载
    pub fn tx_data(&self) -> &[u8] {
        &self.tx_data
    }

    pub fn tx_size(&self) -> usize {
        self.tx_data.len()
    }

    /// 设置应答负载（发送时自动追加校验和）
    pub fn set_response(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.response_mut(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// 分配 `len` 字节的应答缓冲区（清零）并返回可写切片
    pub fn response_mut(&mut self, len: usize) -> Result<&mut [u8], ProtocolError> {
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        self.tx_data.clear();
        self.tx_data.resize(len, 0);
        Ok(&mut self.tx_data)
    }

    pub fn clear_response(&mut self) {
        self.tx_data.clear();
    }

    /// 请求切换波特率
    pub fn request_baud_change(&mut self, change: BaudChange) {
        self.baud_change = Some(change);
    }

    pub fn baud_change(&self) -> Option<BaudChange> {
        self.baud_change
    }

    /// 应答发送完毕后进入流模式
    pub fn enter_stream_mode(&mut self) {
        self.stream_requested = true;
    }

    pub fn stream_requested(&self) -> bool {
        self.stream_requested
    }

    /// 开始新事务：填入命令帧并清空上一事务留下的状态
    pub(crate) fn begin(&mut self, frame: CommandFrame, baudrate: u32) {
        self.device = frame.device;
        self.command = frame.command;
        self.aux1 = frame.aux1;
        self.aux2 = frame.aux2;
        self.baudrate = baudrate;
        self.rx_size = 0;
        self.rx_data.clear();
        self.tx_data.clear();
        self.baud_change = None;
        self.stream_requested = false;
    }

    pub(crate) fn set_received(&mut self, data: &[u8]) {
        self.rx_data.clear();
        self.rx_data.extend_from_slice(data);
    }

    /// 工作线程切换了数据阶段波特率后回填
    pub(crate) fn report_baudrate(&mut self, baudrate: u32) {
        self.baudrate = baudrate;
    }

    pub(crate) fn take_persistent_baud(&mut self) -> Option<u32> {
        match self.baud_change {
            Some(BaudChange::Persistent(rate)) => {
                self.baud_change = None;
                Some(rate)
            },
            _ => None,
        }
    }

    pub(crate) fn take_stream_request(&mut self) -> bool {
        std::mem::take(&mut self.stream_requested)
    }
}
