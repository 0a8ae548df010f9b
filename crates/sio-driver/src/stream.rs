//! 流模式桥接
//!
//! 设备（如 850 接口的并发模式）在应答后把总线切到流模式：原始字节不再分帧，
//! 按到达顺序交给 [`StreamHandler::on_rx`]；应用通过 [`StreamHandle::wake_stream_tx`]
//! 唤醒工作线程，后者反复调用 [`StreamHandler::fill_tx`] 取数据发送。
//! 命令线再次拉低即结束流模式。

use crate::phase::BusPhase;
use crate::state::BusContext;
use crate::worker::WorkerEvent;
use std::sync::Arc;
use tracing::info;

/// 流模式回调（在工作线程上运行）
pub trait StreamHandler: Send {
    /// 收到一段原始字节（最多一个分块大小）
    fn on_rx(&mut self, data: &[u8]);

    /// 填充待发送字节，返回写入的字节数；返回 0 表示暂无数据
    fn fill_tx(&mut self, buffer: &mut [u8]) -> usize;
}

impl<H: StreamHandler + ?Sized> StreamHandler for Box<H> {
    fn on_rx(&mut self, data: &[u8]) {
        (**self).on_rx(data)
    }

    fn fill_tx(&mut self, buffer: &mut [u8]) -> usize {
        (**self).fill_tx(buffer)
    }
}

/// 由两个闭包组成的流回调
pub struct CallbackStream<R, T> {
    rx: R,
    tx: T,
}

impl<R, T> CallbackStream<R, T>
where
    R: FnMut(&[u8]) + Send,
    T: FnMut(&mut [u8]) -> usize + Send,
{
    pub fn new(rx: R, tx: T) -> Self {
        Self { rx, tx }
    }
}

impl<R, T> StreamHandler for CallbackStream<R, T>
where
    R: FnMut(&[u8]) + Send,
    T: FnMut(&mut [u8]) -> usize + Send,
{
    fn on_rx(&mut self, data: &[u8]) {
        (self.rx)(data)
    }

    fn fill_tx(&mut self, buffer: &mut [u8]) -> usize {
        (self.tx)(buffer)
    }
}

/// 可跨线程克隆的流控制句柄
#[derive(Clone)]
pub struct StreamHandle {
    ctx: Arc<BusContext>,
}

impl StreamHandle {
    pub(crate) fn new(ctx: Arc<BusContext>) -> Self {
        Self { ctx }
    }

    /// 立即进入流模式（直到下一次命令线拉低）
    pub fn activate_stream_mode(&self) {
        let snapshot = self.ctx.phase.enter_stream();
        info!("SIO: stream mode activated (epoch {})", snapshot.epoch);
    }

    /// 通知工作线程有待发送的流数据
    ///
    /// 多次调用会合并为一次唤醒；不处于流模式时工作线程忽略该通知。
    pub fn wake_stream_tx(&self) {
        self.ctx
            .post_coalesced(&self.ctx.stream_tx_pending, WorkerEvent::StreamTx);
    }

    pub fn is_stream_active(&self) -> bool {
        self.ctx.phase.load().phase == BusPhase::Stream
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("active", &self.is_stream_active())
            .finish()
    }
}
