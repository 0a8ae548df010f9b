//! 共享状态
//!
//! [`BusContext`] 是接收上下文、工作线程与应用线程之间共享的全部状态：
//!
//! - 阶段字（[`AtomicPhase`]）：接收侧与工作线程的唯一同步点
//! - 串口发送端：工作线程写应答，接收侧在命令线拉低时恢复波特率
//! - 「下一命令使用的波特率」：工作线程写，接收侧读
//! - 指标与状态快照（ArcSwap，无锁读取）

use crate::metrics::BusMetrics;
use crate::phase::{AtomicPhase, BusPhase};
use crate::worker::WorkerEvent;
use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use sio_transport::{SerialPort, TransportError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{trace, warn};

/// 总线状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusState {
    /// 工作线程最近一次观察到的阶段
    pub phase: BusPhase,
    /// UART 当前速率
    pub current_baudrate: u32,
    /// 下一次命令线拉低时恢复到的速率
    pub requested_baudrate: u32,
    /// 帧错误时的备用速率
    pub alternate_baudrate: u32,
    /// 命令阶段连续帧错误计数
    pub error_count: u32,
    /// 已挂载设备数
    pub attached_devices: usize,
    /// 是否安装了流回调
    pub stream_handler: bool,
}

struct PortSlot {
    port: Box<dyn SerialPort>,
    baudrate: u32,
}

/// 驱动上下文
pub(crate) struct BusContext {
    pub phase: AtomicPhase,
    pub metrics: BusMetrics,
    pub state: ArcSwap<BusState>,
    /// 工作线程事件入口
    pub events: Sender<WorkerEvent>,
    /// 下一次命令使用的波特率
    requested_baudrate: AtomicU32,
    /// `port` 当前速率的无锁镜像
    current_baudrate: AtomicU32,
    port: Mutex<Option<PortSlot>>,
    /// 已有未处理的 StreamRx 事件
    pub stream_rx_pending: AtomicBool,
    /// 已有未处理的 StreamTx 事件
    pub stream_tx_pending: AtomicBool,
    pub running: AtomicBool,
}

impl BusContext {
    pub fn new(port: Box<dyn SerialPort>, baudrate: u32, events: Sender<WorkerEvent>) -> Self {
        Self {
            phase: AtomicPhase::new(),
            metrics: BusMetrics::new(),
            state: ArcSwap::from_pointee(BusState {
                current_baudrate: baudrate,
                requested_baudrate: baudrate,
                alternate_baudrate: baudrate,
                ..Default::default()
            }),
            events,
            requested_baudrate: AtomicU32::new(baudrate),
            current_baudrate: AtomicU32::new(baudrate),
            port: Mutex::new(Some(PortSlot { port, baudrate })),
            stream_rx_pending: AtomicBool::new(false),
            stream_tx_pending: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn current_baudrate(&self) -> u32 {
        self.current_baudrate.load(Ordering::Acquire)
    }

    pub fn requested_baudrate(&self) -> u32 {
        self.requested_baudrate.load(Ordering::Acquire)
    }

    pub fn set_requested_baudrate(&self, baudrate: u32) {
        self.requested_baudrate.store(baudrate, Ordering::Release);
    }

    /// 切换 UART 速率，速率未变时返回 `Ok(false)`
    pub fn set_baudrate(&self, baudrate: u32) -> Result<bool, TransportError> {
        let mut guard = self.port.lock();
        self.switch_locked(guard.as_mut(), baudrate)
    }

    fn switch_locked(
        &self,
        slot: Option<&mut PortSlot>,
        baudrate: u32,
    ) -> Result<bool, TransportError> {
        let slot = slot.ok_or(TransportError::Closed)?;
        if slot.baudrate == baudrate {
            return Ok(false);
        }
        slot.port.set_baudrate(baudrate)?;
        slot.baudrate = baudrate;
        self.current_baudrate.store(baudrate, Ordering::Release);
        Ok(true)
    }

    /// 若当前速率与下一命令速率不同则切换（工作线程调用，会等待串口锁）
    pub fn restore_requested_baudrate(&self) {
        let requested = self.requested_baudrate();
        if self.current_baudrate() == requested {
            return;
        }
        let result = self.set_baudrate(requested);
        self.log_restore(requested, result);
    }

    /// 命令线拉低时由接收侧调用，不等待串口锁
    ///
    /// 工作线程正持有串口（写应答或排空后切换速率）时返回 `false`，
    /// 调用方应把恢复交给工作线程。
    pub fn try_restore_requested_baudrate(&self) -> bool {
        let requested = self.requested_baudrate();
        if self.current_baudrate() == requested {
            return true;
        }
        let Some(mut guard) = self.port.try_lock() else {
            return false;
        };
        let result = self.switch_locked(guard.as_mut(), requested);
        drop(guard);
        self.log_restore(requested, result);
        true
    }

    fn log_restore(&self, requested: u32, result: Result<bool, TransportError>) {
        match result {
            Ok(_) => trace!("SIO: baud rate restored to {}", requested),
            Err(e) => {
                BusMetrics::bump(&self.metrics.transport_errors);
                warn!("SIO: failed to restore baud rate {}: {}", requested, e);
            },
        }
    }

    pub fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.port.lock();
        let slot = guard.as_mut().ok_or(TransportError::Closed)?;
        slot.port.write(data)?;
        self.metrics
            .tx_bytes
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// 释放串口（停机时调用），之后的写入返回 [`TransportError::Closed`]
    pub fn release_port(&self) {
        if let Some(mut slot) = self.port.lock().take() {
            let _ = slot.port.flush();
        }
    }

    /// 向工作线程投递事件（不阻塞），队列满时计数并丢弃
    pub fn post(&self, event: WorkerEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                BusMetrics::bump(&self.metrics.events_dropped);
                false
            },
        }
    }

    /// 合并投递：`pending` 已置位时不重复投递
    pub fn post_coalesced(&self, pending: &AtomicBool, event: WorkerEvent) {
        if pending.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.post(event) {
            pending.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use sio_transport::MockSerialPort;

    type Context = (
        BusContext,
        sio_transport::MockPortHandle,
        crossbeam_channel::Receiver<WorkerEvent>,
    );

    fn context(capacity: usize) -> Context {
        let (port, handle) = MockSerialPort::new(19_200);
        let (tx, rx) = bounded(capacity);
        (BusContext::new(Box::new(port), 19_200, tx), handle, rx)
    }

    #[test]
    fn test_restore_requested_baudrate() {
        let (ctx, handle, _rx) = context(4);
        ctx.restore_requested_baudrate();
        assert!(handle.baud_history().is_empty());

        ctx.set_requested_baudrate(57_600);
        ctx.restore_requested_baudrate();
        assert_eq!(handle.baud_history(), vec![57_600]);
        assert_eq!(ctx.current_baudrate(), 57_600);
    }

    #[test]
    fn test_try_restore_does_not_wait_for_busy_port() {
        let (ctx, handle, _rx) = context(4);
        ctx.set_requested_baudrate(57_600);

        let guard = ctx.port.lock();
        assert!(!ctx.try_restore_requested_baudrate());
        drop(guard);
        assert!(handle.baud_history().is_empty());
        assert_eq!(ctx.current_baudrate(), 19_200);

        assert!(ctx.try_restore_requested_baudrate());
        assert_eq!(handle.baud_history(), vec![57_600]);
        // 速率已一致时无需串口
        let _guard = ctx.port.lock();
        assert!(ctx.try_restore_requested_baudrate());
    }

    #[test]
    fn test_write_after_release_fails() {
        let (ctx, handle, _rx) = context(4);
        ctx.write(&[b'A']).unwrap();
        assert_eq!(handle.written(), vec![b'A']);
        ctx.release_port();
        assert!(matches!(ctx.write(&[b'C']), Err(TransportError::Closed)));
        assert_eq!(ctx.metrics.snapshot().tx_bytes, 1);
    }

    #[test]
    fn test_post_coalesced() {
        let (ctx, _handle, rx) = context(4);
        ctx.post_coalesced(&ctx.stream_rx_pending, WorkerEvent::StreamRx);
        ctx.post_coalesced(&ctx.stream_rx_pending, WorkerEvent::StreamRx);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_post_full_queue_counts_drop() {
        let (ctx, _handle, rx) = context(1);
        assert!(ctx.post(WorkerEvent::StreamTx));
        assert!(!ctx.post(WorkerEvent::StreamTx));
        assert_eq!(ctx.metrics.snapshot().events_dropped, 1);
        // 合并投递失败时清除挂起标志，下次可以重试
        ctx.post_coalesced(&ctx.stream_rx_pending, WorkerEvent::StreamRx);
        assert!(!ctx.stream_rx_pending.load(Ordering::Acquire));
        drop(rx);
    }
}
