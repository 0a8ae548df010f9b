//! SIO 总线运行指标
//!
//! 原子计数器，接收上下文与工作线程都可以无锁更新，应用线程随时读取快照。

use std::sync::atomic::{AtomicU64, Ordering};

/// 总线实时指标
///
/// ```rust
/// use sio_driver::BusMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = BusMetrics::new();
/// metrics.command_frames.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().command_frames, 1);
/// ```
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// 命令线拉低次数
    pub command_assertions: AtomicU64,
    /// 校验通过的命令帧
    pub command_frames: AtomicU64,
    /// 校验通过的数据帧
    pub data_frames: AtomicU64,
    /// 校验和错误
    pub checksum_errors: AtomicU64,
    /// 命令帧未收完即再次拉低命令线
    pub command_reasserts: AtomicU64,
    /// 无设备认领的命令（保持静默）
    pub unclaimed_commands: AtomicU64,
    /// 处理完成前被新命令打断而放弃应答的事务
    pub superseded_transactions: AtomicU64,
    /// 命令回调超出 ACK 响应预算
    pub slow_commands: AtomicU64,
    /// 帧错误触发的波特率切换
    pub baud_swaps: AtomicU64,
    /// 设备请求的持续波特率变更
    pub baud_changes: AtomicU64,
    /// 发出的字节数（状态、负载、校验和、流数据）
    pub tx_bytes: AtomicU64,
    /// 流模式下接收的字节
    pub stream_rx_bytes: AtomicU64,
    /// 流接收缓冲区满而丢弃的字节
    pub stream_rx_dropped: AtomicU64,
    /// 事件队列满而丢弃的事件
    pub events_dropped: AtomicU64,
    /// 串口写入/切换速率失败
    pub transport_errors: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 读取所有计数器
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            command_assertions: self.command_assertions.load(Ordering::Relaxed),
            command_frames: self.command_frames.load(Ordering::Relaxed),
            data_frames: self.data_frames.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            command_reasserts: self.command_reasserts.load(Ordering::Relaxed),
            unclaimed_commands: self.unclaimed_commands.load(Ordering::Relaxed),
            superseded_transactions: self.superseded_transactions.load(Ordering::Relaxed),
            slow_commands: self.slow_commands.load(Ordering::Relaxed),
            baud_swaps: self.baud_swaps.load(Ordering::Relaxed),
            baud_changes: self.baud_changes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            stream_rx_bytes: self.stream_rx_bytes.load(Ordering::Relaxed),
            stream_rx_dropped: self.stream_rx_dropped.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }

    /// 所有计数器清零
    pub fn reset(&self) {
        for counter in [
            &self.command_assertions,
            &self.command_frames,
            &self.data_frames,
            &self.checksum_errors,
            &self.command_reasserts,
            &self.unclaimed_commands,
            &self.superseded_transactions,
            &self.slow_commands,
            &self.baud_swaps,
            &self.baud_changes,
            &self.tx_bytes,
            &self.stream_rx_bytes,
            &self.stream_rx_dropped,
            &self.events_dropped,
            &self.transport_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub command_assertions: u64,
    pub command_frames: u64,
    pub data_frames: u64,
    pub checksum_errors: u64,
    pub command_reasserts: u64,
    pub unclaimed_commands: u64,
    pub superseded_transactions: u64,
    pub slow_commands: u64,
    pub baud_swaps: u64,
    pub baud_changes: u64,
    pub tx_bytes: u64,
    pub stream_rx_bytes: u64,
    pub stream_rx_dropped: u64,
    pub events_dropped: u64,
    pub transport_errors: u64,
}

impl MetricsSnapshot {
    /// 帧错误总数（校验和错误 + 命令帧中断）
    pub fn frame_errors(&self) -> u64 {
        self.checksum_errors + self.command_reasserts
    }

    /// 命令帧错误率（百分比），无命令时返回 0.0
    pub fn frame_error_rate(&self) -> f64 {
        let total = self.command_frames + self.data_frames + self.frame_errors();
        if total == 0 {
            return 0.0;
        }
        self.frame_errors() as f64 / total as f64 * 100.0
    }
}
