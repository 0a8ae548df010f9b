//! 协议工作线程
//!
//! 接收上下文只负责装配帧，所有协议决策都在这里完成：
//!
//! ```text
//! 命令帧 ──► on_command ──► 装填下一阶段 ──► 发送 ACK/NAK
//!                                │
//!                 rx_size > 0 ───┴─── rx_size == 0
//!                     │                   │
//!                数据帧 ──► ACK        立即执行
//!                     │                   │
//!                     └──► on_data ──► 发送 C/E + 负载 + 校验和
//! ```
//!
//! 每一步阶段迁移都带着事务开始时的 epoch；主机在处理期间重新拉低命令线
//! 会让迁移失败，工作线程随即放弃该事务的应答。

use crate::assembler::{FrameFault, FramePool, ReceivedFrame};
use crate::baud::BaudNegotiator;
use crate::metrics::BusMetrics;
use crate::phase::BusPhase;
use crate::registry::DeviceRegistry;
use crate::request::{BaudChange, Request};
use crate::state::{BusContext, BusState};
use crate::{SioDevice, StreamHandler};
use crossbeam_channel::{Receiver, Sender, select};
use sio_protocol::{
    COMMAND_ACK_BUDGET_MS, CommandFrame, DEFAULT_BAUDRATE, MAX_FRAME_SIZE, Status, checksum,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 命令回调应在此时间内给出 ACK/NAK
const COMMAND_ACK_BUDGET: Duration = Duration::from_millis(COMMAND_ACK_BUDGET_MS);

/// 每次 StreamTx 事件最多连续发送的块数
const STREAM_TX_BURST: usize = 16;

/// 工作线程配置
///
/// ```
/// use sio_driver::WorkerConfig;
///
/// let config = WorkerConfig {
///     response_delay_us: 0,
///     ..WorkerConfig::default()
/// };
/// assert_eq!(config.default_baudrate, 19_200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorkerConfig {
    /// 标准波特率
    pub default_baudrate: u32,
    /// 发送状态字节/应答负载前的延迟（微秒），给主机留出收发方向切换时间
    pub response_delay_us: u64,
    /// 流模式收发分块大小
    pub stream_chunk_size: usize,
    /// 流接收缓冲区容量（字节）
    pub stream_buffer_size: usize,
    /// 接收侧 → 工作线程事件队列容量
    pub event_queue_capacity: usize,
    /// 控制请求（attach/detach 等）等待工作线程应答的超时（毫秒）
    pub control_timeout_ms: u64,
    /// 停机时等待工作线程退出的超时（毫秒）
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_baudrate: DEFAULT_BAUDRATE,
            response_delay_us: 1_000,
            stream_chunk_size: 64,
            stream_buffer_size: MAX_FRAME_SIZE,
            event_queue_capacity: 64,
            control_timeout_ms: 1_000,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl WorkerConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.default_baudrate == 0 {
            return Err("default_baudrate must be non-zero".into());
        }
        if self.stream_chunk_size == 0 || self.stream_chunk_size > MAX_FRAME_SIZE {
            return Err(format!(
                "stream_chunk_size must be within 1..={}",
                MAX_FRAME_SIZE
            ));
        }
        if self.stream_buffer_size == 0 {
            return Err("stream_buffer_size must be non-zero".into());
        }
        if self.event_queue_capacity == 0 {
            return Err("event_queue_capacity must be non-zero".into());
        }
        Ok(())
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_micros(self.response_delay_us)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// 接收侧投递给工作线程的事件
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// 校验通过的帧
    Frame(ReceivedFrame),
    /// 帧错误
    FrameFault(FrameFault),
    /// 流接收缓冲区有数据
    StreamRx,
    /// 应用有流数据待发送
    StreamTx,
    /// 命令线拉低时串口忙，由工作线程恢复波特率
    RestoreBaudrate,
}

/// 应用线程发给工作线程的控制请求
pub(crate) enum Control {
    Attach {
        device_id: u8,
        device: Box<dyn SioDevice>,
        reply: Sender<bool>,
    },
    Detach {
        device_id: u8,
        reply: Sender<Option<Box<dyn SioDevice>>>,
    },
    DeviceIds {
        reply: Sender<Vec<u8>>,
    },
    SetStreamHandler {
        handler: Option<Box<dyn StreamHandler>>,
        reply: Sender<()>,
    },
    Shutdown,
}

/// 协议工作线程状态
pub(crate) struct ProtocolWorker {
    ctx: Arc<BusContext>,
    config: WorkerConfig,
    registry: DeviceRegistry,
    negotiator: BaudNegotiator,
    request: Request,
    stream: Option<Box<dyn StreamHandler>>,
    stream_bytes: Receiver<u8>,
    pool: FramePool,
    /// 工作线程当前持有的事务 epoch
    epoch: u32,
    chunk: Vec<u8>,
}

impl ProtocolWorker {
    pub fn new(
        ctx: Arc<BusContext>,
        config: WorkerConfig,
        stream_bytes: Receiver<u8>,
        pool: FramePool,
    ) -> Self {
        let negotiator = BaudNegotiator::new(config.default_baudrate);
        let chunk = vec![0u8; config.stream_chunk_size];
        Self {
            ctx,
            config,
            registry: DeviceRegistry::new(),
            negotiator,
            request: Request::default(),
            stream: None,
            stream_bytes,
            pool,
            epoch: 0,
            chunk,
        }
    }

    /// 工作线程主循环，直到收到 Shutdown 或控制通道断开
    pub fn run(mut self, events: Receiver<WorkerEvent>, control: Receiver<Control>) {
        #[cfg(feature = "realtime")]
        {
            use thread_priority::*;

            match set_current_thread_priority(ThreadPriority::Max) {
                Ok(_) => {
                    info!("SIO worker thread priority set to MAX (realtime)");
                },
                Err(e) => {
                    warn!(
                        "Failed to set SIO worker thread priority: {}. \
                        On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                        e
                    );
                },
            }
        }

        debug!("SIO worker started");
        loop {
            select! {
                recv(control) -> msg => match msg {
                    Ok(Control::Shutdown) | Err(_) => break,
                    Ok(msg) => self.handle_control(msg),
                },
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
            }
        }

        self.ctx.running.store(false, Ordering::Release);
        self.stream = None;
        self.registry.clear();
        self.ctx.release_port();
        self.publish_state();
        info!("SIO worker exited");
    }

    fn handle_control(&mut self, msg: Control) {
        match msg {
            Control::Attach {
                device_id,
                device,
                reply,
            } => {
                let attached = self.registry.attach(device_id, device);
                if !attached {
                    warn!(
                        "SIO device registry full, cannot attach 0x{:02X}",
                        device_id
                    );
                }
                let _ = reply.send(attached);
            },
            Control::Detach { device_id, reply } => {
                let _ = reply.send(self.registry.detach(device_id));
            },
            Control::DeviceIds { reply } => {
                let _ = reply.send(self.registry.device_ids());
            },
            Control::SetStreamHandler { handler, reply } => {
                self.stream = handler;
                let _ = reply.send(());
            },
            Control::Shutdown => {},
        }
        self.publish_state();
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Frame(frame) => {
                self.negotiator.record_valid_frame();
                self.handle_frame(&frame);
                self.pool.release(frame.data);
            },
            WorkerEvent::FrameFault(fault) => self.handle_fault(fault),
            WorkerEvent::StreamRx => self.drain_stream_rx(),
            WorkerEvent::StreamTx => self.pump_stream_tx(),
            WorkerEvent::RestoreBaudrate => self.ctx.restore_requested_baudrate(),
        }
        self.publish_state();
    }

    fn handle_frame(&mut self, frame: &ReceivedFrame) {
        match frame.phase {
            BusPhase::Command => self.handle_command_frame(frame.epoch, &frame.data),
            BusPhase::Data => self.handle_data_frame(frame.epoch, &frame.data),
            phase => trace!("SIO: ignoring frame assembled in {:?} phase", phase),
        }
    }

    fn handle_command_frame(&mut self, epoch: u32, data: &[u8]) {
        let frame = match CommandFrame::from_bytes(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("SIO: malformed command frame: {}", e);
                return;
            },
        };
        BusMetrics::bump(&self.ctx.metrics.command_frames);
        debug!(
            "SIO: command frame {:02X} {:02X} {:02X} {:02X}",
            frame.device, frame.command, frame.aux1, frame.aux2
        );

        let current = self.ctx.current_baudrate();
        self.request.begin(frame, current);
        let started = Instant::now();
        let status = self.registry.dispatch_command(&mut self.request);
        let elapsed = started.elapsed();
        if elapsed > COMMAND_ACK_BUDGET {
            // 主机只等待有限时间，超时的 ACK 通常已被当作无应答
            BusMetrics::bump(&self.ctx.metrics.slow_commands);
            warn!(
                "SIO: command {:02X} for 0x{:02X} took {:?} (budget {:?})",
                frame.command, frame.device, elapsed, COMMAND_ACK_BUDGET
            );
        }
        if status == Status::NoResponse {
            BusMetrics::bump(&self.ctx.metrics.unclaimed_commands);
            trace!("SIO: no device claimed 0x{:02X}", frame.device);
        }

        // 先装填下一阶段再应答，主机收到 ACK 后立即发送的数据帧才能被接收
        let rx_size = self.request.rx_size();
        let (next, expected) = if status == Status::Ack && rx_size > 0 {
            (BusPhase::Data, rx_size)
        } else {
            (BusPhase::Idle, 0)
        };
        if !self.advance(epoch, next, expected) {
            return;
        }

        if !self.send_status(status) || status != Status::Ack {
            return;
        }

        if let Some(BaudChange::DataPhase(rate)) = self.request.baud_change()
            && let Some(rate) = self.negotiator.begin_one_shot(rate, current)
        {
            self.ctx.set_requested_baudrate(self.negotiator.requested());
            self.switch_baudrate(rate);
            self.request.report_baudrate(self.ctx.current_baudrate());
        }

        if rx_size == 0 {
            self.execute();
        }
    }

    fn handle_data_frame(&mut self, epoch: u32, data: &[u8]) {
        BusMetrics::bump(&self.ctx.metrics.data_frames);
        debug!("SIO: data frame ({} bytes)", data.len());

        if !self.advance(epoch, BusPhase::Idle, 0) {
            return;
        }
        self.request.set_received(data);
        if self.send_status(Status::Ack) {
            self.execute();
        }
    }

    /// 执行命令并发送结果
    fn execute(&mut self) {
        let status = self.registry.dispatch_data(&mut self.request);
        // 回调期间命令线可能已再次拉低，旧事务的结果连同后续动作一并丢弃
        if self.superseded() || !self.send_status(status) {
            return;
        }
        if status.is_response() && !self.send_payload() {
            return;
        }

        if let Some(rate) = self.request.take_persistent_baud()
            && self.negotiator.commit_persistent(rate)
        {
            self.ctx.set_requested_baudrate(rate);
            BusMetrics::bump(&self.ctx.metrics.baud_changes);
        }

        if self.request.take_stream_request() {
            let epoch = self.epoch;
            if self.advance(epoch, BusPhase::Stream, 0) {
                info!("SIO: stream mode activated by device 0x{:02X}", self.request.device);
            }
        }
    }

    fn handle_fault(&mut self, fault: FrameFault) {
        warn!(
            "SIO: {:?} frame error {:?} after {} bytes",
            fault.phase, fault.kind, fault.received
        );
        let current = self.ctx.current_baudrate();
        if let Some(rate) = self.negotiator.record_frame_error(fault.phase, current) {
            self.ctx.set_requested_baudrate(rate);
            BusMetrics::bump(&self.ctx.metrics.baud_swaps);
        }
        // 已有新命令开始时迁移失败，保持新阶段不动
        if let Ok(next) = self.ctx.phase.transition(fault.epoch, BusPhase::Idle, 0) {
            self.epoch = next.epoch;
        }
    }

    /// 带 epoch 的阶段迁移；失败说明事务已被新命令打断
    fn advance(&mut self, epoch: u32, phase: BusPhase, expected: usize) -> bool {
        match self.ctx.phase.transition(epoch, phase, expected) {
            Ok(next) => {
                self.epoch = next.epoch;
                true
            },
            Err(now) => {
                BusMetrics::bump(&self.ctx.metrics.superseded_transactions);
                debug!(
                    "SIO: transaction (epoch {}) superseded by {:?} (epoch {}), response dropped",
                    epoch, now.phase, now.epoch
                );
                false
            },
        }
    }

    /// 当前事务已被新命令取代时计数并返回 `true`
    fn superseded(&self) -> bool {
        let now = self.ctx.phase.load();
        if now.epoch == self.epoch {
            return false;
        }
        BusMetrics::bump(&self.ctx.metrics.superseded_transactions);
        debug!(
            "SIO: transaction (epoch {}) abandoned for {:?} (epoch {}), response dropped",
            self.epoch, now.phase, now.epoch
        );
        true
    }

    fn turnaround(&self) {
        let delay = self.config.response_delay();
        if !delay.is_zero() {
            spin_sleep::sleep(delay);
        }
    }

    /// 发送状态字节；事务在间隔期间被取代时不发送并返回 `false`
    fn send_status(&self, status: Status) -> bool {
        let Some(byte) = status.wire_byte() else {
            return true;
        };
        self.turnaround();
        if self.superseded() {
            return false;
        }
        trace!("SIO: status '{}'", byte as char);
        self.write(&[byte]);
        true
    }

    fn send_payload(&self) -> bool {
        let data = self.request.tx_data();
        if data.is_empty() {
            return true;
        }
        self.turnaround();
        if self.superseded() {
            return false;
        }
        trace!("SIO: response payload ({} bytes)", data.len());
        self.write(data);
        self.write(&[checksum(data)]);
        true
    }

    fn write(&self, data: &[u8]) {
        if let Err(e) = self.ctx.write(data) {
            BusMetrics::bump(&self.ctx.metrics.transport_errors);
            error!("SIO: transmit failed: {}", e);
        }
    }

    fn switch_baudrate(&self, rate: u32) {
        match self.ctx.set_baudrate(rate) {
            Ok(_) => debug!("SIO: data phase baud rate {}", rate),
            Err(e) => {
                BusMetrics::bump(&self.ctx.metrics.transport_errors);
                error!("SIO: failed to switch baud rate to {}: {}", rate, e);
            },
        }
    }

    fn drain_stream_rx(&mut self) {
        self.ctx.stream_rx_pending.store(false, Ordering::Release);
        let chunk_size = self.config.stream_chunk_size;
        loop {
            let mut len = 0;
            while len < chunk_size {
                match self.stream_bytes.try_recv() {
                    Ok(byte) => {
                        self.chunk[len] = byte;
                        len += 1;
                    },
                    Err(_) => break,
                }
            }
            if len == 0 {
                break;
            }
            match self.stream.as_mut() {
                Some(handler) => handler.on_rx(&self.chunk[..len]),
                None => trace!("SIO: {} stream bytes discarded (no handler)", len),
            }
        }
    }

    fn pump_stream_tx(&mut self) {
        self.ctx.stream_tx_pending.store(false, Ordering::Release);
        let Some(handler) = self.stream.as_mut() else {
            return;
        };
        let mut chunks = 0;
        while self.ctx.is_running() && self.ctx.phase.load().phase == BusPhase::Stream {
            // 连续发送时定期回到主循环，控制消息（如 Shutdown）才有机会被处理
            if chunks == STREAM_TX_BURST {
                self.ctx
                    .post_coalesced(&self.ctx.stream_tx_pending, WorkerEvent::StreamTx);
                break;
            }
            let len = handler.fill_tx(&mut self.chunk).min(self.chunk.len());
            if len == 0 {
                break;
            }
            if let Err(e) = self.ctx.write(&self.chunk[..len]) {
                BusMetrics::bump(&self.ctx.metrics.transport_errors);
                error!("SIO: stream transmit failed: {}", e);
                break;
            }
            chunks += 1;
        }
    }

    fn publish_state(&self) {
        self.ctx.state.store(Arc::new(BusState {
            phase: self.ctx.phase.load().phase,
            current_baudrate: self.ctx.current_baudrate(),
            requested_baudrate: self.negotiator.requested(),
            alternate_baudrate: self.negotiator.alternate(),
            error_count: self.negotiator.error_count(),
            attached_devices: self.registry.len(),
            stream_handler: self.stream.is_some(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.default_baudrate, 19_200);
        assert_eq!(config.response_delay(), Duration::from_millis(1));
        assert_eq!(config.stream_chunk_size, 64);
        assert_eq!(config.stream_buffer_size, 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_config_validation() {
        let config = WorkerConfig {
            stream_chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            default_baudrate: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("default_baudrate"));
    }
}
