//! 接收上下文入口
//!
//! [`BusInterrupt`] 实现 [`LineSink`]，由传输后端在命令线跳变、字节到达时调用。
//! 它相当于中断处理函数：只做有界、不阻塞的工作（更新阶段字、装配帧、
//! 向工作线程投递事件），其余一切交给工作线程。

use crate::assembler::{AssemblerOutput, FrameAssembler, FrameFault, FrameFaultKind};
use crate::metrics::BusMetrics;
use crate::phase::{BusPhase, PhaseSnapshot};
use crate::state::BusContext;
use crate::worker::WorkerEvent;
use crossbeam_channel::Sender;
use sio_transport::{CommandLevel, LineSink};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, trace};

/// 命令线监视器 + 帧装配器 + 流接收入口
pub struct BusInterrupt {
    ctx: Arc<BusContext>,
    assembler: FrameAssembler,
    stream_bytes: Sender<u8>,
}

impl BusInterrupt {
    pub(crate) fn new(
        ctx: Arc<BusContext>,
        assembler: FrameAssembler,
        stream_bytes: Sender<u8>,
    ) -> Self {
        Self {
            ctx,
            assembler,
            stream_bytes,
        }
    }

    /// 当前阶段（接收侧视角）
    pub fn phase(&self) -> PhaseSnapshot {
        self.ctx.phase.load()
    }

    /// 当前帧已累积的字节数
    pub fn rx_count(&self) -> usize {
        self.assembler.received()
    }

    fn command_asserted(&mut self) {
        let (prev, next) = self.ctx.phase.begin_command();
        BusMetrics::bump(&self.ctx.metrics.command_assertions);
        trace!("SIO: command line asserted (epoch {})", next.epoch);

        match prev.phase {
            // 上一命令帧未收完
            BusPhase::Command if !self.assembler.is_complete(prev.epoch) => {
                BusMetrics::bump(&self.ctx.metrics.command_reasserts);
                self.ctx.post(WorkerEvent::FrameFault(FrameFault {
                    epoch: prev.epoch,
                    phase: BusPhase::Command,
                    kind: FrameFaultKind::CommandReasserted,
                    received: self.assembler.received(),
                }));
            },
            BusPhase::Stream => debug!("SIO: stream mode ended by command line"),
            _ => {},
        }

        self.assembler.reset(next.epoch);
        if !self.ctx.try_restore_requested_baudrate() {
            // 串口忙，交给工作线程；事件先于新命令帧入队
            self.ctx.post(WorkerEvent::RestoreBaudrate);
        }
    }

    fn stream_byte(&mut self, byte: u8) {
        if self.stream_bytes.try_send(byte).is_ok() {
            self.ctx
                .metrics
                .stream_rx_bytes
                .fetch_add(1, Ordering::Relaxed);
        } else {
            BusMetrics::bump(&self.ctx.metrics.stream_rx_dropped);
        }
        self.ctx
            .post_coalesced(&self.ctx.stream_rx_pending, WorkerEvent::StreamRx);
    }
}

impl LineSink for BusInterrupt {
    fn on_command_line(&mut self, level: CommandLevel) {
        if !self.ctx.is_running() {
            return;
        }
        // 只关心下降沿；释放不影响阶段
        if level.is_asserted() {
            self.command_asserted();
        }
    }

    fn on_byte(&mut self, byte: u8) {
        if !self.ctx.is_running() {
            return;
        }
        let phase = self.ctx.phase.load();
        if phase.phase == BusPhase::Stream {
            self.stream_byte(byte);
            return;
        }

        match self.assembler.push(phase, byte) {
            Some(AssemblerOutput::Frame(frame)) => {
                trace!("SIO: {:?} frame complete ({} bytes)", frame.phase, frame.data.len());
                self.ctx.post(WorkerEvent::Frame(frame));
            },
            Some(AssemblerOutput::Fault(fault)) => {
                BusMetrics::bump(&self.ctx.metrics.checksum_errors);
                self.ctx.post(WorkerEvent::FrameFault(fault));
            },
            None => {},
        }
    }
}

impl std::fmt::Debug for BusInterrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInterrupt")
            .field("phase", &self.phase())
            .field("rx_count", &self.rx_count())
            .finish()
    }
}
