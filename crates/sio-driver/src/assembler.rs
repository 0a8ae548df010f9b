//! 帧装配器
//!
//! 运行在接收上下文（中断/轮询线程），逐字节累积当前阶段的帧：
//! 收满 `expected` 字节后，下一个字节即校验和，校验通过产出
//! [`ReceivedFrame`]，否则产出 [`FrameFault`]。同一阶段内帧完成后
//! 到达的多余字节一律丢弃，直到阶段被重新装填。
//!
//! 装配器不修改共享阶段字，只读取它的快照；阶段的 epoch 变化即视为
//! 「重新装填」，累积状态随之清空。
//!
//! 帧缓冲区在装配器与工作线程之间循环使用（[`FramePool`]），
//! 接收路径上不做常态分配。

use crate::phase::{BusPhase, PhaseSnapshot};
use crossbeam_channel::{Receiver, Sender, bounded};
use sio_protocol::{Checksum, MAX_FRAME_SIZE};

/// 默认循环缓冲区数量
pub const DEFAULT_POOL_DEPTH: usize = 4;

/// 校验通过的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// 接收该帧时的阶段 epoch
    pub epoch: u32,
    /// 命令帧或数据帧
    pub phase: BusPhase,
    /// 负载（不含校验和）
    pub data: Vec<u8>,
}

/// 帧错误原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFaultKind {
    /// 校验和不符
    ChecksumMismatch { expected: u8, actual: u8 },
    /// 命令帧尚未收完，命令线再次拉低
    CommandReasserted,
}

/// 帧错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFault {
    pub epoch: u32,
    pub phase: BusPhase,
    pub kind: FrameFaultKind,
    /// 出错前已收到的负载字节数
    pub received: usize,
}

/// 装配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerOutput {
    Frame(ReceivedFrame),
    Fault(FrameFault),
}

/// 帧缓冲区池
///
/// 工作线程处理完帧后把缓冲区归还，装配器开始新帧时优先取用归还的缓冲区。
/// 池满时直接丢弃归还的缓冲区，池空时新分配。
#[derive(Debug, Clone)]
pub struct FramePool {
    returns: Sender<Vec<u8>>,
    spares: Receiver<Vec<u8>>,
}

impl FramePool {
    pub fn new(depth: usize) -> Self {
        let (returns, spares) = bounded(depth.max(1));
        Self { returns, spares }
    }

    /// 取一个空缓冲区
    pub fn acquire(&self) -> Vec<u8> {
        match self.spares.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                buffer
            },
            Err(_) => Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// 归还缓冲区
    pub fn release(&self, buffer: Vec<u8>) {
        let _ = self.returns.try_send(buffer);
    }

    /// 池中可用的缓冲区数量
    pub fn available(&self) -> usize {
        self.spares.len()
    }
}

/// 帧装配器
#[derive(Debug)]
pub struct FrameAssembler {
    epoch: u32,
    buffer: Vec<u8>,
    checksum: Checksum,
    complete: bool,
    pool: FramePool,
}

impl FrameAssembler {
    pub fn new(pool: FramePool) -> Self {
        let buffer = pool.acquire();
        Self {
            epoch: 0,
            buffer,
            checksum: Checksum::new(),
            complete: false,
            pool,
        }
    }

    /// 当前阶段已累积的负载字节数
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// 指定 epoch 的帧是否已收完（无论校验成败）
    pub fn is_complete(&self, epoch: u32) -> bool {
        self.epoch == epoch && self.complete
    }

    /// 为新阶段清空累积状态
    pub fn reset(&mut self, epoch: u32) {
        self.epoch = epoch;
        self.buffer.clear();
        self.checksum.reset();
        self.complete = false;
    }

    /// 喂入一个字节
    pub fn push(&mut self, phase: PhaseSnapshot, byte: u8) -> Option<AssemblerOutput> {
        if phase.epoch != self.epoch {
            self.reset(phase.epoch);
        }
        if self.complete || !phase.phase.is_framed() || phase.expected() == 0 {
            return None;
        }

        let expected = phase.expected().min(MAX_FRAME_SIZE);
        if self.buffer.len() < expected {
            self.buffer.push(byte);
            self.checksum.push(byte);
            return None;
        }

        // 负载已满，本字节为校验和
        self.complete = true;
        let computed = self.checksum.value();
        if byte == computed {
            let data = std::mem::replace(&mut self.buffer, self.pool.acquire());
            Some(AssemblerOutput::Frame(ReceivedFrame {
                epoch: self.epoch,
                phase: phase.phase,
                data,
            }))
        } else {
            Some(AssemblerOutput::Fault(FrameFault {
                epoch: self.epoch,
                phase: phase.phase,
                kind: FrameFaultKind::ChecksumMismatch {
                    expected: computed,
                    actual: byte,
                },
                received: self.buffer.len(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sio_protocol::{CommandFrame, checksum};

    fn command_phase(epoch: u32) -> PhaseSnapshot {
        PhaseSnapshot::new(epoch, BusPhase::Command, 4)
    }

    fn feed(asm: &mut FrameAssembler, phase: PhaseSnapshot, bytes: &[u8]) -> Vec<AssemblerOutput> {
        bytes.iter().filter_map(|&b| asm.push(phase, b)).collect()
    }

    #[test]
    fn test_command_frame_assembled() {
        let mut asm = FrameAssembler::new(FramePool::new(2));
        let wire = CommandFrame::new(0x31, 0x53, 0, 0).encode();
        let out = feed(&mut asm, command_phase(1), &wire);
        assert_eq!(
            out,
            vec![AssemblerOutput::Frame(ReceivedFrame {
                epoch: 1,
                phase: BusPhase::Command,
                data: vec![0x31, 0x53, 0, 0],
            })]
        );
        assert!(asm.is_complete(1));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut asm = FrameAssembler::new(FramePool::new(2));
        let out = feed(&mut asm, command_phase(1), &[0x31, 0x53, 0, 0, 0x85]);
        assert_eq!(
            out,
            vec![AssemblerOutput::Fault(FrameFault {
                epoch: 1,
                phase: BusPhase::Command,
                kind: FrameFaultKind::ChecksumMismatch {
                    expected: 0x84,
                    actual: 0x85
                },
                received: 4,
            })]
        );
    }

    #[test]
    fn test_excess_bytes_ignored_until_rearmed() {
        let mut asm = FrameAssembler::new(FramePool::new(2));
        let mut wire = CommandFrame::new(0x31, 0x53, 0, 0).encode().to_vec();
        wire.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00]);
        assert_eq!(feed(&mut asm, command_phase(1), &wire).len(), 1);

        // 新 epoch 的数据阶段
        let data = [7u8; 16];
        let data_phase = PhaseSnapshot::new(2, BusPhase::Data, data.len());
        let mut wire = data.to_vec();
        wire.push(checksum(&data));
        let out = feed(&mut asm, data_phase, &wire);
        assert!(matches!(&out[..], [AssemblerOutput::Frame(f)] if f.data == data));
    }

    #[test]
    fn test_idle_and_stream_bytes_ignored() {
        let mut asm = FrameAssembler::new(FramePool::new(2));
        let idle = PhaseSnapshot::new(0, BusPhase::Idle, 0);
        let stream = PhaseSnapshot::new(3, BusPhase::Stream, 0);
        assert!(feed(&mut asm, idle, &[1, 2, 3, 4, 5]).is_empty());
        assert!(feed(&mut asm, stream, &[1, 2, 3, 4, 5]).is_empty());
        assert_eq!(asm.received(), 0);
    }

    #[test]
    fn test_epoch_change_restarts_frame() {
        let mut asm = FrameAssembler::new(FramePool::new(2));
        feed(&mut asm, command_phase(1), &[0x31, 0x53]);
        assert_eq!(asm.received(), 2);
        let wire = CommandFrame::new(0x32, 0x52, 1, 0).encode();
        let out = feed(&mut asm, command_phase(2), &wire);
        assert!(matches!(&out[..], [AssemblerOutput::Frame(f)] if f.data == [0x32, 0x52, 1, 0]));
    }

    #[test]
    fn test_max_size_data_frame() {
        let mut asm = FrameAssembler::new(FramePool::new(2));
        let data: Vec<u8> = (0..MAX_FRAME_SIZE).map(|i| i as u8).collect();
        let phase = PhaseSnapshot::new(5, BusPhase::Data, MAX_FRAME_SIZE);
        let mut out = feed(&mut asm, phase, &data);
        assert!(out.is_empty());
        out.extend(asm.push(phase, checksum(&data)));
        assert!(matches!(&out[..], [AssemblerOutput::Frame(f)] if f.data.len() == MAX_FRAME_SIZE));
    }

    #[test]
    fn test_pool_recycles_buffers() {
        let pool = FramePool::new(2);
        let mut buffer = pool.acquire();
        buffer.extend_from_slice(&[1, 2, 3]);
        let capacity = buffer.capacity();
        pool.release(buffer);
        assert_eq!(pool.available(), 1);

        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert_eq!(reused.capacity(), capacity);

        // 池满时丢弃多余的归还
        pool.release(Vec::new());
        pool.release(Vec::new());
        pool.release(Vec::new());
        assert_eq!(pool.available(), 2);
    }
}
