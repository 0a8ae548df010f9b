//! 总线阶段
//!
//! 中断侧（命令线监视器、帧装配器）与协议工作线程共享「当前处于哪个阶段、
//! 本阶段期望多少字节」这组状态。两侧都只通过一个 64 位原子字读写它：
//!
//! ```text
//! bit 63..32  epoch     每次阶段迁移 +1，用来识别过期的帧/迁移
//! bit 23..16  phase     BusPhase
//! bit 15..0   expected  本阶段期望的负载字节数（<= 2048）
//! ```
//!
//! 中断侧在命令线拉低时无条件开启新 epoch；工作线程只做「epoch 仍是我看到的那个」
//! 条件下的迁移（CAS），从而保证新命令总能打断进行中的数据阶段或流模式，
//! 而工作线程对已作废事务的迁移会失败。

use sio_protocol::{COMMAND_FRAME_SIZE, MAX_FRAME_SIZE};
use std::sync::atomic::{AtomicU64, Ordering};

/// 总线所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BusPhase {
    /// 空闲：不接收任何帧
    #[default]
    Idle = 0,
    /// 命令阶段：接收 device/command/aux1/aux2 + 校验和
    Command = 1,
    /// 数据阶段：接收 N 字节负载 + 校验和
    Data = 2,
    /// 流模式：不分帧，原始字节直通
    Stream = 3,
}

impl BusPhase {
    /// 从 u8 转换，无效值视为 Idle
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Command,
            2 => Self::Data,
            3 => Self::Stream,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 本阶段是否按帧接收
    pub fn is_framed(self) -> bool {
        matches!(self, Self::Command | Self::Data)
    }
}

/// 阶段字的解包结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSnapshot {
    pub epoch: u32,
    pub phase: BusPhase,
    expected: u16,
}

impl PhaseSnapshot {
    /// 构造快照，`expected` 超过最大帧长时截断
    pub fn new(epoch: u32, phase: BusPhase, expected: usize) -> Self {
        debug_assert!(expected <= MAX_FRAME_SIZE);
        Self {
            epoch,
            phase,
            expected: expected.min(MAX_FRAME_SIZE) as u16,
        }
    }

    /// 本阶段期望的负载字节数
    pub fn expected(&self) -> usize {
        self.expected as usize
    }

    fn pack(self) -> u64 {
        ((self.epoch as u64) << 32) | ((self.phase.as_u8() as u64) << 16) | self.expected as u64
    }

    fn unpack(word: u64) -> Self {
        Self {
            epoch: (word >> 32) as u32,
            phase: BusPhase::from_u8((word >> 16) as u8),
            expected: word as u16,
        }
    }
}

/// 共享阶段字
#[derive(Debug)]
pub struct AtomicPhase {
    word: AtomicU64,
}

impl Default for AtomicPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicPhase {
    /// 初始为 epoch 0 的 Idle
    pub fn new() -> Self {
        Self {
            word: AtomicU64::new(PhaseSnapshot::new(0, BusPhase::Idle, 0).pack()),
        }
    }

    pub fn load(&self) -> PhaseSnapshot {
        PhaseSnapshot::unpack(self.word.load(Ordering::Acquire))
    }

    /// 命令线拉低：无条件开启新的命令阶段
    ///
    /// 返回 `(之前的阶段, 新阶段)`。
    pub fn begin_command(&self) -> (PhaseSnapshot, PhaseSnapshot) {
        let mut next = PhaseSnapshot::new(0, BusPhase::Command, COMMAND_FRAME_SIZE);
        let prev = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                next.epoch = PhaseSnapshot::unpack(word).epoch.wrapping_add(1);
                Some(next.pack())
            })
            .map_or_else(PhaseSnapshot::unpack, PhaseSnapshot::unpack);
        (prev, next)
    }

    /// 条件迁移：仅当当前 epoch 仍为 `from_epoch` 时生效
    ///
    /// 成功返回新阶段；失败（期间已有新命令开始）返回当前阶段。
    pub fn transition(
        &self,
        from_epoch: u32,
        phase: BusPhase,
        expected: usize,
    ) -> Result<PhaseSnapshot, PhaseSnapshot> {
        let next = PhaseSnapshot::new(from_epoch.wrapping_add(1), phase, expected);
        self.word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (PhaseSnapshot::unpack(word).epoch == from_epoch).then_some(next.pack())
            })
            .map(|_| next)
            .map_err(PhaseSnapshot::unpack)
    }

    /// 无条件进入流模式（直到下一次命令线拉低）
    pub fn enter_stream(&self) -> PhaseSnapshot {
        let mut next = PhaseSnapshot::new(0, BusPhase::Stream, 0);
        let _ = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                next.epoch = PhaseSnapshot::unpack(word).epoch.wrapping_add(1);
                Some(next.pack())
            });
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip_extremes() {
        let snap = PhaseSnapshot::new(u32::MAX, BusPhase::Data, MAX_FRAME_SIZE);
        assert_eq!(PhaseSnapshot::unpack(snap.pack()), snap);
        assert_eq!(snap.expected(), 2048);
    }

    #[test]
    fn test_begin_command_bumps_epoch() {
        let phase = AtomicPhase::new();
        let (prev, next) = phase.begin_command();
        assert_eq!(prev.phase, BusPhase::Idle);
        assert_eq!(prev.epoch, 0);
        assert_eq!(next.phase, BusPhase::Command);
        assert_eq!(next.epoch, 1);
        assert_eq!(next.expected(), 4);
        assert_eq!(phase.load(), next);
    }

    #[test]
    fn test_transition_requires_matching_epoch() {
        let phase = AtomicPhase::new();
        let (_, cmd) = phase.begin_command();

        let data = phase.transition(cmd.epoch, BusPhase::Data, 128).unwrap();
        assert_eq!(data.phase, BusPhase::Data);
        assert_eq!(data.expected(), 128);

        // 过期 epoch 的迁移失败，并返回当前阶段
        let err = phase.transition(cmd.epoch, BusPhase::Idle, 0).unwrap_err();
        assert_eq!(err, data);
    }

    #[test]
    fn test_new_command_supersedes_worker_transition() {
        let phase = AtomicPhase::new();
        let (_, first) = phase.begin_command();
        // 工作线程处理期间主机重新发起命令
        let (_, second) = phase.begin_command();
        assert!(phase.transition(first.epoch, BusPhase::Idle, 0).is_err());
        assert_eq!(phase.load(), second);
    }

    #[test]
    fn test_stream_cleared_by_command() {
        let phase = AtomicPhase::new();
        let stream = phase.enter_stream();
        assert_eq!(stream.phase, BusPhase::Stream);
        let (prev, next) = phase.begin_command();
        assert_eq!(prev.phase, BusPhase::Stream);
        assert_eq!(next.phase, BusPhase::Command);
    }

    #[test]
    fn test_phase_from_u8_invalid() {
        assert_eq!(BusPhase::from_u8(0xFF), BusPhase::Idle);
        assert!(BusPhase::Data.is_framed());
        assert!(!BusPhase::Stream.is_framed());
    }
}
