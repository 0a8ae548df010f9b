//! 波特率协商
//!
//! 维护三种速率：
//!
//! - `default`：标准 19200（可配置）
//! - `requested`：下一次命令线拉低时要恢复到的速率
//! - `alternate`：连续帧错误时在 `default` 与它之间来回切换
//!
//! 主机有时会在未通知的情况下用高速率（或退回标准速率）发送命令帧，
//! 命令阶段累计 [`BAUD_SWAP_THRESHOLD`] 次帧错误后切换 `requested`，
//! 下一个命令即以另一速率接收。数据阶段的错误不参与计数。

use crate::BusPhase;
use tracing::{debug, info};

/// 命令阶段连续帧错误达到该次数时切换速率
pub const BAUD_SWAP_THRESHOLD: u32 = 2;

/// 波特率协商状态（仅由工作线程持有）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaudNegotiator {
    default: u32,
    requested: u32,
    alternate: u32,
    error_count: u32,
}

impl BaudNegotiator {
    pub fn new(default: u32) -> Self {
        Self {
            default,
            requested: default,
            alternate: default,
            error_count: 0,
        }
    }

    pub fn default_baudrate(&self) -> u32 {
        self.default
    }

    pub fn requested(&self) -> u32 {
        self.requested
    }

    pub fn alternate(&self) -> u32 {
        self.alternate
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// 记录一次帧错误
    ///
    /// 返回 `Some(rate)` 表示 `requested` 已切换为 `rate`。
    /// `current` 是出错时 UART 实际使用的速率。
    pub fn record_frame_error(&mut self, phase: BusPhase, current: u32) -> Option<u32> {
        if phase != BusPhase::Command {
            return None;
        }
        self.error_count += 1;
        if self.error_count < BAUD_SWAP_THRESHOLD {
            return None;
        }
        self.error_count = 0;
        self.requested = if current == self.default {
            self.alternate
        } else {
            self.default
        };
        info!(
            "SIO: {} command frame errors at {} baud, next command expected at {}",
            BAUD_SWAP_THRESHOLD, current, self.requested
        );
        Some(self.requested)
    }

    /// 收到一个校验正确的帧（命令或数据）
    pub fn record_valid_frame(&mut self) {
        self.error_count = 0;
    }

    /// 单次事务的数据阶段速率（XF551）
    ///
    /// 返回 `Some(rate)` 表示需要把 UART 切到 `rate`；之后的命令恢复到
    /// `default`，备用速率也一并清回 `default`。
    pub fn begin_one_shot(&mut self, rate: u32, current: u32) -> Option<u32> {
        if rate == current {
            return None;
        }
        self.requested = self.default;
        self.alternate = self.default;
        debug!("SIO: data phase at {} baud, reverting to {} afterwards", rate, self.default);
        Some(rate)
    }

    /// 持续生效的速率变更（US-Doubler 速率索引）
    ///
    /// 返回 `true` 表示 `requested` 改变，新速率在下一次命令线拉低时生效。
    pub fn commit_persistent(&mut self, rate: u32) -> bool {
        if rate == self.requested {
            return false;
        }
        self.requested = rate;
        self.alternate = rate;
        info!("SIO: baud rate changed to {}", rate);
        true
    }
}
