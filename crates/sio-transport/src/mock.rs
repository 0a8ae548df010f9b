//! Mock 串口（无硬件依赖）
//!
//! [`MockSerialPort`] 交给驱动使用，[`MockPortHandle`] 留在测试侧，
//! 按时间顺序观察驱动写出的字节和波特率切换。

use crate::{SerialPort, TransportError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// 串口上发生的一次操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// 写出一段字节
    Write(Vec<u8>),
    /// 切换波特率
    Baudrate(u32),
}

#[derive(Debug)]
struct MockShared {
    baudrate: AtomicU32,
    written: Mutex<Vec<u8>>,
    baud_history: Mutex<Vec<u32>>,
    fail_writes: AtomicBool,
}

/// 驱动侧的 Mock 串口
#[derive(Debug)]
pub struct MockSerialPort {
    shared: Arc<MockShared>,
    events: Sender<MockEvent>,
}

/// 测试侧的观察句柄
#[derive(Debug)]
pub struct MockPortHandle {
    shared: Arc<MockShared>,
    events: Receiver<MockEvent>,
    pending: VecDeque<u8>,
}

impl MockSerialPort {
    /// 创建一对 Mock 串口与观察句柄
    pub fn new(initial_baudrate: u32) -> (Self, MockPortHandle) {
        let shared = Arc::new(MockShared {
            baudrate: AtomicU32::new(initial_baudrate),
            written: Mutex::new(Vec::new()),
            baud_history: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        });
        let (tx, rx) = unbounded();
        (
            Self {
                shared: shared.clone(),
                events: tx,
            },
            MockPortHandle {
                shared,
                events: rx,
                pending: VecDeque::new(),
            },
        )
    }
}

impl SerialPort for MockSerialPort {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.shared.fail_writes.load(Ordering::Acquire) {
            return Err(TransportError::Timeout);
        }
        self.shared.written.lock().extend_from_slice(data);
        // 观察句柄可能已被丢弃，忽略发送错误
        let _ = self.events.send(MockEvent::Write(data.to_vec()));
        Ok(())
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), TransportError> {
        if baudrate == 0 {
            return Err(TransportError::UnsupportedBaudrate(baudrate));
        }
        self.shared.baudrate.store(baudrate, Ordering::Release);
        self.shared.baud_history.lock().push(baudrate);
        let _ = self.events.send(MockEvent::Baudrate(baudrate));
        Ok(())
    }
}

impl MockPortHandle {
    /// 当前波特率
    pub fn baudrate(&self) -> u32 {
        self.shared.baudrate.load(Ordering::Acquire)
    }

    /// 所有波特率切换记录（按时间顺序）
    pub fn baud_history(&self) -> Vec<u32> {
        self.shared.baud_history.lock().clone()
    }

    /// 迄今写出的全部字节
    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().clone()
    }

    /// 迄今写出的字节数
    pub fn written_len(&self) -> usize {
        self.shared.written.lock().len()
    }

    /// 让后续写操作失败（模拟硬件故障）
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::Release);
    }

    /// 等待下一个事件（包含尚未被 `recv_bytes` 消费的写入）
    pub fn recv_event(&mut self, timeout: Duration) -> Option<MockEvent> {
        if !self.pending.is_empty() {
            return Some(MockEvent::Write(self.pending.drain(..).collect()));
        }
        self.events.recv_timeout(timeout).ok()
    }

    /// 等待至少 `count` 个写出的字节，超时返回已收到的部分
    ///
    /// 期间的波特率切换事件被跳过（可通过 [`baud_history`](Self::baud_history) 查看）。
    pub fn recv_bytes(&mut self, count: usize, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        while self.pending.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(MockEvent::Write(data)) => self.pending.extend(data),
                Ok(MockEvent::Baudrate(_)) => {},
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let take = count.min(self.pending.len());
        self.pending.drain(..take).collect()
    }

    /// 在 `window` 时间内没有任何新字节写出则返回 `true`
    pub fn expect_silence(&mut self, window: Duration) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(MockEvent::Write(data)) => {
                    self.pending.extend(data);
                    return false;
                },
                Ok(MockEvent::Baudrate(_)) => continue,
                Err(_) => return true,
            }
        }
    }
}
