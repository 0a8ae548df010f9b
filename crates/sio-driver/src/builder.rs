//! Builder 模式实现
//!
//! 链式构造 [`SioDriver`]：任意 [`SerialPort`] 实现用 [`SioBuilder::build`]，
//! SIO2PC 串口线缆用 [`SioBuilder::build_serial`]（需 `serial` feature）。

use crate::driver::SioDriver;
use crate::error::DriverError;
use crate::interrupt::BusInterrupt;
use crate::worker::WorkerConfig;
use sio_transport::SerialPort;
use std::time::Duration;

#[cfg(feature = "serial")]
use sio_transport::{CommandPin, SerialLine, SerialLineConfig};

/// SIO 驱动 Builder
///
/// # Example
///
/// ```
/// use sio_driver::SioBuilder;
/// use sio_transport::MockSerialPort;
/// use std::time::Duration;
///
/// let (port, _handle) = MockSerialPort::new(19_200);
/// let (driver, _interrupt) = SioBuilder::new()
///     .response_delay(Duration::from_micros(500))
///     .build(port)
///     .unwrap();
/// assert_eq!(driver.config().response_delay_us, 500);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SioBuilder {
    config: WorkerConfig,
    #[cfg(feature = "serial")]
    path: Option<String>,
    #[cfg(feature = "serial")]
    command_pin: CommandPin,
    #[cfg(feature = "serial")]
    invert_command: bool,
    #[cfg(feature = "serial")]
    poll_interval: Option<Duration>,
}

impl SioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换工作线程配置
    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// 标准波特率（默认 19200）
    pub fn default_baudrate(mut self, baudrate: u32) -> Self {
        self.config.default_baudrate = baudrate;
        self
    }

    /// 应答前的方向切换延迟（默认 1ms）
    pub fn response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay_us = delay.as_micros() as u64;
        self
    }

    /// 流模式收发分块大小（默认 64）
    pub fn stream_chunk_size(mut self, size: usize) -> Self {
        self.config.stream_chunk_size = size;
        self
    }

    /// 使用给定的串口发送端构造驱动
    pub fn build(
        self,
        port: impl SerialPort + 'static,
    ) -> Result<(SioDriver, BusInterrupt), DriverError> {
        SioDriver::new(port, self.config)
    }
}

#[cfg(feature = "serial")]
impl SioBuilder {
    /// 串口路径（如 "/dev/ttyUSB0"）
    pub fn serial(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// 命令线所接的状态线（默认 RI）
    pub fn command_pin(mut self, pin: CommandPin) -> Self {
        self.command_pin = pin;
        self
    }

    /// 命令线读数取反
    pub fn invert_command(mut self, invert: bool) -> Self {
        self.invert_command = invert;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// 打开串口并启动轮询线程，接收方向由驱动内部托管
    pub fn build_serial(self) -> Result<SioDriver, DriverError> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| DriverError::InvalidConfig("serial path not set".into()))?;
        let mut line_config = SerialLineConfig::new(path, self.config.default_baudrate);
        line_config.command_pin = self.command_pin;
        line_config.invert_command = self.invert_command;
        if let Some(interval) = self.poll_interval {
            line_config.poll_interval = interval;
        }

        let (line, pump) = SerialLine::open(&line_config)?;
        let (driver, interrupt) = SioDriver::new(line, self.config)?;
        let handle = pump
            .spawn(interrupt, driver.pump_running())
            .map_err(|e| DriverError::WorkerThread(e.to_string()))?;
        Ok(driver.with_pump(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sio_transport::MockSerialPort;

    #[test]
    fn test_builder_applies_config() {
        let (port, _handle) = MockSerialPort::new(38_400);
        let (driver, _interrupt) = SioBuilder::new()
            .default_baudrate(38_400)
            .stream_chunk_size(32)
            .build(port)
            .unwrap();
        assert_eq!(driver.config().default_baudrate, 38_400);
        assert_eq!(driver.config().stream_chunk_size, 32);
        assert_eq!(driver.bus_state().requested_baudrate, 38_400);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let (port, _handle) = MockSerialPort::new(19_200);
        let result = SioBuilder::new().stream_chunk_size(0).build(port);
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }
}
