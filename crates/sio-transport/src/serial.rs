//! 串口后端（SIO2PC 线缆）
//!
//! 主机侧 USB 串口直连 Atari SIO：TXD/RXD 接数据线，COMMAND 接到某根
//! 调制解调器状态线（常见为 RI，也有 DSR/CTS/DCD 的接法）。
//!
//! 状态线不能产生中断，这里用一个轮询线程（[`LinePump`]）先采样命令线、
//! 再读取已到达的字节，保证「命令线拉低」事件先于该命令帧的字节送达
//! [`LineSink`]。

use crate::{
    CommandLevel, LineSink, SerialPort, TransportDeviceError, TransportDeviceErrorKind,
    TransportError,
};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 命令线所接的调制解调器状态线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandPin {
    /// Ring Indicator（SIO2PC 默认接法）
    #[default]
    Ri,
    /// Data Set Ready
    Dsr,
    /// Clear To Send
    Cts,
    /// Data Carrier Detect
    Dcd,
}

impl std::str::FromStr for CommandPin {
    type Err = TransportDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ri" => Ok(CommandPin::Ri),
            "dsr" => Ok(CommandPin::Dsr),
            "cts" => Ok(CommandPin::Cts),
            "dcd" => Ok(CommandPin::Dcd),
            other => Err(TransportDeviceError::new(
                TransportDeviceErrorKind::UnsupportedConfig,
                format!("unknown command pin '{other}' (expected ri/dsr/cts/dcd)"),
            )),
        }
    }
}

/// 串口线路配置
#[derive(Debug, Clone)]
pub struct SerialLineConfig {
    /// 串口路径（如 "/dev/ttyUSB0"、"COM3"）
    pub path: String,
    /// 初始波特率
    pub baudrate: u32,
    /// 命令线所在的状态线
    pub command_pin: CommandPin,
    /// 状态线读数取反（线缆未经反相电平转换时使用）
    pub invert_command: bool,
    /// 轮询周期（同时也是读超时）
    pub poll_interval: Duration,
}

impl SerialLineConfig {
    pub fn new(path: impl Into<String>, baudrate: u32) -> Self {
        Self {
            path: path.into(),
            baudrate,
            command_pin: CommandPin::default(),
            invert_command: false,
            poll_interval: Duration::from_micros(500),
        }
    }
}

fn map_serial_error(e: serialport::Error) -> TransportError {
    let kind = match e.kind() {
        serialport::ErrorKind::NoDevice => TransportDeviceErrorKind::NotFound,
        serialport::ErrorKind::InvalidInput => TransportDeviceErrorKind::UnsupportedConfig,
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
            TransportDeviceErrorKind::AccessDenied
        },
        serialport::ErrorKind::Io(ErrorKind::ResourceBusy) => TransportDeviceErrorKind::Busy,
        serialport::ErrorKind::Io(_) => TransportDeviceErrorKind::Backend,
        _ => TransportDeviceErrorKind::Unknown,
    };
    TransportError::Device(TransportDeviceError::new(kind, e.description))
}

/// 串口发送端
pub struct SerialLine {
    port: Box<dyn serialport::SerialPort>,
    baudrate: u32,
}

/// 串口接收端轮询器
pub struct LinePump {
    port: Box<dyn serialport::SerialPort>,
    command_pin: CommandPin,
    invert_command: bool,
}

impl SerialLine {
    /// 打开串口，返回发送端与接收端轮询器
    ///
    /// 两者共享同一个底层文件描述符，发送端切换波特率对接收端同样生效。
    pub fn open(config: &SerialLineConfig) -> Result<(Self, LinePump), TransportError> {
        let port = serialport::new(&config.path, config.baudrate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.poll_interval)
            .open()
            .map_err(map_serial_error)?;
        let reader = port.try_clone().map_err(map_serial_error)?;

        info!(
            "Opened SIO serial line {} at {} baud (command on {:?}{})",
            config.path,
            config.baudrate,
            config.command_pin,
            if config.invert_command { ", inverted" } else { "" }
        );

        Ok((
            Self {
                port,
                baudrate: config.baudrate,
            },
            LinePump {
                port: reader,
                command_pin: config.command_pin,
                invert_command: config.invert_command,
            },
        ))
    }
}

impl SerialPort for SerialLine {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), TransportError> {
        if baudrate == self.baudrate {
            return Ok(());
        }
        // 先把排队中的字节（通常是 ACK）发完
        self.port.flush()?;
        self.port.set_baud_rate(baudrate).map_err(map_serial_error)?;
        debug!("Serial line baud rate {} -> {}", self.baudrate, baudrate);
        self.baudrate = baudrate;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port.flush()?;
        Ok(())
    }
}

impl LinePump {
    fn read_command_asserted(&mut self) -> Result<bool, TransportError> {
        let active = match self.command_pin {
            CommandPin::Ri => self.port.read_ring_indicator(),
            CommandPin::Dsr => self.port.read_data_set_ready(),
            CommandPin::Cts => self.port.read_clear_to_send(),
            CommandPin::Dcd => self.port.read_carrier_detect(),
        }
        .map_err(map_serial_error)?;
        Ok(active != self.invert_command)
    }

    /// 在当前线程运行轮询循环，直到 `running` 变为 `false` 或串口出现致命错误
    pub fn run(mut self, mut sink: impl LineSink, running: Arc<AtomicBool>) {
        let mut asserted = false;
        let mut buffer = [0u8; 256];

        while running.load(Ordering::Acquire) {
            // 1. 先采样命令线
            match self.read_command_asserted() {
                Ok(now) if now != asserted => {
                    asserted = now;
                    trace!("Command line {}", if now { "asserted" } else { "released" });
                    sink.on_command_line(if now {
                        CommandLevel::Asserted
                    } else {
                        CommandLevel::Released
                    });
                },
                Ok(_) => {},
                Err(e) => warn!("Failed to sample command line: {}", e),
            }

            // 2. 再读数据（读超时即轮询周期）
            match self.port.read(&mut buffer) {
                Ok(0) => {},
                Ok(n) => sink.on_bytes(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {},
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => {
                    error!("Serial line read failed, stopping pump: {}", e);
                    break;
                },
            }
        }

        debug!("Serial line pump exited");
    }

    /// 在独立线程中运行轮询循环
    pub fn spawn(
        self,
        sink: impl LineSink + 'static,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("sio-line-pump".into())
            .spawn(move || self.run(sink, running))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pin_from_str() {
        assert_eq!("RI".parse::<CommandPin>().unwrap(), CommandPin::Ri);
        assert_eq!("dsr".parse::<CommandPin>().unwrap(), CommandPin::Dsr);
        let err = "rts".parse::<CommandPin>().unwrap_err();
        assert_eq!(err.kind, TransportDeviceErrorKind::UnsupportedConfig);
    }

    #[test]
    fn test_serial_line_config_defaults() {
        let config = SerialLineConfig::new("/dev/ttyUSB0", 19_200);
        assert_eq!(config.command_pin, CommandPin::Ri);
        assert!(!config.invert_command);
        assert_eq!(config.poll_interval, Duration::from_micros(500));
    }
}
