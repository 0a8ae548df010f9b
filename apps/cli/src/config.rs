//! CLI 配置文件
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! command_pin = "ri"
//! invert_command = false
//! devices = [0x31, 0x32]
//!
//! [worker]
//! default_baudrate = 19200
//! response_delay_us = 1000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use sio_driver::WorkerConfig;
use std::fs;
use std::path::Path;

/// CLI 配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// 串口路径
    pub port: Option<String>,
    /// 命令线所接的状态线（ri/dsr/cts/dcd）
    pub command_pin: Option<String>,
    /// 命令线读数取反
    pub invert_command: Option<bool>,
    /// 需要应答的设备 ID
    pub devices: Vec<u8>,
    /// 工作线程配置
    pub worker: WorkerConfig,
}

impl CliConfig {
    /// 加载配置文件
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = CliConfig::parse(
            r#"
            port = "/dev/ttyUSB0"
            command_pin = "dsr"
            invert_command = true
            devices = [0x31, 0x32]

            [worker]
            default_baudrate = 19200
            response_delay_us = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.command_pin.as_deref(), Some("dsr"));
        assert_eq!(config.invert_command, Some(true));
        assert_eq!(config.devices, vec![0x31, 0x32]);
        assert_eq!(config.worker.response_delay_us, 500);
        // 未给出的字段取默认值
        assert_eq!(config.worker.stream_chunk_size, 64);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = CliConfig::parse("").unwrap();
        assert!(config.port.is_none());
        assert!(config.devices.is_empty());
        assert_eq!(config.worker, WorkerConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(CliConfig::parse("baud = 19200").is_err());
    }
}
