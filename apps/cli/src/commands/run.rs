//! 总线服务命令
//!
//! 打开串口，在指定设备 ID 上挂载探测外设，直到 Ctrl+C。

use crate::config::CliConfig;
use crate::probe::StatusProbe;
use anyhow::{Context, Result, bail};
use clap::Args;
use sio_driver::{MetricsSnapshot, SioBuilder};
use sio_protocol::DEVICE_DISK1;
use sio_transport::CommandPin;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 解析设备 ID（十六进制，可带 `0x` 前缀）
pub fn parse_device_id(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid device id '{}': {}", s, e))
}

/// 运行总线服务
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 串口路径（如 /dev/ttyUSB0、COM3）
    #[arg(short, long)]
    pub port: Option<String>,

    /// 命令线所接的状态线（ri/dsr/cts/dcd）
    #[arg(long)]
    pub command_pin: Option<String>,

    /// 命令线读数取反
    #[arg(long)]
    pub invert: bool,

    /// 标准波特率
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// 需要应答的设备 ID（十六进制，可重复，默认 31 即 D1:）
    #[arg(short, long = "device", value_parser = parse_device_id)]
    pub devices: Vec<u8>,

    /// 配置文件（TOML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 周期性打印统计（秒，0 表示只在退出时打印）
    #[arg(long, default_value_t = 0)]
    pub stats_interval: u64,
}

impl RunCommand {
    pub fn execute(self) -> Result<()> {
        let file = match &self.config {
            Some(path) => CliConfig::load(path)?,
            None => CliConfig::default(),
        };

        // 命令行参数优先于配置文件
        let port = self
            .port
            .clone()
            .or(file.port.clone())
            .context("no serial port given (use --port or set `port` in the config file)")?;
        let command_pin: CommandPin =
            match self.command_pin.as_ref().or(file.command_pin.as_ref()) {
                Some(pin) => pin.parse()?,
                None => CommandPin::default(),
            };
        let invert = self.invert || file.invert_command.unwrap_or(false);
        let mut worker = file.worker.clone();
        if let Some(baud) = self.baud {
            worker.default_baudrate = baud;
        }
        let devices = if !self.devices.is_empty() {
            self.devices.clone()
        } else if !file.devices.is_empty() {
            file.devices.clone()
        } else {
            vec![DEVICE_DISK1]
        };

        let driver = SioBuilder::new()
            .worker_config(worker)
            .serial(port.clone())
            .command_pin(command_pin)
            .invert_command(invert)
            .build_serial()
            .with_context(|| format!("failed to start SIO driver on {}", port))?;

        for &id in &devices {
            if !driver.attach(id, StatusProbe::new(id))? {
                bail!("device registry full, cannot attach 0x{:02X}", id);
            }
        }
        info!(
            "Serving {} on {} ({:?}{}), Ctrl+C to stop",
            devices
                .iter()
                .map(|id| format!("0x{:02X}", id))
                .collect::<Vec<_>>()
                .join(", "),
            port,
            command_pin,
            if invert { ", inverted" } else { "" }
        );

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        ctrlc::set_handler(move || {
            flag.store(false, Ordering::Release);
        })
        .context("failed to set Ctrl+C handler")?;

        let interval = Duration::from_secs(self.stats_interval);
        let mut last_report = Instant::now();
        while running.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(100));
            if !driver.is_healthy() {
                warn!("SIO worker stopped unexpectedly");
                break;
            }
            if !interval.is_zero() && last_report.elapsed() >= interval {
                last_report = Instant::now();
                print_metrics(&driver.metrics());
            }
        }

        let metrics = driver.metrics();
        let state = driver.bus_state();
        driver.shutdown();

        print_metrics(&metrics);
        println!(
            "Final baud rate: {} (requested {}, alternate {})",
            state.current_baudrate, state.requested_baudrate, state.alternate_baudrate
        );
        Ok(())
    }
}

fn print_metrics(m: &MetricsSnapshot) {
    println!("SIO bus statistics:");
    println!("  command line asserted: {}", m.command_assertions);
    println!("  command frames:        {}", m.command_frames);
    println!("  data frames:           {}", m.data_frames);
    println!(
        "  frame errors:          {} (checksum {}, interrupted {}, {:.1}%)",
        m.frame_errors(),
        m.checksum_errors,
        m.command_reasserts,
        m.frame_error_rate()
    );
    println!("  unclaimed commands:    {}", m.unclaimed_commands);
    println!("  superseded:            {}", m.superseded_transactions);
    println!("  slow commands:         {}", m.slow_commands);
    println!("  baud swaps / changes:  {} / {}", m.baud_swaps, m.baud_changes);
    println!("  bytes sent:            {}", m.tx_bytes);
    println!(
        "  stream bytes:          {} ({} dropped)",
        m.stream_rx_bytes, m.stream_rx_dropped
    );
    println!("  transport errors:      {}", m.transport_errors);
}
