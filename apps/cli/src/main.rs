//! # SIO CLI
//!
//! 通过 SIO2PC 线缆把 PC 挂到 Atari SIO 总线上。
//!
//! ```bash
//! # 在 D1: 上应答 STATUS，Ctrl+C 退出并打印统计
//! sio-cli run --port /dev/ttyUSB0 --device 31
//!
//! # 使用配置文件（命令行参数优先）
//! sio-cli run --config sio.toml
//!
//! # 计算校验和
//! sio-cli checksum 31530000
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod probe;

use commands::{ChecksumCommand, RunCommand};

/// SIO CLI - Atari SIO 总线工具
#[derive(Parser, Debug)]
#[command(name = "sio-cli")]
#[command(about = "Serve Atari SIO peripherals over an SIO2PC cable", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在总线上运行探测外设
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 计算 SIO 校验和
    Checksum {
        #[command(flatten)]
        args: ChecksumCommand,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sio_cli=info".parse()?)
                .add_directive("sio_driver=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Checksum { args } => args.execute(),
    }
}
