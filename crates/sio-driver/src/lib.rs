//! # SIO Driver
//!
//! Atari SIO 外设侧总线驱动：
//!
//! - 命令线监视器 + 帧装配器（接收上下文，[`BusInterrupt`]）
//! - 协议工作线程（应答、数据阶段、波特率协商、流模式）
//! - 设备注册表（最多 8 个外设，[`SioDevice`]）
//!
//! ## 线程模型
//!
//! ```text
//! 传输后端 ──LineSink──► BusInterrupt ──事件队列──► 工作线程 ──► SerialPort
//!                          │  阶段字（原子）   ▲          │
//!                          └───────────────────┘          └─► SioDevice 回调
//! 应用线程 ──控制通道（attach/detach/流回调）──► 工作线程
//! ```
//!
//! 接收侧与工作线程之间只通过阶段字和事件队列同步；注册表只在工作线程上访问。

mod assembler;
mod baud;
mod builder;
mod device;
mod driver;
mod error;
mod interrupt;
pub mod metrics;
pub mod phase;
mod registry;
mod request;
mod state;
mod stream;
mod worker;

pub use assembler::{
    AssemblerOutput, FrameAssembler, FrameFault, FrameFaultKind, FramePool, ReceivedFrame,
};
pub use baud::{BAUD_SWAP_THRESHOLD, BaudNegotiator};
pub use builder::SioBuilder;
pub use device::{CallbackDevice, SioDevice};
pub use driver::SioDriver;
pub use error::DriverError;
pub use interrupt::BusInterrupt;
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use phase::{AtomicPhase, BusPhase, PhaseSnapshot};
pub use registry::{DeviceRegistry, MAX_DEVICES};
pub use request::{BaudChange, Request};
pub use state::BusState;
pub use stream::{CallbackStream, StreamHandle, StreamHandler};
pub use worker::WorkerConfig;

// 常用的下层类型
pub use sio_protocol::{CommandFrame, Status};
pub use sio_transport::{CommandLevel, LineSink, SerialPort, TransportError};
