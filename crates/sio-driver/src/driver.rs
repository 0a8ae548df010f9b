//! SIO 驱动句柄
//!
//! [`SioDriver`] 拥有协议工作线程，向应用提供设备挂载、流模式与状态查询接口；
//! 配套的 [`BusInterrupt`] 交给传输后端，作为接收方向的入口。

use crate::assembler::{DEFAULT_POOL_DEPTH, FrameAssembler, FramePool};
use crate::error::DriverError;
use crate::interrupt::BusInterrupt;
use crate::metrics::MetricsSnapshot;
use crate::phase::BusPhase;
use crate::request::Request;
use crate::state::{BusContext, BusState};
use crate::stream::StreamHandle;
use crate::worker::{Control, ProtocolWorker, WorkerConfig};
use crate::{CallbackDevice, SioDevice, StreamHandler};
use crossbeam_channel::{Sender, bounded};
use sio_protocol::Status;
use sio_transport::SerialPort;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, ThreadId, spawn};
use std::time::Duration;
use tracing::{error, info};

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        // 看门狗线程代为 join，超时后放任它继续运行
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// SIO 总线驱动
///
/// # Example
///
/// ```
/// use sio_driver::{SioDriver, WorkerConfig};
/// use sio_protocol::{Status, DEVICE_DISK1};
/// use sio_transport::MockSerialPort;
///
/// let (port, _handle) = MockSerialPort::new(19_200);
/// let (driver, _interrupt) = SioDriver::new(port, WorkerConfig::default()).unwrap();
/// let attached = driver
///     .attach_fn(DEVICE_DISK1, |_| Status::Ack, |_| Status::Complete)
///     .unwrap();
/// assert!(attached);
/// ```
pub struct SioDriver {
    ctx: Arc<BusContext>,
    control: Option<Sender<Control>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
    /// 传输后端线程（串口轮询器）
    pump: Option<JoinHandle<()>>,
    pump_running: Arc<AtomicBool>,
    config: WorkerConfig,
}

impl SioDriver {
    /// 创建驱动并启动工作线程
    ///
    /// 返回的 [`BusInterrupt`] 需要交给传输后端（中断处理函数或轮询线程）。
    pub fn new(
        port: impl SerialPort + 'static,
        config: WorkerConfig,
    ) -> Result<(Self, BusInterrupt), DriverError> {
        config.validate().map_err(DriverError::InvalidConfig)?;

        let (events_tx, events_rx) = bounded(config.event_queue_capacity);
        let (control_tx, control_rx) = bounded(4);
        let (stream_tx, stream_rx) = bounded(config.stream_buffer_size);
        let pool = FramePool::new(DEFAULT_POOL_DEPTH);

        let ctx = Arc::new(BusContext::new(
            Box::new(port),
            config.default_baudrate,
            events_tx,
        ));
        let interrupt =
            BusInterrupt::new(ctx.clone(), FrameAssembler::new(pool.clone()), stream_tx);
        let worker = ProtocolWorker::new(ctx.clone(), config.clone(), stream_rx, pool);

        let handle = std::thread::Builder::new()
            .name("sio-worker".into())
            .spawn(move || worker.run(events_rx, control_rx))
            .map_err(|e| DriverError::WorkerThread(e.to_string()))?;
        let worker_id = handle.thread().id();

        info!(
            "SIO driver started at {} baud (response delay {}us)",
            config.default_baudrate, config.response_delay_us
        );

        Ok((
            Self {
                ctx,
                control: Some(control_tx),
                worker: Some(handle),
                worker_id,
                pump: None,
                pump_running: Arc::new(AtomicBool::new(true)),
                config,
            },
            interrupt,
        ))
    }

    /// 托管传输后端线程（Drop 时一并停止）
    #[cfg_attr(not(feature = "serial"), allow(dead_code))]
    pub(crate) fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    #[cfg_attr(not(feature = "serial"), allow(dead_code))]
    pub(crate) fn pump_running(&self) -> Arc<AtomicBool> {
        self.pump_running.clone()
    }

    /// 挂载外设，注册表已满时返回 `Ok(false)`
    pub fn attach(
        &self,
        device_id: u8,
        device: impl SioDevice + 'static,
    ) -> Result<bool, DriverError> {
        self.attach_boxed(device_id, Box::new(device))
    }

    pub fn attach_boxed(
        &self,
        device_id: u8,
        device: Box<dyn SioDevice>,
    ) -> Result<bool, DriverError> {
        self.request(|reply| Control::Attach {
            device_id,
            device,
            reply,
        })
    }

    /// 以两个闭包挂载外设
    pub fn attach_fn<C, D>(&self, device_id: u8, command: C, data: D) -> Result<bool, DriverError>
    where
        C: FnMut(&mut Request) -> Status + Send + 'static,
        D: FnMut(&mut Request) -> Status + Send + 'static,
    {
        self.attach(device_id, CallbackDevice::new(command, data))
    }

    /// 卸载第一个匹配 ID 的外设并交还
    pub fn detach(&self, device_id: u8) -> Result<Option<Box<dyn SioDevice>>, DriverError> {
        self.request(|reply| Control::Detach { device_id, reply })
    }

    /// 已挂载的设备 ID
    pub fn attached_devices(&self) -> Result<Vec<u8>, DriverError> {
        self.request(|reply| Control::DeviceIds { reply })
    }

    /// 安装流模式回调（替换之前的回调）
    pub fn set_stream_callbacks(
        &self,
        handler: impl StreamHandler + 'static,
    ) -> Result<(), DriverError> {
        let handler: Box<dyn StreamHandler> = Box::new(handler);
        self.request(|reply| Control::SetStreamHandler {
            handler: Some(handler),
            reply,
        })
    }

    pub fn clear_stream_callbacks(&self) -> Result<(), DriverError> {
        self.request(|reply| Control::SetStreamHandler {
            handler: None,
            reply,
        })
    }

    /// 立即进入流模式
    pub fn activate_stream_mode(&self) {
        self.stream_handle().activate_stream_mode();
    }

    /// 通知工作线程有流数据待发送
    pub fn wake_stream_tx(&self) {
        self.stream_handle().wake_stream_tx();
    }

    /// 可克隆、可跨线程使用的流控制句柄
    pub fn stream_handle(&self) -> StreamHandle {
        StreamHandle::new(self.ctx.clone())
    }

    /// 当前总线阶段
    pub fn phase(&self) -> BusPhase {
        self.ctx.phase.load().phase
    }

    /// 工作线程最近发布的状态快照
    pub fn bus_state(&self) -> BusState {
        **self.ctx.state.load()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.ctx.metrics.reset();
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// 工作线程是否仍在运行
    pub fn is_healthy(&self) -> bool {
        self.ctx.is_running() && self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 停止工作线程并释放串口
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Control) -> Result<T, DriverError> {
        if std::thread::current().id() == self.worker_id {
            return Err(DriverError::CalledFromWorker);
        }
        let control = self.control.as_ref().ok_or(DriverError::ChannelClosed)?;
        let (reply_tx, reply_rx) = bounded(1);
        control
            .send_timeout(make(reply_tx), self.config.control_timeout())
            .map_err(|e| match e {
                crossbeam_channel::SendTimeoutError::Timeout(_) => DriverError::Timeout,
                crossbeam_channel::SendTimeoutError::Disconnected(_) => DriverError::ChannelClosed,
            })?;
        reply_rx
            .recv_timeout(self.config.control_timeout())
            .map_err(|e| match e {
                crossbeam_channel::RecvTimeoutError::Timeout => DriverError::Timeout,
                crossbeam_channel::RecvTimeoutError::Disconnected => DriverError::ChannelClosed,
            })
    }

    fn stop(&mut self) {
        self.pump_running.store(false, Ordering::Release);
        // 先清运行标志，正在连续发送流数据的工作线程据此尽快返回主循环
        self.ctx.running.store(false, Ordering::Release);
        if let Some(control) = self.control.take() {
            let _ = control.try_send(Control::Shutdown);
            // 丢弃 Sender，工作线程即使错过 Shutdown 也会因通道断开而退出
            drop(control);
        }

        let timeout = self.config.shutdown_timeout();
        if let Some(handle) = self.worker.take()
            && let Err(_e) = handle.join_timeout(timeout)
        {
            error!("SIO worker panicked or failed to shut down within {:?}", timeout);
        }
        if let Some(handle) = self.pump.take()
            && let Err(_e) = handle.join_timeout(timeout)
        {
            error!("SIO line pump failed to shut down within {:?}", timeout);
        }
    }
}

impl Drop for SioDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SioDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SioDriver")
            .field("phase", &self.phase())
            .field("state", &self.bus_state())
            .finish_non_exhaustive()
    }
}
