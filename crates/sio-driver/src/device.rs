//! 外设接口
//!
//! 每个外设实现两个回调：
//!
//! - [`SioDevice::on_command`]：命令帧到达后立即调用（16ms 应答预算内），
//!   决定 ACK/NAK、是否有数据阶段、是否切换波特率；
//! - [`SioDevice::on_data`]：真正执行命令（数据阶段结束后，或 ACK 之后
//!   无数据阶段时立即调用），填写应答负载并返回 COMPLETE/ERROR。
//!
//! 两个回调都在协议工作线程上运行，不应长时间阻塞。

use crate::Request;
use sio_protocol::Status;

/// SIO 外设
pub trait SioDevice: Send {
    /// 命令帧回调
    fn on_command(&mut self, request: &mut Request) -> Status;

    /// 执行回调
    fn on_data(&mut self, request: &mut Request) -> Status;
}

impl<D: SioDevice + ?Sized> SioDevice for Box<D> {
    fn on_command(&mut self, request: &mut Request) -> Status {
        (**self).on_command(request)
    }

    fn on_data(&mut self, request: &mut Request) -> Status {
        (**self).on_data(request)
    }
}

/// 由两个闭包组成的外设
///
/// ```rust
/// use sio_driver::{CallbackDevice, Request, SioDevice};
/// use sio_protocol::{CommandFrame, Status};
///
/// let mut device = CallbackDevice::new(
///     |_req: &mut Request| Status::Ack,
///     |req: &mut Request| {
///         req.set_response(&[0x10, 0xFF, 0xE0, 0x00]).ok();
///         Status::Complete
///     },
/// );
/// let mut request = Request::from_frame(CommandFrame::new(0x31, 0x53, 0, 0), 19_200);
/// assert_eq!(device.on_command(&mut request), Status::Ack);
/// assert_eq!(device.on_data(&mut request), Status::Complete);
/// assert_eq!(request.tx_size(), 4);
/// ```
pub struct CallbackDevice<C, D> {
    command: C,
    data: D,
}

impl<C, D> CallbackDevice<C, D>
where
    C: FnMut(&mut Request) -> Status + Send,
    D: FnMut(&mut Request) -> Status + Send,
{
    pub fn new(command: C, data: D) -> Self {
        Self { command, data }
    }
}

impl<C, D> SioDevice for CallbackDevice<C, D>
where
    C: FnMut(&mut Request) -> Status + Send,
    D: FnMut(&mut Request) -> Status + Send,
{
    fn on_command(&mut self, request: &mut Request) -> Status {
        (self.command)(request)
    }

    fn on_data(&mut self, request: &mut Request) -> Status {
        (self.data)(request)
    }
}

impl<C, D> std::fmt::Debug for CallbackDevice<C, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDevice").finish_non_exhaustive()
    }
}
