//! 设备注册表
//!
//! 固定 8 个槽位，按设备 ID 线性查找。注册表只由协议工作线程持有，
//! 应用线程的 attach/detach 通过控制通道转交给工作线程执行，
//! 因此回调运行期间注册表不会被并发修改。

use crate::{Request, SioDevice};
use sio_protocol::Status;
use tracing::debug;

/// 注册表容量
pub const MAX_DEVICES: usize = 8;

struct Slot {
    device_id: u8,
    device: Box<dyn SioDevice>,
}

/// 设备 ID → 外设
pub struct DeviceRegistry {
    slots: [Option<Slot>; MAX_DEVICES],
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// 挂载外设到第一个空槽位，满时返回 `false`
    ///
    /// 不检查重复 ID：同一 ID 挂载两次时，查找总是命中靠前的槽位。
    pub fn attach(&mut self, device_id: u8, device: Box<dyn SioDevice>) -> bool {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(Slot { device_id, device });
                debug!("Attached SIO device 0x{:02X}", device_id);
                true
            },
            None => false,
        }
    }

    /// 卸载第一个匹配 ID 的外设
    pub fn detach(&mut self, device_id: u8) -> Option<Box<dyn SioDevice>> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(s) if s.device_id == device_id))?;
        let removed = slot.take().map(|s| s.device);
        debug!("Detached SIO device 0x{:02X}", device_id);
        removed
    }

    pub fn contains(&self, device_id: u8) -> bool {
        self.find(device_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_DEVICES
    }

    /// 已挂载的设备 ID（按槽位顺序）
    pub fn device_ids(&self) -> Vec<u8> {
        self.slots.iter().flatten().map(|s| s.device_id).collect()
    }

    /// 调用命令回调；未挂载该 ID 时返回 [`Status::NoResponse`]
    pub fn dispatch_command(&mut self, request: &mut Request) -> Status {
        match self.find_mut(request.device) {
            Some(device) => device.on_command(request),
            None => Status::NoResponse,
        }
    }

    /// 调用执行回调；未挂载该 ID 时返回 [`Status::NoResponse`]
    pub fn dispatch_data(&mut self, request: &mut Request) -> Status {
        match self.find_mut(request.device) {
            Some(device) => device.on_data(request),
            None => Status::NoResponse,
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    fn find(&self, device_id: u8) -> Option<&Slot> {
        self.slots.iter().flatten().find(|s| s.device_id == device_id)
    }

    fn find_mut(&mut self, device_id: u8) -> Option<&mut Box<dyn SioDevice>> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|s| s.device_id == device_id)
            .map(|s| &mut s.device)
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.device_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CallbackDevice;
    use sio_protocol::CommandFrame;

    fn answering(status: Status) -> Box<dyn SioDevice> {
        Box::new(CallbackDevice::new(
            move |_: &mut Request| status,
            |_: &mut Request| Status::Complete,
        ))
    }

    fn request_for(device: u8) -> Request {
        Request::from_frame(CommandFrame::new(device, 0x53, 0, 0), 19_200)
    }

    #[test]
    fn test_registry_capacity() {
        let mut registry = DeviceRegistry::new();
        for id in 0..MAX_DEVICES as u8 {
            assert!(registry.attach(0x31 + id, answering(Status::Ack)));
        }
        assert!(registry.is_full());
        assert!(!registry.attach(0x50, answering(Status::Ack)));
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_detach_frees_slot() {
        let mut registry = DeviceRegistry::new();
        for id in 0..MAX_DEVICES as u8 {
            registry.attach(0x31 + id, answering(Status::Ack));
        }
        assert!(registry.detach(0x33).is_some());
        assert!(!registry.contains(0x33));
        assert!(registry.detach(0x33).is_none());
        assert!(registry.attach(0x50, answering(Status::Ack)));
        // 新设备填入被释放的槽位
        assert_eq!(registry.device_ids()[2], 0x50);
    }

    #[test]
    fn test_duplicate_id_hits_first_slot() {
        let mut registry = DeviceRegistry::new();
        registry.attach(0x31, answering(Status::Ack));
        registry.attach(0x31, answering(Status::Nak));

        let mut request = request_for(0x31);
        assert_eq!(registry.dispatch_command(&mut request), Status::Ack);

        // 卸载第一个后命中第二个
        registry.detach(0x31);
        assert_eq!(registry.dispatch_command(&mut request), Status::Nak);
    }

    #[test]
    fn test_unknown_device_no_response() {
        let mut registry = DeviceRegistry::new();
        registry.attach(0x31, answering(Status::Ack));
        let mut request = request_for(0x40);
        assert_eq!(registry.dispatch_command(&mut request), Status::NoResponse);
        assert_eq!(registry.dispatch_data(&mut request), Status::NoResponse);
    }

    #[test]
    fn test_clear() {
        let mut registry = DeviceRegistry::new();
        registry.attach(0x31, answering(Status::Ack));
        registry.clear();
        assert!(registry.is_empty());
    }
}
