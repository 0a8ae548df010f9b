//! 探测外设
//!
//! 只应答 STATUS 命令的最小磁盘：用来确认线缆接法、命令线极性与波特率，
//! 其余命令一律 NAK。

use sio_driver::{Request, SioDevice};
use sio_protocol::{COMMAND_STATUS, Status, is_xf551_high_speed};
use tracing::info;

/// 单密度磁盘、未写保护、电机停止时的 STATUS 应答
pub const DEFAULT_STATUS: [u8; 4] = [0x10, 0xFF, 0xE0, 0x00];

#[derive(Debug, Clone)]
pub struct StatusProbe {
    device_id: u8,
    status: [u8; 4],
    commands_seen: u64,
}

impl StatusProbe {
    pub fn new(device_id: u8) -> Self {
        Self {
            device_id,
            status: DEFAULT_STATUS,
            commands_seen: 0,
        }
    }
}

impl SioDevice for StatusProbe {
    fn on_command(&mut self, request: &mut Request) -> Status {
        self.commands_seen += 1;
        info!(
            "D{:X}: command {:02X} aux {:04X} at {} baud (#{})",
            self.device_id & 0x0F,
            request.command,
            request.aux(),
            request.baudrate(),
            self.commands_seen
        );
        // 高速标志位不影响 STATUS 的语义
        let command = if is_xf551_high_speed(request.command) {
            request.command & 0x7F
        } else {
            request.command
        };
        match command {
            COMMAND_STATUS => Status::Ack,
            _ => Status::Nak,
        }
    }

    fn on_data(&mut self, request: &mut Request) -> Status {
        match request.set_response(&self.status) {
            Ok(()) => Status::Complete,
            Err(_) => Status::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sio_protocol::{COMMAND_READ, CommandFrame, DEVICE_DISK1};

    #[test]
    fn test_probe_answers_status() {
        let mut probe = StatusProbe::new(DEVICE_DISK1);
        let frame = CommandFrame::new(DEVICE_DISK1, COMMAND_STATUS, 0, 0);
        let mut request = Request::from_frame(frame, 19_200);
        assert_eq!(probe.on_command(&mut request), Status::Ack);
        assert_eq!(probe.on_data(&mut request), Status::Complete);
        assert_eq!(request.tx_data(), &DEFAULT_STATUS);
    }

    #[test]
    fn test_probe_naks_other_commands() {
        let mut probe = StatusProbe::new(DEVICE_DISK1);
        let frame = CommandFrame::new(DEVICE_DISK1, COMMAND_READ, 1, 0);
        let mut request = Request::from_frame(frame, 19_200);
        assert_eq!(probe.on_command(&mut request), Status::Nak);
    }
}
