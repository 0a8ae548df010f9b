//! 设备 ID 与常用命令码
//!
//! 总线驱动本身不强制任何 ID 映射，这里只是参考总线上的惯用值。

/// 软驱 D1
pub const DEVICE_DISK1: u8 = 0x31;
/// 软驱 D2
pub const DEVICE_DISK2: u8 = 0x32;
/// 软驱 D3
pub const DEVICE_DISK3: u8 = 0x33;
/// 软驱 D4
pub const DEVICE_DISK4: u8 = 0x34;
/// 850 串口扩展 R1
pub const DEVICE_SERIAL1: u8 = 0x50;

/// 软驱 D1..D4
pub const DISK_DEVICES: [u8; 4] = [DEVICE_DISK1, DEVICE_DISK2, DEVICE_DISK3, DEVICE_DISK4];

// ============================================================================
// 命令码
// ============================================================================

/// 读取设备状态（4 字节应答）
pub const COMMAND_STATUS: u8 = 0x53;
/// 读扇区
pub const COMMAND_READ: u8 = 0x52;
/// 写扇区（带校验）
pub const COMMAND_WRITE: u8 = 0x57;
/// 写扇区（不校验）
pub const COMMAND_PUT: u8 = 0x50;
/// 获取高速索引（US Doubler）
pub const COMMAND_GET_HIGH_SPEED_INDEX: u8 = 0x3F;

/// XF551 高速命令标志位
///
/// XF551 把普通命令码的最高位置 1 表示「数据阶段使用 38400 波特」。
pub const XF551_HIGH_SPEED_FLAG: u8 = 0x80;

/// 判断命令码是否为 XF551 高速变体
pub const fn is_xf551_high_speed(command: u8) -> bool {
    command & XF551_HIGH_SPEED_FLAG != 0
}
