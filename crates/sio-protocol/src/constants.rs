//! 协议常量定义

/// 命令帧负载长度（Device, Command, Aux1, Aux2）
pub const COMMAND_FRAME_SIZE: usize = 4;

/// 单帧最大负载长度（不含校验和）
///
/// 数据阶段的 `rx_size` 以及响应负载都不能超过此值。
pub const MAX_FRAME_SIZE: usize = 2048;

/// 总线默认波特率
pub const DEFAULT_BAUDRATE: u32 = 19_200;

/// POKEY 芯片时钟频率（Hz）
///
/// PAL 为 1.7734MHz，NTSC 为 1.7898MHz，这里取两者之间的折中值。
pub const POKEY_CLOCK: u32 = 1_780_000;

/// XF551 高速模式波特率
pub const XF551_BAUDRATE: u32 = 38_400;

/// 命令阶段 ACK/NAK 的响应预算（毫秒）
pub const COMMAND_ACK_BUDGET_MS: u64 = 16;

/// 由高速索引（US Doubler / Happy 等）计算实际波特率
///
/// POKEY 的串口分频公式为 `clock / 2 / (7 + index)`。
///
/// # 示例
///
/// ```
/// use sio_protocol::pokey_baudrate;
///
/// // 索引 40 对应标准的 ~19200
/// assert_eq!(pokey_baudrate(40), 18_936);
/// // 索引 10 对应 US Doubler 常用的 ~52k
/// assert_eq!(pokey_baudrate(10), 52_352);
/// ```
pub const fn pokey_baudrate(index: u8) -> u32 {
    POKEY_CLOCK / 2 / (7 + index as u32)
}
