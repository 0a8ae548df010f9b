//! 校验和计算命令

use anyhow::{Context, Result};
use clap::Args;
use sio_protocol::{checksum, encode_frame};

/// 计算一段十六进制字节的 SIO 校验和
#[derive(Args, Debug)]
pub struct ChecksumCommand {
    /// 十六进制字节（可用空格、冒号分隔，如 "31 53 00 00"）
    #[arg(required = true, num_args = 1..)]
    pub bytes: Vec<String>,

    /// 输出附带校验和的完整帧
    #[arg(long)]
    pub frame: bool,
}

impl ChecksumCommand {
    pub fn execute(self) -> Result<()> {
        let data = parse_hex(&self.bytes)?;
        if self.frame {
            let wire = encode_frame(&data)?;
            println!("{}", hex::encode_upper(wire));
        } else {
            println!("0x{:02X}", checksum(&data));
        }
        Ok(())
    }
}

/// 解析十六进制输入，忽略空白、冒号与 `0x` 前缀
pub fn parse_hex(parts: &[String]) -> Result<Vec<u8>> {
    let joined: String = parts
        .iter()
        .flat_map(|part| part.split(|c: char| c.is_whitespace() || c == ':' || c == ','))
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    hex::decode(&joined).with_context(|| format!("invalid hex input '{}'", joined))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_hex_separators() {
        assert_eq!(parse_hex(&args(&["31530000"])).unwrap(), vec![0x31, 0x53, 0, 0]);
        assert_eq!(
            parse_hex(&args(&["0x31", "53", "00:00"])).unwrap(),
            vec![0x31, 0x53, 0, 0]
        );
        assert!(parse_hex(&args(&["3"])).is_err());
        assert!(parse_hex(&args(&["zz"])).is_err());
    }

    #[test]
    fn test_status_frame_checksum() {
        let data = parse_hex(&args(&["31 53 00 00"])).unwrap();
        assert_eq!(checksum(&data), 0x84);
        assert_eq!(hex::encode_upper(encode_frame(&data).unwrap()), "3153000084");
    }
}
