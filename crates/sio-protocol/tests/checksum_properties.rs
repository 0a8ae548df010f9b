//! 校验和与命令帧的性质测试

use proptest::prelude::*;
use sio_protocol::*;

/// 反码加法的参考实现：非零和等价于模 255 后映射到 1..=255
fn reference_checksum(data: &[u8]) -> u8 {
    let sum: u64 = data.iter().map(|&b| b as u64).sum();
    if sum == 0 { 0 } else { ((sum - 1) % 255 + 1) as u8 }
}

proptest! {
    #[test]
    fn checksum_matches_reference(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(checksum(&data), reference_checksum(&data));
    }

    #[test]
    fn checksum_is_stable(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(checksum(&data), checksum(&data));
    }

    #[test]
    fn incremental_matches_bulk(
        data in proptest::collection::vec(any::<u8>(), 0..256),
        split in 0usize..256
    ) {
        let split = split.min(data.len());
        let mut acc = Checksum::new();
        acc.extend(&data[..split]);
        acc.extend(&data[split..]);
        prop_assert_eq!(acc.value(), checksum(&data));
    }

    #[test]
    fn command_frame_fields_in_receipt_order(device: u8, command: u8, aux1: u8, aux2: u8) {
        let wire = [device, command, aux1, aux2, checksum(&[device, command, aux1, aux2])];
        let frame = CommandFrame::decode(&wire).unwrap();
        prop_assert_eq!(frame.device, device);
        prop_assert_eq!(frame.command, command);
        prop_assert_eq!(frame.aux1, aux1);
        prop_assert_eq!(frame.aux2, aux2);
    }

    #[test]
    fn corrupted_checksum_is_rejected(
        payload in proptest::collection::vec(any::<u8>(), 1..64),
        delta in 1u8..=255
    ) {
        let mut wire = encode_frame(&payload).unwrap();
        let last = wire.len() - 1;
        wire[last] = wire[last].wrapping_add(delta);
        let is_checksum_mismatch = matches!(
            verify_frame(&wire),
            Err(ProtocolError::ChecksumMismatch { .. })
        );
        prop_assert!(is_checksum_mismatch);
    }
}
