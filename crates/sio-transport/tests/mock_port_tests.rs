//! Mock 串口跨线程行为测试

use sio_transport::mock::MockEvent;
use sio_transport::{MockSerialPort, SerialPort};
use std::thread;
use std::time::Duration;

#[test]
fn test_writes_from_another_thread_are_observed_in_order() {
    let (mut port, mut handle) = MockSerialPort::new(19_200);

    let writer = thread::spawn(move || {
        port.write(&[0x41]).unwrap();
        port.set_baudrate(38_400).unwrap();
        port.write(&[0x43]).unwrap();
        port
    });

    assert_eq!(
        handle.recv_event(Duration::from_secs(1)),
        Some(MockEvent::Write(vec![0x41]))
    );
    assert_eq!(
        handle.recv_event(Duration::from_secs(1)),
        Some(MockEvent::Baudrate(38_400))
    );
    assert_eq!(
        handle.recv_event(Duration::from_secs(1)),
        Some(MockEvent::Write(vec![0x43]))
    );

    let _port = writer.join().unwrap();
    assert_eq!(handle.baudrate(), 38_400);
}

#[test]
fn test_boxed_port_forwards() {
    let (port, mut handle) = MockSerialPort::new(19_200);
    let mut boxed: Box<dyn SerialPort> = Box::new(port);
    boxed.write(&[1, 2, 3]).unwrap();
    boxed.flush().unwrap();
    assert_eq!(handle.recv_bytes(3, Duration::from_millis(200)), vec![1, 2, 3]);
}
