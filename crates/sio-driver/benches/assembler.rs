//! 接收路径性能基准测试
//!
//! 帧装配在中断上下文运行，逐字节开销决定了高速率下的余量。

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sio_driver::{BusPhase, FrameAssembler, FramePool, PhaseSnapshot};
use sio_protocol::{CommandFrame, MAX_FRAME_SIZE, checksum};

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    for size in [4usize, 128, 256, MAX_FRAME_SIZE] {
        let data: Vec<u8> = (0..size).map(|i| (i * 7) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| checksum(black_box(data)))
        });
    }
    group.finish();
}

fn bench_command_frame(c: &mut Criterion) {
    let pool = FramePool::new(4);
    let mut assembler = FrameAssembler::new(pool.clone());
    let wire = CommandFrame::new(0x31, 0x53, 0x00, 0x00).encode();
    let mut epoch = 0u32;

    c.bench_function("assemble_command_frame", |b| {
        b.iter(|| {
            epoch = epoch.wrapping_add(1);
            let phase = PhaseSnapshot::new(epoch, BusPhase::Command, wire.len() - 1);
            for &byte in &wire {
                if let Some(sio_driver::AssemblerOutput::Frame(frame)) =
                    assembler.push(phase, black_box(byte))
                {
                    pool.release(frame.data);
                }
            }
        })
    });
}

fn bench_data_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_data_frame");
    for size in [128usize, 256, MAX_FRAME_SIZE] {
        let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let mut wire = payload.clone();
        wire.push(checksum(&payload));

        let pool = FramePool::new(4);
        let mut assembler = FrameAssembler::new(pool.clone());
        let mut epoch = 0u32;

        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &wire, |b, wire| {
            b.iter(|| {
                epoch = epoch.wrapping_add(1);
                let phase = PhaseSnapshot::new(epoch, BusPhase::Data, size);
                for &byte in wire {
                    if let Some(sio_driver::AssemblerOutput::Frame(frame)) =
                        assembler.push(phase, black_box(byte))
                    {
                        pool.release(frame.data);
                    }
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_checksum, bench_command_frame, bench_data_frame);
criterion_main!(benches);
