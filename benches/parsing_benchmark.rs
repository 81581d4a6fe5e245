use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mbus_serial::mbus::serial_mock::MockSerialPort;
use mbus_serial::{decode_progress, parse_frame, EventHooks, FrameProgress, MBusDeviceHandle, MBusFrame};
use nom::IResult;

const LONG_FRAME: &str = "6831316808017245585703B40534049E0027B60306F934150315C6004D052E00000000053D00000000055B22F32642055FC7DA0D42FA16";

fn benchmark_parse_frame(c: &mut Criterion) {
    let data = hex::decode(LONG_FRAME).unwrap();

    c.bench_function("parse_frame", |b| {
        b.iter(|| {
            let result: IResult<&[u8], MBusFrame> = parse_frame(black_box(&data));
            let _ = black_box(result);
        })
    });
}

fn benchmark_decode_progress(c: &mut Criterion) {
    let data = hex::decode(LONG_FRAME).unwrap();

    // the receive loop asks once per prefix length it reaches
    c.bench_function("decode_progress", |b| {
        b.iter(|| {
            let mut len = 0;
            while let FrameProgress::NeedMore(n) = decode_progress(black_box(&data[..len])) {
                len += n;
            }
            black_box(len)
        })
    });
}

fn benchmark_recv_frame(c: &mut Criterion) {
    let data = hex::decode(LONG_FRAME).unwrap();
    let mock = MockSerialPort::new();
    let mut handle =
        MBusDeviceHandle::connect_with(mock.clone(), "/dev/ttyBENCH", EventHooks::new()).unwrap();

    c.bench_function("recv_frame", |b| {
        b.iter(|| {
            mock.queue_rx_data(&data);
            black_box(handle.recv_frame().unwrap())
        })
    });
}

criterion_group!(
    benches,
    benchmark_parse_frame,
    benchmark_decode_progress,
    benchmark_recv_frame
);
criterion_main!(benches);
