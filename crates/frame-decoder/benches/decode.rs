use criterion::{black_box, criterion_group, criterion_main, Criterion};
use frame_decoder::{decode_full_band, decode_stream, unwrap_phase, StreamRecord};

fn full_band_capture(rows: usize) -> Vec<u32> {
    let strobe = 1u32 << 30;
    let mut col0: Vec<u32> = vec![0, 0];
    let mut col1: Vec<u32> = vec![0, 0];
    for i in 0..rows {
        let mark = if i % 512 == 0 { strobe } else { 0 };
        col0.push(mark | (i as u32 & 0xFF_FFFF));
        col1.push(mark | ((rows - i) as u32 & 0xFF_FFFF));
    }
    col0.extend(col1);
    col0
}

fn v1_stream(records: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; records * StreamRecord::SIZE];
    for (n, record) in bytes.chunks_exact_mut(StreamRecord::SIZE).enumerate() {
        record[8] = 1;
        record[92..96].copy_from_slice(&(n as u32).to_le_bytes());
        for (k, sample) in record[136..].chunks_exact_mut(2).enumerate() {
            sample.copy_from_slice(&(((k * 37 + n * 11) % 65536) as u16).to_le_bytes());
        }
    }
    bytes
}

fn bench_decode(c: &mut Criterion) {
    let capture = full_band_capture(512 * 64 + 1);
    c.bench_function("decode_full_band_64_cycles", |b| {
        b.iter(|| decode_full_band(black_box(&capture)))
    });

    let stream = v1_stream(200);
    c.bench_function("decode_stream_v1_200_records", |b| {
        b.iter(|| decode_stream(black_box(&stream)))
    });

    let series = match decode_stream(&stream) {
        Ok(data) => data.phase_series(),
        Err(e) => panic!("bench input failed to decode: {e}"),
    };
    c.bench_function("unwrap_512x200", |b| {
        b.iter(|| {
            let mut phase = series.phase.clone();
            unwrap_phase(black_box(&mut phase));
            phase
        })
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
