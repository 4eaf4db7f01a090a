use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::hint::black_box;
use std::io::Write;
use std::time::Duration;
use taforge::decompress::{cipher, decompress_lz77, decompress_zlib};
use taforge::hpi::decode_chunk;

fn generate_data(size: usize, pattern: &str) -> Vec<u8> {
    let repeat = |base: &[u8]| {
        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            data.extend_from_slice(base);
        }
        data.truncate(size);
        data
    };

    match pattern {
        "text" => repeat(b"[UNITINFO] { UnitName=ARMCOM; Side=ARM; FootprintX=2; } "),
        "repetitive" => repeat(b"ABCDEFGHIJ"),
        "random" => (0..size)
            .map(|i| {
                let x = i as u32;
                (x.wrapping_mul(1664525).wrapping_add(1013904223) >> 13) as u8
            })
            .collect(),
        _ => panic!("Unknown pattern: {}", pattern),
    }
}

/// Control-byte bookkeeping for the LZ77 stream writer
struct Lz77Writer {
    out: Vec<u8>,
    control: usize,
    bit: u8,
}

impl Lz77Writer {
    fn flag(&mut self, reference: bool) {
        if self.bit == 8 {
            self.control = self.out.len();
            self.out.push(0);
            self.bit = 0;
        }
        if reference {
            self.out[self.control] |= 1 << self.bit;
        }
        self.bit += 1;
    }
}

/// Greedy single-candidate LZ77 encoder producing archive chunk streams
fn lz77_encode(data: &[u8]) -> Vec<u8> {
    let mut writer = Lz77Writer {
        out: Vec::new(),
        control: 0,
        bit: 8,
    };
    let mut last_seen: HashMap<[u8; 3], usize> = HashMap::new();
    let remember = |last_seen: &mut HashMap<[u8; 3], usize>, at: usize| {
        if at + 3 <= data.len() {
            last_seen.insert([data[at], data[at + 1], data[at + 2]], at);
        }
    };

    let mut i = 0;
    while i < data.len() {
        let mut best = None;
        if i + 3 <= data.len() {
            if let Some(&j) = last_seen.get(&[data[i], data[i + 1], data[i + 2]]) {
                // Window position zero is the end marker
                let position = (j + 1) & 0xFFF;
                if i - j < 0x1000 && position != 0 {
                    let mut length = 0;
                    while length < 17 && i + length < data.len() && data[j + length] == data[i + length] {
                        length += 1;
                    }
                    best = Some((position, length));
                }
            }
        }

        match best {
            Some((position, length)) => {
                writer.flag(true);
                let token = ((position as u16) << 4) | (length - 2) as u16;
                writer.out.extend_from_slice(&token.to_le_bytes());
                for at in i..i + length {
                    remember(&mut last_seen, at);
                }
                i += length;
            }
            None => {
                writer.flag(false);
                writer.out.push(data[i]);
                remember(&mut last_seen, i);
                i += 1;
            }
        }
    }

    writer.flag(true);
    writer.out.extend_from_slice(&[0, 0]);
    writer.out
}

fn zlib_encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("Compression failed");
    encoder.finish().expect("Compression failed")
}

fn make_chunk(payload: &[u8], kind: u8, decompressed_size: usize) -> Vec<u8> {
    let mut stored = payload.to_vec();
    cipher::encrypt_chunk(&mut stored);
    let checksum = stored.iter().fold(0u32, |a, &b| a.wrapping_add(b as u32));

    let mut chunk = b"SQSH".to_vec();
    chunk.extend_from_slice(&[2, kind, 1]);
    chunk.extend_from_slice(&(stored.len() as u32).to_le_bytes());
    chunk.extend_from_slice(&(decompressed_size as u32).to_le_bytes());
    chunk.extend_from_slice(&checksum.to_le_bytes());
    chunk.extend_from_slice(&stored);
    chunk
}

fn size_label(size: usize) -> &'static str {
    match size {
        10240 => "10KB",
        65536 => "64KB",
        1048576 => "1MB",
        _ => "unknown",
    }
}

fn lz77_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("lz77_throughput");
    group.measurement_time(Duration::from_secs(10));

    for size in [10240, 65536, 1048576] {
        for pattern in ["text", "repetitive", "random"] {
            let original = generate_data(size, pattern);
            let compressed = lz77_encode(&original);
            assert_eq!(
                decompress_lz77(&compressed, size).expect("Decompression failed"),
                original
            );

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(pattern, size_label(size)),
                &compressed,
                |b, data| b.iter(|| decompress_lz77(black_box(data), size)),
            );
        }
    }

    group.finish();
}

fn zlib_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("zlib_throughput");
    group.measurement_time(Duration::from_secs(10));

    for size in [10240, 65536, 1048576] {
        for pattern in ["text", "random"] {
            let compressed = zlib_encode(&generate_data(size, pattern));

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(pattern, size_label(size)),
                &compressed,
                |b, data| b.iter(|| decompress_zlib(black_box(data), size)),
            );
        }
    }

    group.finish();
}

fn chunk_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_decoding");

    // Archive chunks hold at most 64KB of plaintext
    let size = 65536;
    let original = generate_data(size, "text");
    let chunks = [
        ("lz77", make_chunk(&lz77_encode(&original), 1, size)),
        ("zlib", make_chunk(&zlib_encode(&original), 2, size)),
    ];

    group.throughput(Throughput::Bytes(size as u64));
    for (name, chunk) in &chunks {
        group.bench_with_input(BenchmarkId::new("encrypted", name), chunk, |b, data| {
            b.iter(|| decode_chunk(black_box(data)))
        });
    }

    group.finish();
}

criterion_group!(benches, lz77_throughput, zlib_throughput, chunk_decoding);
criterion_main!(benches);
