// Codec and rolling-ROM benchmarks for the ZTB protocol.
//
// Covers ZOSCII encode/decode at typical block sizes, rolling ROM
// construction at several history depths, and a full append + fetch cycle
// against the in-memory store.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ztb_protocol::chain::block::{assemble_raw_block, BlockKind, HeaderDraft};
use ztb_protocol::codec::{decode_block, encode_block, GenesisRom, RollingRomBuilder};
use ztb_protocol::config::NULL_BLOCK_ID;
use ztb_protocol::{ChainEngine, MemoryStore};

fn genesis() -> GenesisRom {
    GenesisRom::create_with_rng(&mut StdRng::seed_from_u64(0x2b))
}

fn raw_block(payload_len: usize) -> Vec<u8> {
    let draft = HeaderDraft {
        block_id: "6a0f1c2e-3d4b-4a59-8e7f-0123456789ab".to_string(),
        prev_block_id: NULL_BLOCK_ID.to_string(),
        trunk_id: NULL_BLOCK_ID.to_string(),
        timestamp: 1_760_000_000,
        kind: BlockKind::Trunk,
    };
    let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();
    assemble_raw_block(draft, &payload)
        .expect("benchmark payload fits")
        .1
}

fn bench_encode(c: &mut Criterion) {
    let genesis = genesis();
    let mut group = c.benchmark_group("zoscii/encode");

    for payload_len in [2usize, 4096, 65_536] {
        let raw = raw_block(payload_len);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(payload_len), &raw, |b, raw| {
            b.iter(|| encode_block(raw, genesis.rom()).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let genesis = genesis();
    let mut group = c.benchmark_group("zoscii/decode");

    for payload_len in [2usize, 4096, 65_536] {
        let ciphertext = encode_block(&raw_block(payload_len), genesis.rom()).unwrap();
        group.throughput(Throughput::Bytes(ciphertext.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(payload_len),
            &ciphertext,
            |b, ciphertext| {
                b.iter(|| decode_block(ciphertext, genesis.rom()).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_rolling_rom(c: &mut Criterion) {
    let genesis = genesis();
    let builder = RollingRomBuilder::new();
    let history: Vec<Vec<u8>> = (0..64u8).map(|i| vec![i; 2306]).collect();
    let mut group = c.benchmark_group("rolling_rom/build");

    for depth in [0usize, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| builder.build_from(genesis.rom(), &history[..depth]));
        });
    }
    group.finish();
}

fn bench_append_and_fetch(c: &mut Criterion) {
    c.bench_function("engine/append_then_fetch", |b| {
        let engine = ChainEngine::new(genesis(), MemoryStore::new());
        b.iter(|| {
            let record = engine.add_block("bench", b"benchmark entry").unwrap();
            engine.fetch("bench", record.index).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_rolling_rom,
    bench_append_and_fetch
);
criterion_main!(benches);
