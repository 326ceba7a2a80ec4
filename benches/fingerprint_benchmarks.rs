use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dupesweep::duplicates::SeenTable;
use dupesweep::scanner::{
    count_files, FileEntry, HashAlgorithm, Hasher, TrackedFile, Walker, WalkerConfig,
};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tempfile::TempDir;

// Helper to create a test directory with a specific structure
fn setup_test_dir(depth: usize, files_per_dir: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    create_dir_recursive(temp_dir.path().to_path_buf(), depth, files_per_dir);
    temp_dir
}

fn create_dir_recursive(path: PathBuf, depth: usize, files_per_dir: usize) {
    if depth == 0 {
        return;
    }
    fs::create_dir_all(&path).expect("Failed to create dir");

    for i in 0..files_per_dir {
        // every third file repeats content so the table sees duplicates
        let content = format!("payload {}", i % 3);
        fs::write(path.join(format!("file_{}.txt", i)), content).expect("Failed to write file");
    }

    if depth > 1 {
        for i in 0..2 {
            create_dir_recursive(path.join(format!("dir_{}", i)), depth - 1, files_per_dir);
        }
    }
}

// 1. Fingerprint throughput per algorithm
fn bench_fingerprint(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blob.bin");
    let size = 4 * 1024 * 1024;
    fs::write(&path, vec![0xA5u8; size]).unwrap();

    let mut group = c.benchmark_group("fingerprint_4mib");
    group.throughput(Throughput::Bytes(size as u64));
    for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256, HashAlgorithm::Md5] {
        let hasher = Hasher::new(algorithm);
        group.bench_with_input(
            BenchmarkId::from_parameter(algorithm),
            &path,
            |b, path| b.iter(|| black_box(hasher.fingerprint(path).unwrap())),
        );
    }
    group.finish();
}

// 2. SeenTable bookkeeping
fn bench_seen_table(c: &mut Criterion) {
    let hasher = Hasher::new(HashAlgorithm::Blake3);
    let files: Vec<TrackedFile> = (0..10_000u32)
        .map(|i| {
            let content = (i % 2_500).to_le_bytes();
            TrackedFile {
                entry: FileEntry::new(
                    PathBuf::from(format!("/bench/{i}")),
                    content.len() as u64,
                    SystemTime::UNIX_EPOCH,
                ),
                fingerprint: hasher.fingerprint_bytes(&content),
            }
        })
        .collect();

    c.bench_function("seen_table_10k_observations", |b| {
        b.iter(|| {
            let mut table = SeenTable::new(0);
            for file in &files {
                black_box(table.observe(file));
            }
            black_box(table.groups().len())
        })
    });
}

// 3. Walking and pre-counting
fn bench_walk(c: &mut Criterion) {
    let temp_dir = setup_test_dir(4, 10);

    c.bench_function("walk_and_fingerprint_150_files", |b| {
        b.iter(|| {
            let walker = Walker::new(temp_dir.path(), WalkerConfig::default());
            black_box(walker.walk().count())
        })
    });

    c.bench_function("count_files_150_files", |b| {
        b.iter(|| black_box(count_files(temp_dir.path(), false, &[])))
    });
}

criterion_group!(benches, bench_fingerprint, bench_seen_table, bench_walk);
criterion_main!(benches);
