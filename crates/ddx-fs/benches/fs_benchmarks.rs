use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ddx_fs::{NormalizedPath, StagedWrites, io};
use tempfile::tempdir;

fn write_atomic_benchmark(c: &mut Criterion) {
    c.bench_function("io::write_atomic", |b| {
        let dir = tempdir().unwrap();
        let path = NormalizedPath::new(dir.path().join("test_file.txt"));
        let content = "hello world".as_bytes();

        b.iter(|| {
            io::write_atomic(black_box(&path), black_box(content)).unwrap();
        })
    });
}

fn staged_writes_benchmark(c: &mut Criterion) {
    c.bench_function("StagedWrites::commit (16 files)", |b| {
        let dir = tempdir().unwrap();
        let root = NormalizedPath::new(dir.path());

        b.iter(|| {
            let mut staged = StagedWrites::new();
            for i in 0..16 {
                staged.stage(root.join(&format!("dir{}/file{i}.md", i % 4)), "# title\n");
            }
            staged.commit().unwrap();
        })
    });
}

criterion_group!(benches, write_atomic_benchmark, staged_writes_benchmark);
criterion_main!(benches);
