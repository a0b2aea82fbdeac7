use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tron::{
    arr_get, arr_set_node, empty_array_root, empty_map_root, map_get, map_set_node, Builder,
    Value, xxh32,
};

fn bench_xxh32(c: &mut Criterion) {
    let data = vec![0xABu8; 1024];
    c.bench_function("xxh32_1k", |b| b.iter(|| xxh32(black_box(&data), 0)));
}

fn bench_map_set(c: &mut Criterion) {
    let keys: Vec<String> = (0..100).map(|i| format!("key-{i}")).collect();
    c.bench_function("map_set_100", |b| {
        b.iter(|| {
            let mut builder = Builder::new();
            let mut root = empty_map_root(&mut builder).unwrap();
            for (i, key) in keys.iter().enumerate() {
                let (next, _) =
                    map_set_node(&mut builder, root, key.as_bytes(), &Value::I64(i as i64))
                        .unwrap();
                root = next;
            }
            black_box(root)
        })
    });
}

fn bench_map_get(c: &mut Criterion) {
    let keys: Vec<String> = (0..1000).map(|i| format!("key-{i}")).collect();
    let mut builder = Builder::new();
    let mut root = empty_map_root(&mut builder).unwrap();
    for (i, key) in keys.iter().enumerate() {
        let (next, _) =
            map_set_node(&mut builder, root, key.as_bytes(), &Value::I64(i as i64)).unwrap();
        root = next;
    }
    let doc = builder.bytes_with_trailer(root, 0);
    c.bench_function("map_get_1000", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(map_get(&doc, root, key.as_bytes()).unwrap());
            }
        })
    });
}

fn bench_arr_append(c: &mut Criterion) {
    c.bench_function("arr_append_256", |b| {
        b.iter(|| {
            let mut builder = Builder::new();
            let mut root = empty_array_root(&mut builder).unwrap();
            for i in 0..256u32 {
                root = arr_set_node(&mut builder, root, i, &Value::I64(i64::from(i)), i + 1)
                    .unwrap();
            }
            black_box(root)
        })
    });
}

fn bench_arr_get(c: &mut Criterion) {
    let mut builder = Builder::new();
    let mut root = empty_array_root(&mut builder).unwrap();
    for i in 0..256u32 {
        root = arr_set_node(&mut builder, root, i, &Value::I64(i64::from(i)), i + 1).unwrap();
    }
    let doc = builder.bytes_with_trailer(root, 0);
    c.bench_function("arr_get_256", |b| {
        b.iter(|| {
            for i in 0..256u32 {
                black_box(arr_get(&doc, root, i).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    bench_xxh32,
    bench_map_set,
    bench_map_get,
    bench_arr_append,
    bench_arr_get
);
criterion_main!(benches);
