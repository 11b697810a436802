//! Wire codec benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pathscope_core::FieldBag;
use pathscope_protocol::{Color4f, Point3f, SceneObject, Sphere, WireRead, WireWrite};

fn create_field_bag(keys: usize) -> FieldBag {
    let mut bag = FieldBag::new();
    for i in 0..keys {
        bag.add(&format!("float_{}", i), i as f32 * 0.5);
        bag.add(&format!("point_{}", i), Point3f::new(i as f32, 1.0, 2.0));
        bag.add(&format!("color_{}", i), Color4f::rgb(0.1, 0.2, 0.3));
        bag.add(&format!("label_{}", i), "diffuse");
    }
    bag
}

fn bench_field_bag_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_bag_encode");

    for keys in [1, 10, 100] {
        let bag = create_field_bag(keys);

        group.throughput(Throughput::Elements(keys as u64 * 4));
        group.bench_with_input(BenchmarkId::from_parameter(keys), &bag, |b, bag| {
            b.iter(|| {
                let mut buf = BytesMut::new();
                bag.encode(&mut buf);
                black_box(buf)
            });
        });
    }

    group.finish();
}

fn bench_field_bag_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_bag_decode");

    for keys in [1, 10, 100] {
        let mut encoded = BytesMut::new();
        create_field_bag(keys).encode(&mut encoded);

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(keys), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = &encoded[..];
                black_box(FieldBag::decode(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_string_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_codec");

    for size in [16, 256, 4096] {
        let value = "x".repeat(size);
        let mut encoded = BytesMut::new();
        encoded.put_string(&value);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &value, |b, value| {
            b.iter(|| {
                let mut buf = BytesMut::with_capacity(size + 4);
                buf.put_string(value);
                black_box(buf)
            });
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = &encoded[..];
                black_box(buf.get_wire::<String>().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_scene_records(c: &mut Criterion) {
    let spheres: Vec<Sphere> = (0..64)
        .map(|i| Sphere::new(Point3f::new(i as f32, 0.0, -5.0), 1.0))
        .collect();
    let mut encoded = BytesMut::new();
    for sphere in &spheres {
        sphere.encode(&mut encoded);
    }

    c.bench_function("scene_encode_64_spheres", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            for sphere in &spheres {
                sphere.encode(&mut buf);
            }
            black_box(buf)
        });
    });

    c.bench_function("scene_decode_64_spheres", |b| {
        b.iter(|| {
            let mut buf = &encoded[..];
            for _ in 0..64 {
                let _opcode: u16 = buf.get_wire().unwrap();
                black_box(SceneObject::decode_body(&mut buf).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_field_bag_encode,
    bench_field_bag_decode,
    bench_string_codec,
    bench_scene_records,
);
criterion_main!(benches);
