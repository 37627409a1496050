use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gifsicle::lzw;

fn solid_run(len: usize, value: u8) -> Vec<u8> {
	vec![value; len]
}

fn gradient(len: usize) -> Vec<u8> {
	(0..len).map(|i| (i % 256) as u8).collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
	let solid = solid_run(64 * 1024, 7);
	let gradient_data = gradient(64 * 1024);

	c.bench_function("encode_solid_run", |b| {
		b.iter(|| {
			let mut out = Vec::new();
			lzw::encode(&mut out, black_box(&solid), 8).unwrap();
		})
	});

	c.bench_function("encode_gradient", |b| {
		b.iter(|| {
			let mut out = Vec::new();
			lzw::encode(&mut out, black_box(&gradient_data), 8).unwrap();
		})
	});

	let mut encoded_solid = Vec::new();
	lzw::encode(&mut encoded_solid, &solid, 8).unwrap();

	c.bench_function("decode_solid_run", |b| {
		b.iter(|| {
			let mut cursor = encoded_solid.as_slice();
			lzw::decode(black_box(&mut cursor)).unwrap();
		})
	});
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
