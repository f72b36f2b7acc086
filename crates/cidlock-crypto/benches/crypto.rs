use cidlock_crypto::{decrypt, encrypt, PlaintextFile, RetrievalMode, UserKey};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let user_key = UserKey::from_bytes([0xABu8; 32]);
    let file = PlaintextFile::new(make_data(size), "bench.bin", "application/octet-stream");
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&file), divan::black_box(&user_key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let user_key = UserKey::from_bytes([0xABu8; 32]);
    let file = PlaintextFile::new(make_data(size), "bench.bin", "application/octet-stream");
    let envelope = encrypt(&file, &user_key).unwrap();
    let record = envelope.record();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt(
                divan::black_box(&record),
                divan::black_box(&user_key),
                divan::black_box(&envelope.encrypted_file_blob),
                RetrievalMode::Original,
            )
            .unwrap()
        });
}

fn main() {
    divan::main();
}
