use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};

use confidential_assets_client::{
    Address, ChunkedCipherText, ConfidentialKeys, NormalizationProof, TransferProof,
    WithdrawalProof,
};

fn bench_chunked_encrypt(c: &mut Criterion) {
    let mut rng = StdRng::from_seed([1u8; 32]);
    let keys = ConfidentialKeys::generate(&mut rng);

    c.bench_function("chunked_encrypt", |b| {
        b.iter(|| ChunkedCipherText::encrypt(&keys.public, 1_000_000_000, &mut rng))
    });
}

fn bench_chunked_decrypt(c: &mut Criterion) {
    let mut rng = StdRng::from_seed([2u8; 32]);
    let keys = ConfidentialKeys::generate(&mut rng);
    let (_, cipher) = ChunkedCipherText::encrypt(&keys.public, u64::MAX as u128, &mut rng);

    c.bench_function("chunked_decrypt_16bit", |b| {
        b.iter(|| cipher.decrypt(&keys.secret).unwrap())
    });
}

fn bench_withdrawal_proof(c: &mut Criterion) {
    let mut rng = StdRng::from_seed([3u8; 32]);
    let keys = ConfidentialKeys::generate(&mut rng);
    let account = Address::new([1u8; 32]);
    let token = Address::new([2u8; 32]);
    let (_, current) = ChunkedCipherText::encrypt(&keys.public, 1_000_000_000, &mut rng);

    c.bench_function("withdrawal_prove", |b| {
        b.iter(|| {
            WithdrawalProof::new(
                &keys,
                &account,
                &token,
                400_000_000,
                1_000_000_000,
                &current,
                &mut rng,
            )
            .unwrap()
        })
    });

    let (proof, new_balance) = WithdrawalProof::new(
        &keys,
        &account,
        &token,
        400_000_000,
        1_000_000_000,
        &current,
        &mut rng,
    )
    .unwrap();
    c.bench_function("withdrawal_verify", |b| {
        b.iter(|| {
            proof
                .verify(
                    &account,
                    &token,
                    &keys.public,
                    400_000_000,
                    &current,
                    &new_balance,
                    &mut rng,
                )
                .unwrap()
        })
    });
}

fn bench_normalization_proof(c: &mut Criterion) {
    let mut rng = StdRng::from_seed([4u8; 32]);
    let keys = ConfidentialKeys::generate(&mut rng);
    let account = Address::new([1u8; 32]);
    let token = Address::new([2u8; 32]);
    let (_, a) = ChunkedCipherText::encrypt(&keys.public, 60_000, &mut rng);
    let (_, b_) = ChunkedCipherText::encrypt(&keys.public, 50_000, &mut rng);
    let current = a + b_;

    c.bench_function("normalization_prove", |b| {
        b.iter(|| {
            NormalizationProof::new(&keys, &account, &token, 110_000, &current, &mut rng).unwrap()
        })
    });
}

fn bench_transfer_proof(c: &mut Criterion) {
    let mut rng = StdRng::from_seed([5u8; 32]);
    let sender = ConfidentialKeys::generate(&mut rng);
    let recipient = ConfidentialKeys::generate(&mut rng);
    let auditor = ConfidentialKeys::generate(&mut rng);
    let account = Address::new([1u8; 32]);
    let token = Address::new([2u8; 32]);
    let (_, current) = ChunkedCipherText::encrypt(&sender.public, 1_000_000_000, &mut rng);

    c.bench_function("transfer_prove_one_auditor", |b| {
        b.iter(|| {
            TransferProof::new(
                &sender,
                &account,
                &token,
                &recipient.public,
                &[auditor.public],
                500_000_000,
                1_000_000_000,
                &current,
                &mut rng,
            )
            .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_chunked_encrypt,
    bench_chunked_decrypt,
    bench_withdrawal_proof,
    bench_normalization_proof,
    bench_transfer_proof,
);
criterion_main!(benches);
