//! Comparative benchmark: legacy PBKDF2 vs. Argon2id key derivation.
//!
//! Unlock latency is dominated by the KDF, so this is the number that
//! matters when tuning `[argon2]` in the wallet configuration.
//!
//! Run with: `cargo bench --bench kdf_comparison_benchmark`

use criterion::{black_box, criterion_group, criterion_main, Criterion, SamplingMode};
use seedvault::kdf::{derive_key, SALT_LEN};
use seedvault::{Argon2Params, KdfVersion};

const PASSWORD: &str = "correct horse battery staple";

fn bench_kdf(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdf");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10);

    let salt = [7u8; SALT_LEN];
    let unused = Argon2Params::default();

    group.bench_function("pbkdf2_sha256_100k", |b| {
        b.iter(|| derive_key(KdfVersion::Pbkdf2Sha256, black_box(PASSWORD), &salt, &unused))
    });

    let costs = [
        ("argon2id_19mib_t2", Argon2Params { m_cost: 19_456, t_cost: 2, p_cost: 1 }),
        ("argon2id_64mib_t3", Argon2Params::default()),
    ];
    for (name, params) in costs {
        group.bench_function(name, |b| {
            b.iter(|| derive_key(KdfVersion::Argon2id, black_box(PASSWORD), &salt, &params))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_kdf);
criterion_main!(benches);
