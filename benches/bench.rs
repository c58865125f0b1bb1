// Criterion benchmarks for the Lume matchmaker

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lume_matchmaker::core::{distance::haversine_distance, pairing::generate_pairs, QualifierChain};
use lume_matchmaker::models::{Gender, MatchConfig, User};
use uuid::Uuid;

fn create_user(id: usize, lat: f64, lon: f64) -> User {
    let gender = match id % 3 {
        0 => Gender::Male,
        1 => Gender::Female,
        _ => Gender::NonBinary,
    };
    User {
        id: Uuid::new_v4(),
        age: Some(22 + (id % 20) as u8),
        gender: Some(gender),
        height_cm: Some(155 + (id % 40) as u16),
        latitude: Some(lat),
        longitude: Some(lon),
        dating_preferences: vec![Gender::Male, Gender::Female],
        is_test_user: false,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn create_config() -> MatchConfig {
    MatchConfig {
        id: Uuid::new_v4(),
        version: 1,
        is_active: true,
        age_range_end: 8,
        age_range_man_older_by: 10,
        age_range_woman_older_by: 5,
        height_male_greater_by_cm: 3,
        location_radius_km: 25.0,
        location_adaptive_expansion: vec![50.0, 100.0],
        match_expiration_hours: None,
        match_drop_hours: None,
        compatibility_score_threshold: None,
        created_at: Utc::now(),
    }
}

fn population(count: usize) -> Vec<User> {
    (0..count)
        .map(|i| {
            let lat_offset = (i as f64 * 0.003) % 0.8;
            let lon_offset = (i as f64 * 0.002) % 0.8;
            create_user(i, 40.7128 + lat_offset, -74.0060 + lon_offset)
        })
        .collect()
}

fn bench_haversine_distance(c: &mut Criterion) {
    c.bench_function("haversine_distance", |b| {
        b.iter(|| {
            haversine_distance(
                black_box(40.7128),
                black_box(-74.0060),
                black_box(40.72),
                black_box(-74.01),
            )
        });
    });
}

fn bench_pairing(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairing");

    for user_count in [10, 50, 100, 250].iter() {
        let users = population(*user_count);

        group.bench_with_input(BenchmarkId::new("generate_pairs", user_count), user_count, |b, _| {
            b.iter(|| generate_pairs(black_box(&users)));
        });
    }

    group.finish();
}

fn bench_qualifier_chain(c: &mut Criterion) {
    let chain = QualifierChain::standard();
    let config = create_config();
    let users = population(100);
    let pairs: Vec<(&User, &User)> = users.iter().zip(users.iter().skip(1)).collect();

    c.bench_function("qualifier_chain_single_pair", |b| {
        b.iter(|| chain.run(black_box(&config), black_box(&users[0]), black_box(&users[1])));
    });

    c.bench_function("qualifier_chain_99_pairs", |b| {
        b.iter(|| {
            let passed = pairs
                .iter()
                .filter(|(a, other)| chain.run(&config, a, other).passed())
                .count();
            black_box(passed)
        });
    });
}

criterion_group!(benches, bench_haversine_distance, bench_pairing, bench_qualifier_chain);

criterion_main!(benches);
