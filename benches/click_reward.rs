#![allow(missing_docs)]
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use streakforge::combo::ComboStatus;
use streakforge::events::TracingDispatcher;
use streakforge::leaderboard::UserSnapshot;
use streakforge::rewards::ClickInput;
use streakforge::{
    ClickRewardCalculator, EngineConfig, LevelCalculator, LeaderboardMetric, LeaderboardRanker,
    MemoryStore, RewardEngine, RewardStore, RiskPenalty, User, UserId,
};

fn bench_calculate(c: &mut Criterion) {
    let calc = ClickRewardCalculator::default();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let input = ClickInput {
        streak_days: 12,
        actions_today: 40,
        level: LevelCalculator::for_points(20_000),
        combo: ComboStatus {
            combo_count: 6,
            bonus_eligible: true,
        },
        risk: RiskPenalty::NONE,
    };

    c.bench_function("click_calculate", |b| {
        b.iter(|| calc.calculate(black_box(&input), &mut rng));
    });
}

fn bench_record_click(c: &mut Criterion) {
    let store = Arc::new(MemoryStore::new());
    store.insert_user(&User::new(UserId::new(1), "bench")).unwrap();
    let engine = RewardEngine::new(store, &EngineConfig::default(), Arc::new(TracingDispatcher));
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let mut now = 1_700_000_000_000_i64;

    c.bench_function("engine_record_click", |b| {
        b.iter(|| {
            now += 200;
            engine
                .record_click(UserId::new(1), black_box(now), RiskPenalty::NONE, &mut rng)
                .unwrap()
        });
    });
}

fn bench_rank(c: &mut Criterion) {
    let snapshots: Vec<UserSnapshot> = (0..10_000u64)
        .map(|i| UserSnapshot {
            user_id: UserId::new(i),
            name: format!("user{i}"),
            points: (i * 7_919) % 50_000,
            clicks: i,
            lifetime_points: (i * 7_919) % 50_000,
            level: 1,
        })
        .collect();

    c.bench_function("rank_10k", |b| {
        b.iter(|| LeaderboardRanker::rank(black_box(&snapshots), LeaderboardMetric::Points, Some(100)));
    });
}

criterion_group!(benches, bench_calculate, bench_record_click, bench_rank);
criterion_main!(benches);
