use idea_rank::config::{EthicsBand, MAX_WEIGHT, MIN_WEIGHT};
use idea_rank::scoring::Component;
use idea_rank::{ConfigError, RankingConfig, SignalWeights};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

/// Move weight between random pairs while keeping each inside its band, so
/// the sum is preserved exactly up to rounding.
fn shuffled_weights(rng: &mut StdRng) -> SignalWeights {
    let mut weights = SignalWeights::default();
    for _ in 0..50 {
        let from = Component::ALL[rng.gen_range(0..Component::ALL.len())];
        let to = Component::ALL[rng.gen_range(0..Component::ALL.len())];
        if from == to {
            continue;
        }
        let room = (weights.weight(from) - MIN_WEIGHT).min(MAX_WEIGHT - weights.weight(to));
        if room <= 1e-6 {
            continue;
        }
        // stay a hair inside the band so rounding cannot step outside it
        let amount = rng.gen_range(0.0..=room) * 0.999;
        weights.set(from, weights.weight(from) - amount);
        weights.set(to, weights.weight(to) + amount);
    }
    weights
}

#[test]
fn random_in_band_weight_sets_are_accepted() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let mut cfg = RankingConfig::default();
        cfg.weights = shuffled_weights(&mut rng);
        assert!(cfg
            .weights
            .iter()
            .all(|(_, w)| (MIN_WEIGHT..=MAX_WEIGHT).contains(&w)));
        cfg.validate().unwrap();
    }
}

#[test]
fn random_weight_sets_off_by_more_than_tolerance_are_rejected() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let mut cfg = RankingConfig::default();
        cfg.weights = shuffled_weights(&mut rng);
        let (smallest, w) = cfg
            .weights
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        cfg.weights.set(smallest, w + rng.gen_range(1e-6..1e-3));
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }
}

#[test]
fn each_weight_outside_band_is_rejected() {
    for component in Component::ALL {
        for bad in [0.0, 0.049, 0.251, 0.5, f64::NAN] {
            let mut cfg = RankingConfig::default();
            cfg.weights.set(component, bad);
            let err = cfg.validate().unwrap_err();
            assert!(
                err.to_string().contains(component.as_str()),
                "{component} = {bad}: {err}"
            );
        }
    }
}

#[test]
fn non_monotone_ethics_multipliers_are_rejected() {
    let mut cfg = RankingConfig::default();
    cfg.ethics_bands = vec![
        EthicsBand {
            min_score: 0.5,
            multiplier: 0.8,
        },
        EthicsBand {
            min_score: 0.0,
            multiplier: 0.9,
        },
    ];
    assert!(cfg.validate().is_err());
}

#[test]
fn scalar_fields_are_range_checked() {
    let cases: [(&str, fn(&mut RankingConfig)); 10] = [
        ("freshness_decay", |c: &mut RankingConfig| c.freshness_decay = -0.1),
        ("elo.k_factor", |c: &mut RankingConfig| c.elo.k_factor = 0.0),
        ("elo.initial", |c: &mut RankingConfig| c.elo.initial = 50.0),
        ("bayesian.prior_std", |c: &mut RankingConfig| c.bayesian.prior_std = 0.0),
        ("bayesian.observation_std", |c: &mut RankingConfig| c.bayesian.observation_std = -1.0),
        ("feasibility", |c: &mut RankingConfig| c.feasibility.floor = 1.5),
        ("causal_boost.cap", |c: &mut RankingConfig| c.causal_boost.cap = -0.1),
        ("max_adjusted_score", |c: &mut RankingConfig| c.max_adjusted_score = 0.0),
        ("candidate_pool", |c: &mut RankingConfig| c.candidate_pool = 0),
        ("embedding_dim", |c: &mut RankingConfig| c.embedding_dim = 0),
    ];
    for (name, mutate) in cases {
        let mut cfg = RankingConfig::default();
        mutate(&mut cfg);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains(name), "{name}: {err}");
    }
}

#[test]
fn from_path_reads_toml_and_json() {
    let dir = tempdir().unwrap();

    let toml_path = dir.path().join("ranking.toml");
    std::fs::write(
        &toml_path,
        r#"
candidate_pool = 20
embedding_dim = 8

[weights]
elo = 0.20
trend = 0.10

[[ethics_bands]]
min_score = 0.5
multiplier = 1.0

[[ethics_bands]]
min_score = 0.0
multiplier = 0.6
"#,
    )
    .unwrap();
    let cfg = RankingConfig::from_path(&toml_path).unwrap();
    assert_eq!(cfg.candidate_pool, 20);
    assert_eq!(cfg.weights.elo, 0.20);
    assert_eq!(cfg.ethics_bands.len(), 2);

    let json_path = dir.path().join("ranking.json");
    std::fs::write(&json_path, r#"{"mmr_lambda": 0.3, "hash_algorithm": "blake3"}"#).unwrap();
    let cfg = RankingConfig::from_path(&json_path).unwrap();
    assert_eq!(cfg.mmr_lambda, 0.3);

    let missing = RankingConfig::from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::Read { .. }));
}

#[test]
fn invalid_file_contents_fail_at_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ranking.toml");
    std::fs::write(&path, "[weights]\nelo = 0.40\n").unwrap();
    let err = RankingConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
}
