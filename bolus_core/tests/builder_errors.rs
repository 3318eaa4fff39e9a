use bolus_core::error::BuildError;
use bolus_core::mocks::FailingStore;
use bolus_core::{Engine, ExtendedCfg, LearningCfg, MealCfg, SafetyCfg};
use bolus_store::MemoryStore;
use bolus_traits::LearningProfile;
use rstest::rstest;

#[rstest]
fn builder_missing_store_yields_typed_build_error() {
    let err = Engine::builder()
        // missing with_store()
        .with_meal(MealCfg::default())
        .try_build()
        .expect_err("should fail with MissingStore");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingStore) => {}
        other => panic!("expected MissingStore, got: {other:?}"),
    }
}

#[rstest]
#[case::confidence_above_one(
    MealCfg { min_confidence: 1.5, ..MealCfg::default() }, SafetyCfg::default(),
    ExtendedCfg::default(), LearningCfg::default(), "meal.min_confidence")]
#[case::zero_timeout(
    MealCfg { episode_timeout_min: 0.0, ..MealCfg::default() }, SafetyCfg::default(),
    ExtendedCfg::default(), LearningCfg::default(), "episode_timeout_min")]
#[case::negative_band(
    MealCfg::default(), SafetyCfg { target_band: -0.1, ..SafetyCfg::default() },
    ExtendedCfg::default(), LearningCfg::default(), "target_band")]
#[case::single_step(
    MealCfg::default(), SafetyCfg::default(),
    ExtendedCfg { steps: 1, ..ExtendedCfg::default() }, LearningCfg::default(), "extended.steps")]
#[case::nan_rise(
    MealCfg::default(), SafetyCfg::default(), ExtendedCfg::default(),
    LearningCfg { rise_per_gram: f64::NAN, ..LearningCfg::default() }, "rise_per_gram")]
fn invalid_config_is_rejected(
    #[case] meal: MealCfg,
    #[case] safety: SafetyCfg,
    #[case] extended: ExtendedCfg,
    #[case] learning: LearningCfg,
    #[case] needle: &str,
) {
    let err = Engine::builder()
        .with_store(MemoryStore::default())
        .with_meal(meal)
        .with_safety(safety)
        .with_extended(extended)
        .with_learning(learning)
        .build()
        .expect_err("invalid config must fail");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
fn disabled_extended_skips_step_checks() {
    let engine = Engine::builder()
        .with_store(MemoryStore::default())
        .with_extended(ExtendedCfg {
            enabled: false,
            steps: 0,
            ..ExtendedCfg::default()
        })
        .build();
    assert!(engine.is_ok());
}

#[rstest]
fn failing_store_falls_back_to_default_profile() {
    let engine = Engine::builder()
        .with_store(FailingStore::default())
        .build()
        .expect("load failures are tolerated");
    assert_eq!(engine.profile(), &LearningProfile::default());
}

#[rstest]
fn stored_profile_is_loaded_and_sanitized() {
    let stored = LearningProfile {
        personal_carb_ratio: 5.0,
        personal_isf: 0.9,
        confidence: 0.5,
        ..LearningProfile::default()
    };
    let engine = Engine::builder()
        .with_store(MemoryStore::default().with_profile(stored))
        .build()
        .unwrap();
    assert_eq!(engine.profile().personal_carb_ratio, 1.3);
    assert_eq!(engine.profile().personal_isf, 0.9);
    assert_eq!(engine.learning_snapshot().confidence, 0.5);
}

#[rstest]
fn explicit_profile_overrides_store() {
    let stored = LearningProfile {
        confidence: 0.5,
        ..LearningProfile::default()
    };
    let explicit = LearningProfile {
        confidence: 0.9,
        ..LearningProfile::default()
    };
    let engine = Engine::builder()
        .with_profile(explicit.clone())
        .with_store(MemoryStore::default().with_profile(stored))
        .build()
        .unwrap();
    assert_eq!(engine.profile(), &explicit);
}
