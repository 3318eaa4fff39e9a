use bolus_core::{
    Engine, EngineError, EngineG, ExtendedCfg, GlucoseSample, LearningCfg, MealCfg, MealState,
    Phase, SafetyCfg, SensorIssue, Therapy, build_engine,
};
use bolus_store::MemoryStore;
use bolus_traits::LearningProfile;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;

fn t(min: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(min)
}

/// Readings 5 minutes apart starting at minute 0.
fn series(values: &[f64], iob: f64) -> Vec<GlucoseSample> {
    values
        .iter()
        .enumerate()
        .map(|(i, g)| GlucoseSample::new(t(5 * i as i64), *g, iob))
        .collect()
}

fn now_of(h: &[GlucoseSample]) -> DateTime<Utc> {
    h.last().unwrap().timestamp
}

fn engine() -> Engine {
    Engine::builder()
        .with_store(MemoryStore::default())
        .build()
        .unwrap()
}

fn confident_engine() -> Engine {
    Engine::builder()
        .with_store(MemoryStore::default())
        .with_profile(LearningProfile {
            confidence: 0.9,
            ..LearningProfile::default()
        })
        .build()
        .unwrap()
}

fn generic_engine() -> EngineG<MemoryStore> {
    build_engine(
        MemoryStore::default(),
        MealCfg::default(),
        SafetyCfg::default(),
        ExtendedCfg::default(),
        LearningCfg::default(),
    )
    .unwrap()
}

fn is_step_multiple(dose: f64) -> bool {
    ((dose * 20.0).round() - dose * 20.0).abs() < 1e-9
}

#[test]
fn flat_high_glucose_is_a_correction() {
    let h = series(&[10.0, 10.0, 10.0, 10.0, 10.0], 0.0);
    let therapy = Therapy {
        target: 6.0,
        isf: 2.0,
        ..Therapy::default()
    };
    let advice = confident_engine().advise(&h, &therapy, None, now_of(&h));
    assert_eq!(advice.phase, Phase::Correction);
    assert!(advice.rationale.starts_with("Correction"), "{}", advice.rationale);
    assert!((advice.dose - 2.0).abs() < 1e-9);
    // flat trend: computed, not delivered
    assert!(!advice.should_deliver);
    assert_eq!(advice.predicted_peak, 10.0);
}

#[test]
fn fresh_profile_damps_the_correction() {
    let h = series(&[10.0, 10.0, 10.0, 10.0, 10.0], 0.0);
    let advice = engine().advise(&h, &Therapy::default(), None, now_of(&h));
    assert_eq!(advice.phase, Phase::Correction);
    assert!((advice.dose - 1.4).abs() < 1e-9);
}

#[test]
fn three_point_rise_is_a_small_rising_meal() {
    let h = series(&[6.0, 6.5, 7.2], 0.0);
    let mut e = engine();
    let advice = e.advise(&h, &Therapy::default(), None, now_of(&h));
    assert_eq!(e.meal_state(), MealState::Rising);
    assert_eq!(advice.meal_state, MealState::Rising);
    assert!(advice.meal_detected);
    assert_eq!(advice.detected_carbs, 6.0);
    // 6 g is below the above-target minimum
    assert_eq!(advice.phase, Phase::Monitoring);
    assert_eq!(advice.dose, 0.0);
    assert!(!advice.should_deliver);
}

#[test]
fn iob_near_limit_with_flat_trend_blocks_everything() {
    let h = series(&[12.0, 12.0, 12.0, 12.0, 11.98], 9.5);
    let therapy = Therapy {
        max_iob: 10.0,
        ..Therapy::default()
    };
    let advice = confident_engine().advise(&h, &therapy, None, now_of(&h));
    assert_eq!(advice.phase, Phase::SafetyIobLimit);
    assert_eq!(advice.dose, 0.0);
    assert!(!advice.should_deliver);
}

#[test]
fn rising_meal_above_target_gets_a_meal_bolus() {
    let h = series(&[5.0, 5.0, 5.3, 5.8, 6.3, 6.8], 0.0);
    let therapy = Therapy {
        target: 5.0,
        ..Therapy::default()
    };
    let mut e = engine();
    let advice = e.advise(&h, &therapy, None, now_of(&h));
    assert_eq!(advice.phase, Phase::MealBolus);
    assert!(advice.should_deliver);
    assert!((advice.dose - 1.05).abs() < 1e-9, "{advice:?}");
    assert_eq!(advice.detected_carbs, 14.0);
    assert!(advice.confidence > 0.4);
    assert_eq!(e.last_bolus_at(), Some(now_of(&h)));
    assert!(advice.carbs_on_board > 13.9);
    // full 0.98 U for 14 g, 0.39 U of it given now
    assert!(advice.reserved_dose > 0.55 && advice.reserved_dose < 0.65, "{advice:?}");
    assert_eq!(e.reserved().map(|r| r.phase), Some(Phase::MealBolus));
    assert!(advice.rationale.contains("reserving"), "{}", advice.rationale);
}

#[test]
fn large_immediate_portion_is_given_in_steps() {
    let therapy = Therapy {
        target: 5.0,
        carb_ratio: 2.0,
        max_bolus: 10.0,
        ..Therapy::default()
    };
    let trace = [5.0, 5.0, 5.3, 5.8, 6.3, 6.8, 7.3, 7.6];
    let mut e = engine();

    let h = series(&trace[..6], 0.0);
    let first = e.advise(&h, &therapy, None, now_of(&h));
    assert_eq!(first.phase, Phase::MealBolus);
    assert!(first.should_deliver);
    assert!(first.rationale.contains("extended over 3 steps"), "{}", first.rationale);
    assert!(e.extended().active);
    assert_eq!(e.extended().remaining_steps, 2);
    assert!(first.reserved_dose > 2.5, "{first:?}");

    let h = series(&trace[..7], 0.0);
    let second = e.advise(&h, &therapy, None, now_of(&h));
    assert!(second.should_deliver);
    assert!(second.rationale.contains("extended step"), "{}", second.rationale);
    assert_eq!(e.extended().remaining_steps, 1);
    assert_eq!(e.extended().last_delivery_at, Some(now_of(&h)));

    let h = series(&trace[..8], 0.0);
    let third = e.advise(&h, &therapy, None, now_of(&h));
    assert!(third.rationale.contains("extended step"), "{}", third.rationale);
    assert!(!e.extended().active);
}

#[test]
fn upgraded_meal_is_counted_once() {
    let therapy = Therapy {
        target: 5.0,
        ..Therapy::default()
    };
    let trace = [
        5.0, 5.0, 5.0, 5.0, 5.2, 5.5, 5.9, 6.3, 6.9, 7.5, 8.1, 8.4, 8.5, 8.4, 8.1, 7.8, 7.5,
    ];
    let mut e = generic_engine();
    let mut max_carbs: f64 = 0.0;
    let mut meal_doses = 0;
    for n in 3..=trace.len() {
        let h = series(&trace[..n], 0.0);
        let advice = e.advise(&h, &therapy, None, now_of(&h));
        if advice.phase == Phase::MealBolus && advice.should_deliver {
            meal_doses += 1;
        }
        max_carbs = max_carbs.max(advice.detected_carbs);
        assert!(
            advice.carbs_on_board <= advice.detected_carbs + 1e-9,
            "cycle {n}: {advice:?}"
        );
    }
    assert_eq!(max_carbs, 14.0);
    assert!(meal_doses >= 1);
    assert!(e.profile().total_samples <= 1);
    assert!(e.store().outcome_count() <= 1);
}

#[test]
fn meal_below_target_reserves_the_rest() {
    let therapy = Therapy {
        target: 8.0,
        ..Therapy::default()
    };
    let mut e = engine();
    let h = series(&[5.0, 5.0, 5.3, 5.8, 6.3, 6.8], 0.0);
    let first = e.advise(&h, &therapy, None, now_of(&h));
    assert_eq!(first.phase, Phase::MealBelowTarget);
    assert!(first.should_deliver);
    assert!((first.dose - 0.4).abs() < 1e-9, "{first:?}");
    assert!(first.reserved_dose > 0.5);
    let reserved = e.reserved().cloned().expect("reservation created");

    // same episode, carbs already covered: nothing new, reservation untouched
    let h = series(&[5.0, 5.0, 5.3, 5.8, 6.3, 6.8, 7.3], 0.0);
    let second = e.advise(&h, &therapy, None, now_of(&h));
    assert_eq!(second.phase, Phase::Stable);
    assert_eq!(second.dose, 0.0);
    assert_eq!(e.reserved(), Some(&reserved));
}

#[test]
fn scored_meal_updates_profile_and_store() {
    let therapy = Therapy {
        target: 8.0,
        ..Therapy::default()
    };
    let mut e = generic_engine();
    let trace = [
        5.0, 5.0, 5.3, 5.8, 6.3, 6.8, 7.3, 7.6, 7.7, 7.6, 7.4, 7.1,
    ];
    for n in 3..=trace.len() {
        let h = series(&trace[..n], 0.0);
        let advice = e.advise(&h, &therapy, None, now_of(&h));
        assert_ne!(advice.phase, Phase::Error);
    }
    assert_eq!(e.profile().total_samples, 1);
    assert!(e.profile().confidence > 0.0);
    assert_eq!(e.store().outcome_count(), 1);
    assert!(e.store().profile().is_some());
}

#[rstest]
#[case::jump(&[6.0, 6.1, 8.0], Phase::SafetySensorError, SensorIssue::JumpTooLarge)]
#[case::compression(&[6.0, 5.5, 4.8, 3.6, 3.6], Phase::SafetyCompressionLow, SensorIssue::CompressionLow)]
#[case::oscillation(&[6.0, 6.5, 6.0, 6.5, 6.0, 6.5], Phase::SafetySensorError, SensorIssue::Oscillation)]
fn sensor_issues_never_deliver(
    #[case] values: &[f64],
    #[case] phase: Phase,
    #[case] issue: SensorIssue,
) {
    let h = series(values, 0.0);
    let advice = engine().advise(&h, &Therapy::default(), None, now_of(&h));
    assert_eq!(advice.phase, phase);
    assert_eq!(advice.sensor_issue, Some(issue));
    assert_eq!(advice.dose, 0.0);
    assert!(!advice.should_deliver);
}

#[test]
fn short_history_is_insufficient() {
    let h = series(&[6.0, 6.2], 0.0);
    let advice = engine().advise(&h, &Therapy::default(), None, now_of(&h));
    assert_eq!(advice.phase, Phase::InsufficientData);
    assert_eq!(advice.dose, 0.0);
    assert!(!advice.should_deliver);
}

#[test]
fn in_band_glucose_is_stable() {
    let h = series(&[6.2, 6.2, 6.3, 6.2, 6.2], 0.0);
    let advice = engine().advise(&h, &Therapy::default(), None, now_of(&h));
    assert_eq!(advice.phase, Phase::Stable);
    assert_eq!(advice.phase.tag(), "stable");
    assert_eq!(advice.dose, 0.0);
}

#[test]
fn non_finite_input_degrades_to_safe_error() {
    let mut h = series(&[10.0, 10.0, 10.0, 10.0, 10.0], 0.0);
    h[2].glucose = f64::NAN;
    let mut e = engine();
    let err = e
        .try_advise(&h, &Therapy::default(), None, now_of(&h))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let advice = e.advise(&h, &Therapy::default(), None, now_of(&h));
    assert_eq!(advice.phase, Phase::Error);
    assert_eq!(advice.phase.tag(), "error");
    assert_eq!(advice.dose, 0.0);
    assert!(!advice.should_deliver);
    assert!(advice.rationale.contains("not finite"), "{}", advice.rationale);
}

#[rstest]
#[case::zero_max_bolus(Therapy { max_bolus: 0.0, ..Therapy::default() })]
#[case::nan_target(Therapy { target: f64::NAN, ..Therapy::default() })]
#[case::zero_max_iob(Therapy { max_iob: 0.0, ..Therapy::default() })]
fn bad_therapy_is_an_error_advice(#[case] therapy: Therapy) {
    let h = series(&[10.0, 10.0, 10.0, 10.0, 10.0], 0.0);
    let mut e = engine();
    assert!(matches!(
        e.try_advise(&h, &therapy, None, now_of(&h)),
        Err(EngineError::InvalidTherapy(_))
    ));
    let advice = e.advise(&h, &therapy, None, now_of(&h));
    assert_eq!(advice.phase, Phase::Error);
    assert!(!advice.should_deliver);
}

#[test]
fn dose_reduction_scales_the_final_dose() {
    let h = series(&[10.0, 10.0, 10.0, 10.0, 10.0], 0.0);
    let therapy = Therapy {
        dose_reduction_pct: 25.0,
        ..Therapy::default()
    };
    let advice = confident_engine().advise(&h, &therapy, None, now_of(&h));
    assert!((advice.dose - 1.5).abs() < 1e-9);
    assert!(is_step_multiple(advice.dose));
}

#[test]
fn caller_prediction_is_ignored_when_not_rising() {
    let h = series(&[9.0, 9.0, 9.0, 9.0, 9.0], 0.0);
    let advice = engine().advise(&h, &Therapy::default(), Some(14.0), now_of(&h));
    assert_eq!(advice.predicted_peak, 9.0);
    assert!(advice.rationale.contains("predicted peak held"));
}

#[test]
fn reset_clears_the_episode() {
    let h = series(&[6.0, 6.5, 7.2], 0.0);
    let mut e = engine();
    e.advise(&h, &Therapy::default(), None, now_of(&h));
    assert_eq!(e.meal_state(), MealState::Rising);
    e.reset();
    assert_eq!(e.meal_state(), MealState::None);
}

fn outcome(carbs: f64, rise: f64) -> bolus_core::MealOutcome {
    bolus_core::MealOutcome {
        detected_at: t(0),
        peak_at: t(45),
        carbs_g: carbs,
        insulin_u: 2.0,
        start_glucose: 6.0,
        peak_glucose: 6.0 + rise,
    }
}

#[test]
fn observed_outcome_is_learned_and_persisted() {
    let mut e = generic_engine();
    // expected rise for 30 g at neutral ratio is 6.0; a 9.0 rise means under-dosed
    let record = e.observe_outcome(&outcome(30.0, 9.0), t(120)).unwrap();
    assert!((record.effectiveness - 1.5).abs() < 1e-9);
    assert_eq!(record.time_to_peak_min, 45.0);
    assert!((e.profile().personal_carb_ratio - 1.2).abs() < 1e-9);
    assert!((e.profile().personal_isf - 1.05).abs() < 1e-9);
    assert_eq!(e.profile().total_samples, 1);
    assert_eq!(e.store().outcome_count(), 1);
    assert_eq!(e.store().profile(), Some(e.profile()));
}

#[test]
fn zero_carb_outcome_is_ignored() {
    let mut e = generic_engine();
    assert!(e.observe_outcome(&outcome(0.0, 2.0), t(60)).is_none());
    assert_eq!(e.profile(), &LearningProfile::default());
    assert_eq!(e.store().outcome_count(), 0);
}

#[test]
fn store_failures_do_not_stop_learning() {
    let mut e = build_engine(
        bolus_core::mocks::FailingStore::default(),
        MealCfg::default(),
        SafetyCfg::default(),
        ExtendedCfg::default(),
        LearningCfg::default(),
    )
    .unwrap();
    assert!(e.observe_outcome(&outcome(30.0, 6.0), t(90)).is_some());
    assert_eq!(e.profile().total_samples, 1);
    // load at build, then profile and outcome saves
    assert_eq!(e.store().attempts, 3);

    let err = e.reset_learning().unwrap_err();
    assert!(matches!(err, EngineError::StoreIo(_)), "{err:?}");
    assert_eq!(e.profile(), &LearningProfile::default());
}

#[test]
fn reset_learning_persists_defaults() {
    let mut e = generic_engine();
    e.observe_outcome(&outcome(30.0, 3.0), t(90)).unwrap();
    assert_ne!(e.profile(), &LearningProfile::default());
    assert_eq!(e.store().outcome_count(), 1);
    e.reset_learning().unwrap();
    assert_eq!(e.store().profile(), Some(&LearningProfile::default()));
    assert_eq!(e.store().outcome_count(), 0);
}
