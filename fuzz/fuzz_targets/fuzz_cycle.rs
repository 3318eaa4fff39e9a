#![no_main]
use bolus_core::{Engine, GlucoseSample, Therapy};
use bolus_store::MemoryStore;
use chrono::{Duration, TimeZone, Utc};
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    readings: Vec<(u16, u8, u8)>,
    max_bolus_tenths: u8,
    max_iob_tenths: u8,
}

fuzz_target!(|input: Input| {
    let Ok(mut engine) = Engine::builder().with_store(MemoryStore::default()).build() else {
        return;
    };
    let therapy = Therapy {
        max_bolus: f64::from(input.max_bolus_tenths.max(1)) / 10.0,
        max_iob: f64::from(input.max_iob_tenths.max(1)) / 10.0,
        ..Therapy::default()
    };
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut at = start;
    let mut history = Vec::new();
    for (g, iob, gap) in input.readings.into_iter().take(64) {
        at += Duration::minutes(i64::from(gap % 15) + 1);
        history.push(GlucoseSample::new(
            at,
            f64::from(g) / 1000.0,
            f64::from(iob) / 10.0,
        ));
        let advice = engine.advise(&history, &therapy, None, at);
        assert!(advice.dose >= 0.0 && advice.dose <= therapy.max_bolus + 1e-9);
        if advice.sensor_issue.is_some() {
            assert!(!advice.should_deliver);
        }
    }
});
