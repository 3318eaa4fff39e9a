//! History replay: config mapping, per-cycle advice and output lines.

use std::path::Path;

use bolus_core::{Advice, Engine, GlucoseSample, MIN_HISTORY, Therapy};
use chrono::{DateTime, Utc};
use eyre::WrapErr;
use serde_json::json;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ReplaySummary {
    pub cycles: usize,
    pub delivered: usize,
    pub total_units: f64,
    pub errors: usize,
}

pub fn run_replay(
    engine: &mut Engine,
    therapy: &Therapy,
    samples: &Path,
    predicted_rise: Option<f64>,
    window: usize,
    delivered_only: bool,
    json: bool,
) -> eyre::Result<ReplaySummary> {
    let rows = bolus_config::load_samples_csv(samples)
        .wrap_err_with(|| format!("load history {}", samples.display()))?;
    let history: Vec<GlucoseSample> = rows.iter().map(GlucoseSample::from).collect();
    let window = window.max(MIN_HISTORY);
    tracing::info!(samples = history.len(), window, "replay start");

    let mut summary = ReplaySummary::default();
    for end in 1..=history.len() {
        let start = end.saturating_sub(window);
        let slice = &history[start..end];
        let newest = slice[slice.len() - 1];
        let predicted = predicted_rise.map(|r| newest.glucose + r);

        let advice = engine.advise(slice, therapy, predicted, newest.timestamp);
        summary.cycles += 1;
        if advice.should_deliver {
            summary.delivered += 1;
            summary.total_units += advice.dose;
        }
        if advice.phase == bolus_core::Phase::Error {
            summary.errors += 1;
        }
        if delivered_only && !advice.should_deliver {
            continue;
        }
        if json {
            println!("{}", advice_json(newest.timestamp, &newest, &advice));
        } else {
            println!("{}", advice_text(newest.timestamp, &newest, &advice));
        }
    }

    if json {
        println!(
            "{}",
            json!({
                "summary": {
                    "cycles": summary.cycles,
                    "delivered": summary.delivered,
                    "total_units": round2(summary.total_units),
                    "errors": summary.errors,
                }
            })
        );
    } else {
        println!(
            "replayed {} cycles: {} deliveries, {:.2} U total",
            summary.cycles, summary.delivered, summary.total_units
        );
    }
    tracing::info!(
        cycles = summary.cycles,
        delivered = summary.delivered,
        total_units = summary.total_units,
        "replay complete"
    );
    Ok(summary)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn advice_json(at: DateTime<Utc>, sample: &GlucoseSample, a: &Advice) -> serde_json::Value {
    json!({
        "timestamp": at.to_rfc3339(),
        "glucose": sample.glucose,
        "iob": sample.iob,
        "phase": a.phase.tag(),
        "dose": a.dose,
        "deliver": a.should_deliver,
        "confidence": round2(a.confidence),
        "predicted_peak": round2(a.predicted_peak),
        "meal_state": a.meal_state.tag(),
        "meal_detected": a.meal_detected,
        "detected_carbs": a.detected_carbs,
        "reserved_dose": round2(a.reserved_dose),
        "carbs_on_board": round2(a.carbs_on_board),
        "sensor_issue": a.sensor_issue.map(|s| s.describe()),
        "rationale": a.rationale,
        "learning": {
            "carb_ratio": a.learning.personal_carb_ratio,
            "isf": a.learning.personal_isf,
            "confidence": a.learning.confidence,
            "samples": a.learning.total_samples,
        },
    })
}

fn advice_text(at: DateTime<Utc>, sample: &GlucoseSample, a: &Advice) -> String {
    let mark = if a.should_deliver { "DELIVER" } else { "-" };
    format!(
        "{} g={:.1} iob={:.2} {:<20} dose={:.2} {mark:<7} | {}",
        at.format("%Y-%m-%dT%H:%M:%SZ"),
        sample.glucose,
        sample.iob,
        a.phase.tag(),
        a.dose,
        a.rationale
    )
}
