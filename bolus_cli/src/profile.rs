//! `profile` and `self-check` commands.

use bolus_core::store_error::map_store_error;
use bolus_core::{Engine, GlucoseSample, Phase, Therapy};
use bolus_traits::{LearningProfile, LearningStore};
use chrono::{Duration, Utc};
use serde_json::json;

/// Print the stored profile, or clear the store and save defaults when
/// `reset` is set.
pub fn run_profile(
    store: &mut dyn LearningStore,
    reset: bool,
    json: bool,
) -> eyre::Result<()> {
    if reset {
        store
            .clear()
            .map_err(|e| eyre::Report::new(map_store_error(&*e)))?;
        let profile = LearningProfile::default();
        store
            .save(&profile)
            .map_err(|e| eyre::Report::new(map_store_error(&*e)))?;
        tracing::info!("learning profile reset");
        if json {
            println!("{}", json!({ "reset": true, "profile": profile }));
        } else {
            println!("learning profile reset to defaults");
        }
        return Ok(());
    }

    let stored = store
        .load()
        .map_err(|e| eyre::Report::new(map_store_error(&*e)))?;
    let outcomes = store
        .load_outcomes()
        .map_err(|e| eyre::Report::new(map_store_error(&*e)))?;
    let is_default = stored.is_none();
    let profile = stored.unwrap_or_default().sanitized();

    if json {
        println!(
            "{}",
            json!({
                "stored": !is_default,
                "outcomes": outcomes.len(),
                "profile": profile,
            })
        );
        return Ok(());
    }

    if is_default {
        println!("no stored profile; defaults in use");
    }
    println!("carb ratio factor: {:.3}", profile.personal_carb_ratio);
    println!("ISF factor:        {:.3}", profile.personal_isf);
    println!("confidence:        {:.2}", profile.confidence);
    println!("scored meals:      {}", profile.total_samples);
    println!("stored outcomes:   {}", outcomes.len());
    if let Some(at) = profile.last_updated {
        println!("last updated:      {}", at.to_rfc3339());
    }
    for (bucket, f) in &profile.meal_timing_factors {
        println!("timing {bucket:?}: {f:.3}");
    }
    Ok(())
}

/// Run a synthetic in-range cycle; anything but a zero-dose `stable` advice fails.
pub fn run_self_check(engine: &mut Engine, therapy: &Therapy, json: bool) -> eyre::Result<()> {
    let now = Utc::now();
    let history: Vec<GlucoseSample> = (0..6_i64)
        .map(|i| GlucoseSample::new(now - Duration::minutes(5 * (5 - i)), therapy.target, 0.0))
        .collect();
    let advice = engine.try_advise(&history, therapy, None, now)?;
    if advice.phase != Phase::Stable || advice.dose != 0.0 || advice.should_deliver {
        eyre::bail!(
            "self-check cycle returned {} with {:.2} U",
            advice.phase.tag(),
            advice.dose
        );
    }
    tracing::info!("self-check ok");
    if json {
        println!(
            "{}",
            json!({
                "ok": true,
                "phase": advice.phase.tag(),
                "learning_confidence": advice.learning.confidence,
            })
        );
    } else {
        println!("ok");
    }
    Ok(())
}
