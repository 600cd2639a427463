//! Text shown to the player. Layout and rendering live outside the core.

use crate::{Hit, Judgment, ScoreSummary};

pub fn offset_value(offset_ms: f64) -> String {
    let sign = if offset_ms >= 0.0 { "+" } else { "" };
    format!("{sign}{offset_ms:.0}ms")
}

pub fn offset_label(offset_ms: f64) -> String {
    format!("Offset: {}", offset_value(offset_ms))
}

/// Empty until the combo reaches 2.
pub fn combo_text(combo: u32) -> String {
    if combo > 1 {
        format!("{combo}x COMBO")
    } else {
        String::new()
    }
}

pub fn judgment_text(judgment: Judgment) -> String {
    match judgment {
        Judgment::Perfect => "Perfect!".to_string(),
        other => other.to_string(),
    }
}

/// Judgment plus an Early/Late suffix when the hit was noticeably off.
pub fn hit_feedback(hit: &Hit) -> String {
    let text = judgment_text(hit.judgment);
    match hit.timing {
        Some(timing) => format!("{text} {timing}"),
        None => text,
    }
}

pub fn song_info(tempo_bpm: Option<f64>) -> String {
    tempo_bpm
        .map(|tempo| format!("{tempo:.0} BPM"))
        .unwrap_or_default()
}

pub fn results(summary: &ScoreSummary) -> String {
    format!(
        "Song Complete!\nScore: {}\nMax Combo: {}x\nPerfect: {} | Good: {} | OK: {} | Miss: {}",
        summary.score, summary.max_combo, summary.perfect, summary.good, summary.ok, summary.miss
    )
}
