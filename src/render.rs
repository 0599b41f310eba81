//! Terminal rendering of chat lines, the analysis panel and the stats panel.
//!
//! Formatting helpers (`percent`, `toxicity_level`, `badge`, emoji lookups)
//! return plain strings so they can be tested without a terminal; the
//! `render_*` functions add colour with `colored`.

use std::collections::HashMap;

use colored::*;
use once_cell::sync::Lazy;

use crate::session::{LogEntry, SelfAnalysis};
use crate::stats::{top_entries, StatsState};

/// How many entries each stats breakdown shows.
pub const BREAKDOWN_LIMIT: usize = 5;

pub const ANALYSIS_PLACEHOLDER: &str = "Send a message to see real-time AI analysis";
pub const STATS_LOADING: &str = "Loading...";
pub const STATS_UNAVAILABLE: &str = "Unable to load statistics";
pub const EMPTY_LOG: &str = "No messages yet. Start the conversation!";

static INTENT_EMOJI: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("question", "❓"),
        ("complaint", "😤"),
        ("insult", "😡"),
        ("threat", "⚠️"),
        ("positive", "😊"),
        ("disagreement", "🤔"),
        ("neutral", "😐"),
    ])
});

static TONE_EMOJI: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("polite", "🤗"),
        ("rude", "😠"),
        ("aggressive", "🔥"),
        ("passive-aggressive", "😏"),
        ("sarcastic", "🙄"),
        ("neutral", "😐"),
        ("frustrated", "😤"),
    ])
});

pub fn intent_emoji(label: &str) -> &'static str {
    INTENT_EMOJI.get(label).copied().unwrap_or("💬")
}

pub fn tone_emoji(label: &str) -> &'static str {
    TONE_EMOJI.get(label).copied().unwrap_or("💭")
}

/// Severity band of a toxicity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToxicityLevel {
    Clean,
    SlightConcern,
    Moderate,
    High,
}

impl ToxicityLevel {
    pub fn label(self) -> &'static str {
        match self {
            ToxicityLevel::Clean => "Clean",
            ToxicityLevel::SlightConcern => "Slight Concern",
            ToxicityLevel::Moderate => "Moderate",
            ToxicityLevel::High => "High Toxicity",
        }
    }

    fn paint(self, text: &str) -> ColoredString {
        match self {
            ToxicityLevel::Clean => text.green(),
            ToxicityLevel::SlightConcern => text.yellow(),
            ToxicityLevel::Moderate => text.bright_red(),
            ToxicityLevel::High => text.red().bold(),
        }
    }
}

/// Band boundaries are exclusive: exactly 0.7 is still `Moderate`.
pub fn toxicity_level(score: f64) -> ToxicityLevel {
    if score > 0.7 {
        ToxicityLevel::High
    } else if score > 0.5 {
        ToxicityLevel::Moderate
    } else if score > 0.3 {
        ToxicityLevel::SlightConcern
    } else {
        ToxicityLevel::Clean
    }
}

/// `0.73` → `"73.0%"`
pub fn percent(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

/// `0.856` → `"86%"`
pub fn confidence(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

/// Badge for a chat line: only flagged lines scoring above 0.5 get one.
pub fn badge(entry: &LogEntry) -> Option<&'static str> {
    if !entry.is_flagged() {
        return None;
    }
    let score = entry.toxicity_score.unwrap_or(0.0);
    if score > 0.7 {
        Some("⚠️ High Toxicity")
    } else if score > 0.5 {
        Some("⚡ Moderate")
    } else {
        None
    }
}

/// `HH:MM:SS` from an ISO-8601 timestamp; the input unchanged when it has no
/// time part.
pub fn clock_time(timestamp: &str) -> &str {
    match timestamp.split_once('T') {
        Some((_, time)) => time.get(..8).unwrap_or(timestamp),
        None => timestamp,
    }
}

/// Capitalise the first character of a label.
fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Chat log
// ---------------------------------------------------------------------------

/// One chat log line. `own_identifier` highlights the user's own messages.
pub fn render_entry(entry: &LogEntry, own_identifier: Option<&str>) -> String {
    if entry.is_system() {
        return format!("  {}", format!("-- {} --", entry.text).dimmed());
    }

    let time = clock_time(&entry.timestamp).dimmed();
    let is_own = own_identifier == Some(entry.username.as_str());
    let name = if is_own {
        entry.username.blue().bold()
    } else {
        entry.username.white().bold()
    };
    let text = if is_own {
        entry.text.normal()
    } else if entry.is_flagged() {
        entry.text.red()
    } else {
        entry.text.normal()
    };

    match badge(entry) {
        Some(b) => format!("[{time}] {name} {} {text}", b.red()),
        None => format!("[{time}] {name} {text}"),
    }
}

pub fn render_log(log: &[LogEntry], own_identifier: Option<&str>) -> Vec<String> {
    if log.is_empty() {
        return vec![EMPTY_LOG.dimmed().to_string()];
    }
    log.iter().map(|e| render_entry(e, own_identifier)).collect()
}

// ---------------------------------------------------------------------------
// Analysis panel
// ---------------------------------------------------------------------------

/// Lines of the analysis panel. The suggested rewrite is only included when
/// `show_rewrite` is set.
pub fn render_analysis(latest: Option<&SelfAnalysis>, show_rewrite: bool) -> Vec<String> {
    let mut lines = vec![format!("{}", "📊 Message Analysis".bold())];

    let Some(latest) = latest else {
        lines.push(ANALYSIS_PLACEHOLDER.dimmed().to_string());
        return lines;
    };
    let a = &latest.analysis;

    let level = toxicity_level(a.toxicity.score);
    lines.push(format!(
        "  Toxicity Score  {}  {}",
        level.paint(&percent(a.toxicity.score)),
        level.label().dimmed()
    ));

    if !a.toxicity.top_categories.is_empty() {
        lines.push(format!(
            "  Detected Issues: {}",
            a.toxicity.top_categories.join(", ").red()
        ));
    }

    lines.push(format!(
        "  {} Intent  {} ({} confident)",
        intent_emoji(&a.intent.label),
        capitalize(&a.intent.label).blue().bold(),
        confidence(a.intent.confidence)
    ));
    if !a.intent.explanation.is_empty() {
        lines.push(format!("      {}", a.intent.explanation.dimmed()));
    }

    lines.push(format!(
        "  {} Tone    {} ({} confident)",
        tone_emoji(&a.tone.label),
        capitalize(&a.tone.label).magenta().bold(),
        confidence(a.tone.confidence)
    ));

    if let Some(msg) = &latest.coaching.message {
        lines.push(format!("  {} {}", "💡 Communication Coaching:".yellow().bold(), msg));
    }

    if let Some(rewrite) = &latest.coaching.suggested_rewrite {
        if show_rewrite {
            lines.push(format!("  {} {}", "✨ Polite Rewrite:".green().bold(), rewrite));
        } else {
            lines.push(format!("  {}", "✨ Polite rewrite available (/rewrite to show)".green()));
        }
    }

    lines
}

// ---------------------------------------------------------------------------
// Stats panel
// ---------------------------------------------------------------------------

pub fn render_stats(state: &StatsState) -> Vec<String> {
    let mut lines = vec![format!("{}", "📈 Statistics".bold())];

    let stats = match state {
        StatsState::Loading => {
            lines.push(STATS_LOADING.dimmed().to_string());
            return lines;
        }
        StatsState::Unavailable => {
            lines.push(STATS_UNAVAILABLE.dimmed().to_string());
            return lines;
        }
        StatsState::Loaded(stats) => stats,
    };

    lines.push(format!(
        "  Active Users    {}",
        stats.active_connections.to_string().green().bold()
    ));
    lines.push(format!(
        "  Total Messages  {}",
        stats.total_messages.to_string().blue().bold()
    ));
    lines.push(format!(
        "  Toxicity Rate   {}  (Clean: {}, Toxic: {})",
        format!("{:.1}%", stats.toxicity_rate).red().bold(),
        stats.clean_messages,
        stats.toxic_messages
    ));

    for (title, map) in [("Intent Breakdown", &stats.intents), ("Tone Breakdown", &stats.tones)] {
        if map.is_empty() {
            continue;
        }
        lines.push(format!("  {}", title.bold()));
        for (label, count) in top_entries(map, BREAKDOWN_LIMIT) {
            lines.push(format!("    {:<20} {}", capitalize(label), count));
        }
    }

    lines
}
