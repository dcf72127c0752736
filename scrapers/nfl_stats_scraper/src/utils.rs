use regex::Regex;
use std::sync::LazyLock;

static FIELD_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(Own|Opp) (\d+\.?\d*)").unwrap());

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid clock '{0}', expected M:SS")]
    Clock(String),
}

/// Converts an "M:SS" clock string into total seconds.
pub fn clock_to_seconds(clock: &str) -> Result<u32, FormatError> {
    let invalid = || FormatError::Clock(clock.to_string());

    let (minutes, seconds) = clock.trim().split_once(':').ok_or_else(invalid)?;
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !digits(minutes) || !digits(seconds) {
        return Err(invalid());
    }

    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    let seconds: u32 = seconds.parse().map_err(|_| invalid())?;
    if seconds >= 60 {
        return Err(invalid());
    }

    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(invalid)
}

/// Converts "Own N" / "Opp N" into yards from the opponent's goal line.
/// Anything else (blank, "Midfield", kickoffs) has no position.
pub fn field_position_to_yards(position: &str) -> Option<f64> {
    let caps = FIELD_POSITION.captures(position)?;
    let yards: f64 = caps[2].parse().ok()?;
    match &caps[1] {
        "Own" => Some(100.0 - yards),
        _ => Some(yards),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptsMade {
    pub attempts: u32,
    pub made: u32,
    pub percentage: f64,
}

/// Splits an "A_M" attempts/made cell. Unparseable parts count as zero and
/// zero attempts give a zero percentage.
pub fn split_attempts_made(cell: &str) -> AttemptsMade {
    let mut parts = cell.trim().splitn(2, '_');
    let mut next = || {
        parts
            .next()
            .and_then(|part| part.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };
    let attempts = next();
    let made = next();

    let percentage = if attempts == 0 {
        0.0
    } else {
        round2(made as f64 / attempts as f64 * 100.0)
    };

    AttemptsMade {
        attempts,
        made,
        percentage,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `numerator / denominator` as a percentage with two decimals. A zero or
/// absent denominator has no rate.
pub fn rate(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(round2(n / d * 100.0)),
        _ => None,
    }
}

/// Share of attempts that were stopped, as a percentage with two decimals.
pub fn stop_rate(made: Option<f64>, attempts: Option<f64>) -> Option<f64> {
    let made = made?;
    rate(attempts.map(|a| a - made), attempts)
}
