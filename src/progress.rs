use serde::Serialize;

use crate::models::ProgressLog;

const TREND_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub entries: usize,
    pub latest_pain_level: Option<i64>,
    pub latest_mobility: Option<i64>,
    pub pain_trend: Trend,
    pub mobility_trend: Trend,
}

fn mean(values: &[i64]) -> f64 {
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

/// Compares the mean of the newer half of `values` against the older half.
/// With an odd count the middle entry belongs to the newer half.
fn direction(values: &[i64], higher_is_better: bool) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }

    let (older, newer) = values.split_at(values.len() / 2);
    let delta = mean(newer) - mean(older);

    if delta.abs() < TREND_TOLERANCE {
        Trend::Stable
    } else if (delta > 0.0) == higher_is_better {
        Trend::Improving
    } else {
        Trend::Declining
    }
}

/// Summarises logs that are already sorted oldest first.
pub fn summarize(logs: &[ProgressLog]) -> ProgressSummary {
    let pain: Vec<i64> = logs.iter().map(|l| l.pain_level).collect();
    let mobility: Vec<i64> = logs.iter().map(|l| l.mobility).collect();

    ProgressSummary {
        entries: logs.len(),
        latest_pain_level: pain.last().copied(),
        latest_mobility: mobility.last().copied(),
        pain_trend: direction(&pain, false),
        mobility_trend: direction(&mobility, true),
    }
}
