use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Rule deciding whether a task runs once all of its upstream tasks are
/// terminal.
///
/// - `AllSuccess`: run only if every upstream task succeeded (default).
/// - `OneFailed`: run only if at least one upstream task failed.
/// - `AllDone`: run regardless of how the upstream tasks ended.
///
/// A task without upstream tasks satisfies every rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    AllSuccess,
    OneFailed,
    AllDone,
}

impl Default for TriggerRule {
    fn default() -> Self {
        TriggerRule::AllSuccess
    }
}

impl FromStr for TriggerRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all_success" => Ok(TriggerRule::AllSuccess),
            "one_failed" => Ok(TriggerRule::OneFailed),
            "all_done" => Ok(TriggerRule::AllDone),
            other => Err(format!(
                "invalid trigger_rule: {other} (expected \"all_success\", \"one_failed\" or \"all_done\")"
            )),
        }
    }
}

impl fmt::Display for TriggerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerRule::AllSuccess => "all_success",
            TriggerRule::OneFailed => "one_failed",
            TriggerRule::AllDone => "all_done",
        };
        f.write_str(s)
    }
}

/// Parse a duration string such as `"250ms"`, `"10s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is out of range"))
}
