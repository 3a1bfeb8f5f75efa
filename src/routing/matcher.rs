//! Wildcard topic matching
//!
//! Pure matching of concrete `/`-delimited topics against subscription
//! patterns with MQTT wildcards: `+` matches exactly one level, `#`
//! matches all remaining levels and is only legal as the final pattern
//! segment. Matching is case-sensitive and never crosses segment
//! boundaries.

/// Decide whether `topic` matches the subscription `pattern`
///
/// Patterns with `#` in a non-final position are invalid and match
/// nothing.
///
/// # Examples
///
/// ```
/// use twinlink::routing::topic_matches;
///
/// assert!(topic_matches("station/sensors/042/data", "station/sensors/+/data"));
/// assert!(topic_matches("station/sensors/042/data", "station/#"));
/// assert!(!topic_matches("station/sensors", "station/sensors/+"));
/// ```
pub fn topic_matches(topic: &str, pattern: &str) -> bool {
    let actual: Vec<&str> = topic.split('/').collect();
    let segments: Vec<&str> = pattern.split('/').collect();

    // `#` anywhere but the last segment invalidates the whole pattern
    if segments[..segments.len().saturating_sub(1)]
        .iter()
        .any(|s| *s == "#")
    {
        return false;
    }

    match_segments(&actual, &segments)
}

fn match_segments(actual: &[&str], pattern: &[&str]) -> bool {
    match pattern.split_first() {
        None => actual.is_empty(),
        Some((&"#", _)) => true,
        Some((&"+", rest)) => match actual.split_first() {
            Some((level, remaining)) if !level.is_empty() => match_segments(remaining, rest),
            _ => false,
        },
        Some((segment, rest)) => match actual.split_first() {
            Some((level, remaining)) if level == segment => match_segments(remaining, rest),
            _ => false,
        },
    }
}
