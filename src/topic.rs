//! Topic filter matching
//!
//! Structural MQTT matching: `/` separates levels, `+` matches exactly one
//! level, `#` (final level only) matches all remaining levels including
//! zero. Topics starting with `$` are reserved for the broker and are never
//! matched by a filter whose first level is a wildcard.

/// Parse a shared subscription filter.
/// Returns `(group, actual_filter)` for `$share/{group}/{filter}`, or `None`.
pub fn parse_shared_subscription(filter: &str) -> Option<(&str, &str)> {
    let rest = filter.strip_prefix("$share/")?;
    let slash_pos = rest.find('/')?;
    let group = &rest[..slash_pos];
    let actual_filter = &rest[slash_pos + 1..];
    if group.is_empty() || actual_filter.is_empty() {
        return None;
    }
    Some((group, actual_filter))
}

/// Check whether a topic filter matches a topic name.
///
/// A `$share/{group}/{filter}` filter matches with `{filter}`; the group
/// qualifier only routes load balancing on the broker side.
pub fn filter_matches_topic(filter: &str, topic: &str) -> bool {
    let filter = match parse_shared_subscription(filter) {
        Some((_, actual)) => actual,
        None => filter,
    };

    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let filter_levels: Vec<&str> = filter.split('/').collect();
    let topic_levels: Vec<&str> = topic.split('/').collect();

    let mut fi = 0;
    let mut ti = 0;

    while fi < filter_levels.len() {
        let filter_level = filter_levels[fi];

        if filter_level == "#" {
            // Matches everything remaining, including zero levels
            return true;
        }

        if ti >= topic_levels.len() {
            return false;
        }

        if filter_level == "+" || filter_level == topic_levels[ti] {
            fi += 1;
            ti += 1;
        } else {
            return false;
        }
    }

    // Both must be exhausted for a match
    ti == topic_levels.len()
}
