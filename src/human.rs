use std::time::Duration;

const UNITS: [(&str, u64); 3] = [("day", 86_400), ("hour", 3_600), ("minute", 60)];

/// Render a duration as `"1 hour, 2 minutes, 3.5 seconds"`. Units
/// larger than the duration are omitted; seconds are always shown.
#[must_use]
pub fn humanize(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    let mut parts = Vec::new();

    for (unit, size) in UNITS {
        if secs >= size {
            let n = secs / size;
            secs %= size;
            parts.push(plural(&n.to_string(), unit, n == 1));
        }
    }

    let millis = duration.subsec_millis();
    let seconds = if millis == 0 {
        secs.to_string()
    } else {
        let frac = format!("{millis:03}");
        format!("{secs}.{}", frac.trim_end_matches('0'))
    };
    parts.push(plural(&seconds, "second", secs == 1 && millis == 0));

    parts.join(", ")
}

fn plural(n: &str, unit: &str, one: bool) -> String {
    if one {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
