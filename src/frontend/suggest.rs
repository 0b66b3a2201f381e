use strsim::levenshtein;

/// Max edit distance worth suggesting for a name of the given length.
fn max_distance(len: usize) -> usize {
    match len {
        0..=3 => 1,
        4..=7 => 2,
        _ => 3,
    }
}

/// Ranks candidate names against `needle` by edit distance, closest first.
/// Names sharing a prefix with the needle win ties, so `gret` prefers
/// `greet` over `great`.
pub fn rank(needle: &str, candidates: impl IntoIterator<Item = String>) -> Vec<String> {
    let needle = needle.trim();
    if needle.is_empty() {
        return vec![];
    }
    let cutoff = max_distance(needle.len());
    let mut scored: Vec<(usize, usize, String)> = candidates
        .into_iter()
        .filter(|c| !c.is_empty() && c != needle)
        .map(|c| {
            let dist = levenshtein(needle, &c);
            let common = needle
                .chars()
                .zip(c.chars())
                .take_while(|(a, b)| a == b)
                .count();
            (dist, common, c)
        })
        .filter(|(dist, _, _)| *dist <= cutoff)
        .collect();
    scored.sort_by(|(da, ca, a), (db, cb, b)| da.cmp(db).then(cb.cmp(ca)).then(a.cmp(b)));
    scored.dedup_by(|a, b| a.2 == b.2);
    scored.into_iter().take(3).map(|(_, _, c)| c).collect()
}

pub fn did_you_mean(needle: &str, candidates: impl IntoIterator<Item = String>) -> Option<String> {
    let ranked = rank(needle, candidates);
    match ranked.len() {
        0 => None,
        1 => Some(format!("did you mean `{}`?", ranked[0])),
        _ => Some(format!(
            "did you mean one of: {}?",
            ranked
                .iter()
                .map(|s| format!("`{}`", s))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_shared_prefix_on_equal_distance() {
        let ranked = rank(
            "gret",
            ["great".to_string(), "greet".to_string(), "gget".to_string()],
        );
        assert_eq!(ranked.first().map(String::as_str), Some("greet"));
    }

    #[test]
    fn far_names_are_not_suggested() {
        assert!(rank("log", ["unrelated".to_string()]).is_empty());
    }
}
