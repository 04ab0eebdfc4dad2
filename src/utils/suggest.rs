//! "Did you mean" matching for mistyped command names.

fn fold(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

fn tolerance(len: usize) -> usize {
    match len {
        0 => 0,
        1..=4 => 1,
        5..=8 => 2,
        _ => (len / 3).max(3),
    }
}

/// Closest `known` names to `input`, best first, at most `limit`.
pub fn suggest(input: &str, known: &[&str], limit: usize) -> Vec<String> {
    let needle = fold(input);
    if needle.is_empty() {
        return Vec::new();
    }
    let needle_chars: Vec<char> = needle.chars().collect();
    let allowed = tolerance(needle_chars.len());

    let mut scored: Vec<(usize, &str)> = known
        .iter()
        .filter_map(|candidate| {
            let folded = fold(candidate);
            if folded.is_empty() {
                return None;
            }
            let score = if folded == needle {
                0
            } else if folded.contains(&needle) || needle.contains(&folded) {
                1
            } else {
                let chars: Vec<char> = folded.chars().collect();
                edit_distance(&needle_chars, &chars)
            };
            (score <= allowed).then_some((score, *candidate))
        })
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.len().cmp(&b.1.len())).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(limit.max(1))
        .map(|(_, name)| name.to_string())
        .collect()
}
