use std::fmt::Display;

/// Upper bound on a batch description, in bytes (and therefore characters).
pub const MAX_DESCRIPTION_LEN: usize = 1024;

pub(crate) const DELIMITER: &str = ", ";

/// Join the non-empty `Display` forms of `tasks` with `", "`, bounded by
/// [`MAX_DESCRIPTION_LEN`].
pub fn describe_tasks<'a, T>(tasks: impl IntoIterator<Item = &'a T>) -> String
where
    T: Display + ?Sized + 'a,
{
    let items: Vec<String> = tasks
        .into_iter()
        .map(ToString::to_string)
        .filter(|s| !s.is_empty())
        .collect();
    join_with_limit(&items, DELIMITER, MAX_DESCRIPTION_LEN)
}

/// Join `items` so the output never exceeds `limit` bytes.
///
/// When not everything fits, the output ends with
/// `... (N in total, M omitted)`; the last included item may be cut short to
/// make room for that marker.
pub(crate) fn join_with_limit(items: &[String], delimiter: &str, limit: usize) -> String {
    let total = items.len();
    let mut out = String::new();

    for (i, item) in items.iter().enumerate() {
        let sep = if i == 0 { "" } else { delimiter };
        if out.len() + sep.len() + item.len() <= limit {
            out.push_str(sep);
            out.push_str(item);
            continue;
        }

        let omitted = total - i;
        let marker = format!("{sep}... ({total} in total, {omitted} omitted)");
        truncate_at_char_boundary(&mut out, limit.saturating_sub(marker.len()));
        out.push_str(&marker);
        truncate_at_char_boundary(&mut out, limit);
        break;
    }
    out
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
