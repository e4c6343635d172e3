use std::borrow::Cow;

pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// Cut `value` to at most 497 bytes on a char boundary, appending `...` when something was dropped.
pub fn truncated(value: &str) -> Cow<'_, str> {
    const MAX: usize = 497;
    if value.len() <= MAX {
        return Cow::Borrowed(value);
    }
    let mut end = MAX;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}...", value[..end].trim_end()))
}

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        $crate::truncated(::std::convert::AsRef::<str>::as_ref(&$query))
    };
}

/// Format a statement and its arguments for error contexts.
#[macro_export]
macro_rules! printable_query {
    ($query:expr, $args:expr) => {
        format_args!(
            "{}\n  args: [{}]",
            $crate::truncate_long!($query),
            $args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated() {
        let mut out = String::from("SELECT ");
        separated_by(&mut out, ["a", "b", "c"], |out, v| out.push_str(v), ", ");
        assert_eq!(out, "SELECT a, b, c");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(400);
        let cut = truncated(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 500);
        assert_eq!(truncated("short"), "short");
    }
}
