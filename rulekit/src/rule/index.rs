use std::sync::OnceLock;

use regex::Regex;

/**
    Index suffix of a chain segment.

    | Syntax         | Meaning                                   |
    |----------------|-------------------------------------------|
    | `.N`, `[N]`    | the single element at `N`                 |
    | `[a:b]`        | half-open slice, step 1                   |
    | `[a:b:c]`      | half-open slice with step                 |
    | `!a:b:c`       | every element except the listed indices   |
    | `[a,b,!c]`     | listed indices, minus the `!` ones        |

    Negative indices count from the end. A negative slice end `e` means
    `len + e + 1` on DOM node sets, so `[0:-1]` covers everything; JSON
    arrays resolve it as `len + e` (see [`SliceEnd`]).
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexFilter {
    Single(i64),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
    Exclude(Vec<i64>),
    List {
        include: Vec<i64>,
        exclude: Vec<i64>,
    },
}

/// Resolution of a negative slice end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SliceEnd {
    /// `len + end + 1`: `[0:-1]` keeps the last item.
    #[default]
    Inclusive,
    /// `len + end`: `[0:-1]` drops the last item.
    Exclusive,
}

fn dot_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.(-?\d+)$").expect("dot index regex should compile"))
}

fn slice_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\s*(-?\d+)?\s*:\s*(-?\d+)?\s*(?::\s*(-?\d+)\s*)?\]$")
            .expect("slice index regex should compile")
    })
}

fn exclude_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"!(-?\d+(?::-?\d+)*)$").expect("exclude index regex should compile")
    })
}

fn list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(\s*!?-?\d+\s*(?:,\s*!?-?\d+\s*)*)\]$")
            .expect("list index regex should compile")
    })
}

fn parse_int(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

impl IndexFilter {
    /**
        Split a trailing index off `segment`.

        Returns the remaining rule text and the filter, or the segment
        unchanged when it has no index suffix.
    */
    pub fn strip(segment: &str) -> (&str, Option<IndexFilter>) {
        if let Some(caps) = dot_regex().captures(segment)
            && let Some(index) = parse_int(&caps[1])
        {
            let start = caps.get(0).map_or(segment.len(), |m| m.start());
            return (&segment[..start], Some(IndexFilter::Single(index)));
        }

        if let Some(caps) = slice_regex().captures(segment) {
            let start = caps.get(0).map_or(segment.len(), |m| m.start());
            let filter = IndexFilter::Slice {
                start: caps.get(1).and_then(|m| parse_int(m.as_str())),
                end: caps.get(2).and_then(|m| parse_int(m.as_str())),
                step: caps.get(3).and_then(|m| parse_int(m.as_str())).unwrap_or(1),
            };
            return (&segment[..start], Some(filter));
        }

        if let Some(caps) = list_regex().captures(segment) {
            let start = caps.get(0).map_or(segment.len(), |m| m.start());
            let mut include = Vec::new();
            let mut exclude = Vec::new();
            for item in caps[1].split(',') {
                let item = item.trim();
                match item.strip_prefix('!') {
                    Some(rest) => exclude.extend(parse_int(rest)),
                    None => include.extend(parse_int(item)),
                }
            }
            let filter = match (include.as_slice(), exclude.is_empty()) {
                ([single], true) => IndexFilter::Single(*single),
                _ => IndexFilter::List { include, exclude },
            };
            return (&segment[..start], Some(filter));
        }

        if let Some(caps) = exclude_regex().captures(segment) {
            let start = caps.get(0).map_or(segment.len(), |m| m.start());
            let indices = caps[1].split(':').filter_map(parse_int).collect();
            return (&segment[..start], Some(IndexFilter::Exclude(indices)));
        }

        (segment, None)
    }

    /// Parse a segment that consists of an index and nothing else.
    pub fn parse_exact(segment: &str) -> Option<IndexFilter> {
        match Self::strip(segment.trim()) {
            ("", filter) => filter,
            _ => None,
        }
    }

    /// Selected positions for a sequence of `len` items, ascending.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        self.indices_with(len, SliceEnd::Inclusive)
    }

    pub fn indices_with(&self, len: usize, slice_end: SliceEnd) -> Vec<usize> {
        let n = len as i64;
        let normalize = |i: i64| if i < 0 { n + i } else { i };
        let keep: Vec<bool> = match self {
            IndexFilter::Single(index) => {
                let index = normalize(*index);
                (0..n).map(|i| i == index).collect()
            }
            IndexFilter::Slice { start, end, step } => {
                let start = start.map_or(0, normalize).max(0);
                let end = match end {
                    None => n,
                    Some(e) if *e < 0 => match slice_end {
                        SliceEnd::Inclusive => n + e + 1,
                        SliceEnd::Exclusive => n + e,
                    },
                    Some(e) => (*e).min(n),
                };
                let step = match step.abs() {
                    0 => 1,
                    s => s,
                };
                (0..n)
                    .map(|i| i >= start && i < end && (i - start) % step == 0)
                    .collect()
            }
            IndexFilter::Exclude(excluded) => {
                let excluded: Vec<i64> = excluded.iter().map(|i| normalize(*i)).collect();
                (0..n).map(|i| !excluded.contains(&i)).collect()
            }
            IndexFilter::List { include, exclude } => {
                let include: Vec<i64> = include.iter().map(|i| normalize(*i)).collect();
                let exclude: Vec<i64> = exclude.iter().map(|i| normalize(*i)).collect();
                (0..n)
                    .map(|i| {
                        !exclude.contains(&i) && (include.is_empty() || include.contains(&i))
                    })
                    .collect()
            }
        };
        keep.iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect()
    }

    /// Keep the selected items, in their original order.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        self.apply_with(items, SliceEnd::Inclusive)
    }

    pub fn apply_with<T>(&self, items: Vec<T>, slice_end: SliceEnd) -> Vec<T> {
        let keep = self.indices_with(items.len(), slice_end);
        items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| keep.binary_search(&i).is_ok().then_some(item))
            .collect()
    }
}
