use crate::models::chat::Session;
use std::cmp::Reverse;
use std::str::FromStr;

pub const DEFAULT_RECENT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionFilter {
    #[default]
    All,
    Pinned,
    Recent(usize),
}

impl FromStr for SessionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        match parts.next().map(|p| p.to_lowercase()).as_deref() {
            None | Some("all") => Ok(SessionFilter::All),
            Some("pinned") => Ok(SessionFilter::Pinned),
            Some("recent") => {
                let n = match parts.next() {
                    Some(n) => n.parse().map_err(|_| format!("Invalid recent count: '{}'", n))?,
                    None => DEFAULT_RECENT,
                };
                Ok(SessionFilter::Recent(n))
            }
            Some(other) => Err(format!("Unknown session filter: '{}'", other)),
        }
    }
}

/// Applies the filter, then the search term, then orders pinned sessions
/// first and everything else by most recent update.
pub fn select<'a>(
    sessions: &'a [Session],
    filter: SessionFilter,
    search: Option<&str>
) -> Vec<&'a Session> {
    let mut result: Vec<&Session> = match filter {
        SessionFilter::All => sessions.iter().collect(),
        SessionFilter::Pinned => sessions.iter().filter(|s| s.is_pinned).collect(),
        SessionFilter::Recent(n) => {
            let mut by_recency: Vec<&Session> = sessions.iter().collect();
            by_recency.sort_by_key(|s| Reverse(s.updated_at));
            by_recency.truncate(n);
            by_recency
        }
    };

    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        let lower = term.to_lowercase();
        result.retain(|s| s.matches_term(&lower));
    }

    result.sort_by_key(|s| (Reverse(s.is_pinned), Reverse(s.updated_at)));
    result
}
