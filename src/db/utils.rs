use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Builds a reference such as `TOPUP-1703123456789-k3j9x0a2b`.
///
/// The millisecond timestamp keeps references sortable by creation time, the
/// random suffix keeps two references minted in the same millisecond apart.
pub fn reference_id(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{prefix}-{}-{suffix}", now.timestamp_millis())
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn with_default_limit(self, limit: usize) -> Self {
        Self {
            page: self.page,
            limit: self.limit.or(Some(limit)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Slices `items` to the requested page. Out-of-range pages yield an empty page.
pub fn paginate<T: Clone>(items: &[T], query: PageQuery) -> (Vec<T>, Pagination) {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let total = items.len();
    let start = (page - 1).saturating_mul(limit).min(total);
    let end = start.saturating_add(limit).min(total);

    let pagination = Pagination {
        page,
        limit,
        total,
        total_pages: total.div_ceil(limit),
    };

    (items[start..end].to_vec(), pagination)
}
