//! List queries: pagination window, whitelisted ordering and the paginated
//! response shape.

use serde::Serialize;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// A 1-based page window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Zero values fall back to the defaults.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: if page == 0 { DEFAULT_PAGE } else { page },
            limit: if limit == 0 { DEFAULT_LIMIT } else { limit },
        }
    }

    /// Build from raw query-string values.
    ///
    /// Returns `None` when neither parameter was supplied (the caller wants the
    /// full, unpaginated list). Unparsable or non-positive values fall back to
    /// the defaults.
    pub fn from_params(page: Option<&str>, limit: Option<&str>) -> Option<Self> {
        if page.is_none() && limit.is_none() {
            return None;
        }
        let parse = |raw: Option<&str>, default: u32| {
            raw.and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|v| *v > 0)
                .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
                .unwrap_or(default)
        };
        Some(Self::new(parse(page, DEFAULT_PAGE), parse(limit, DEFAULT_LIMIT)))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Cut this window out of an already ordered list.
    pub fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        rows.into_iter()
            .skip(offset)
            .take(self.limit as usize)
            .collect()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `desc` sorts ascending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "desc" => Self::Desc,
            _ => Self::Asc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Column + direction, where the column always comes from a static whitelist.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ordering {
    column: &'static str,
    direction: SortDirection,
}

impl Ordering {
    pub const fn by_id() -> Self {
        Self {
            column: "id",
            direction: SortDirection::Asc,
        }
    }

    /// Resolve `order_by`/`order` against `allowed`.
    ///
    /// A column outside the whitelist is ignored and the list keeps its
    /// default `id ASC` order.
    pub fn resolve(order_by: Option<&str>, order: Option<&str>, allowed: &[&'static str]) -> Self {
        let Some(requested) = order_by.map(str::trim) else {
            return Self::by_id();
        };
        match allowed.iter().find(|c| **c == requested) {
            Some(column) => Self {
                column: *column,
                direction: SortDirection::parse(order),
            },
            None => Self::by_id(),
        }
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// `ORDER BY` body. Ties are broken by id so pages are stable.
    pub fn sql(&self) -> String {
        if self.column == "id" {
            format!("id {}", self.direction.as_sql())
        } else {
            format!("{} {}, id ASC", self.column, self.direction.as_sql())
        }
    }

    /// Apply the direction to an ascending comparison.
    pub fn directed(&self, ord: std::cmp::Ordering) -> std::cmp::Ordering {
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

impl Default for Ordering {
    fn default() -> Self {
        Self::by_id()
    }
}

/// Ordering plus an optional page window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    pub page: Option<PageRequest>,
    pub ordering: Ordering,
}

impl ListQuery {
    pub fn new(page: Option<PageRequest>, ordering: Ordering) -> Self {
        Self { page, ordering }
    }

    /// Everything, ordered by id.
    pub fn all() -> Self {
        Self::default()
    }

    /// Apply the page window (if any) to an already ordered list.
    pub fn window<T>(&self, rows: Vec<T>) -> Vec<T> {
        match self.page {
            Some(page) => page.slice(rows),
            None => rows,
        }
    }
}

/// Paginated list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub total_rows: u64,
    pub first_page: String,
    pub previous_page: String,
    pub next_page: String,
    pub last_page: String,
    pub from_row: u64,
    pub to_row: u64,
    pub rows: Vec<T>,
}

impl<T> Page<T> {
    /// `path` is the request path used to build the navigation links.
    pub fn build(path: &str, request: PageRequest, total_rows: u64, rows: Vec<T>) -> Self {
        let page = request.page();
        let limit = request.limit();
        let total_pages = total_rows.div_ceil(u64::from(limit));
        let link = |n: u64| format!("{path}?page={n}&limit={limit}");

        let previous_page = if page > 1 {
            link(u64::from(page) - 1)
        } else {
            String::new()
        };
        let next_page = if u64::from(page) < total_pages {
            link(u64::from(page) + 1)
        } else {
            String::new()
        };

        let (from_row, to_row) = if rows.is_empty() {
            (0, 0)
        } else {
            let from = request.offset() + 1;
            (from, from + rows.len() as u64 - 1)
        };

        Self {
            page,
            limit,
            total_pages,
            total_rows,
            first_page: link(1),
            previous_page,
            next_page,
            last_page: link(total_pages.max(1)),
            from_row,
            to_row,
            rows,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_rows: self.total_rows,
            first_page: self.first_page,
            previous_page: self.previous_page,
            next_page: self.next_page,
            last_page: self.last_page,
            from_row: self.from_row,
            to_row: self.to_row,
            rows: self.rows.into_iter().map(f).collect(),
        }
    }
}
