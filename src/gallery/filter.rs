/// A search over a collection of records with server side pagination.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ItemFilter {
    /// Whitespace separated terms, every term must match somewhere.
    pub query: String,

    /// Page size, zero disables paging.
    pub count: u32,

    /// Number of pages to skip.
    pub skip: u32,

    /// Only return photos in this album.
    pub album: Option<String>,
}

impl ItemFilter {
    pub fn terms(&self) -> impl Iterator<Item=&str> + '_ {
        self.query.split_whitespace()
    }

    pub fn limit(&self) -> Option<i64> {
        (self.count > 0).then_some(self.count as i64)
    }

    /// Rows to skip. `skip` counts pages of `count` rows, not rows.
    pub fn offset(&self) -> Option<i64> {
        let offset = self.count as u64 * self.skip as u64;
        (offset > 0).then(|| offset.min(i64::MAX as u64) as i64)
    }

    pub fn album(&self) -> Option<&str> {
        self.album.as_deref().filter(|album| !album.is_empty())
    }
}
