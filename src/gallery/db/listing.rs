use sqlx::{QueryBuilder, Sqlite};

use crate::gallery::filter::ItemFilter;

/// Describes how the rows of one table are searched, sorted and paged.
pub struct Listing {
    /// The `SELECT ... FROM ...` part, without any condition.
    pub select: &'static str,

    /// Text expressions a search term may match. A term matches a row if it is
    /// found in any of them.
    pub search: &'static [&'static str],

    /// How to restrict the listing to a single album, if the records support it.
    pub album: Option<AlbumJoin>,

    pub order_by: &'static str,
}

pub struct AlbumJoin {
    pub join: &'static str,
    pub column: &'static str,
}

impl Listing {
    /// Builds the listing query for the given filter. Only the static fragments of
    /// this listing end up in the sql text, all values from the filter are bound.
    pub fn query(&self, filter: &ItemFilter) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(self.select);

        let album = self.album.as_ref().zip(filter.album());

        if let Some((album, _)) = album {
            qb.push(" ").push(album.join);
        }

        let mut conditions = Conditions::default();

        for term in filter.terms() {
            let pattern = like_pattern(term);

            conditions.next(&mut qb);
            qb.push("(");

            for (idx, expr) in self.search.iter().enumerate() {
                if idx > 0 {
                    qb.push(" OR ");
                }

                qb.push(expr)
                    .push(" LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }

            qb.push(")");
        }

        if let Some((album, name)) = album {
            conditions.next(&mut qb);
            qb.push(album.column).push(" = ").push_bind(name.to_owned());
        }

        qb.push(" ORDER BY ").push(self.order_by);

        // sqlite only accepts an OFFSET after a LIMIT. Without a limit the
        // offset is zero anyway.
        if let Some(limit) = filter.limit() {
            qb.push(" LIMIT ").push_bind(limit);

            if let Some(offset) = filter.offset() {
                qb.push(" OFFSET ").push_bind(offset);
            }
        }

        qb
    }
}

#[derive(Default)]
struct Conditions {
    count: usize,
}

impl Conditions {
    fn next(&mut self, qb: &mut QueryBuilder<'static, Sqlite>) {
        qb.push(if self.count == 0 { " WHERE " } else { " AND " });
        self.count += 1;
    }
}

/// A LIKE pattern matching the term anywhere, with the term taken literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');

    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }

        pattern.push(ch);
    }

    pattern.push('%');
    pattern
}
