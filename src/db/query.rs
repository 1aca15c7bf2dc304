use chrono::NaiveDate;

/// A single condition over movie fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exclude one movie id.
    IdNot(String),
    /// The movie carries at least one of these genres. An empty set matches nothing.
    GenreIn(Vec<String>),
    DirectorIs(String),
    /// Full-text match over title and synopsis.
    TextMatch(String),
    MinRating(f64),
    /// Release date in `[from, until)`.
    ReleasedBetween(NaiveDate, NaiveDate),
    /// Logical OR of the inner predicates. An empty set matches nothing.
    Any(Vec<Predicate>),
}

/// Logical AND of predicates. An empty filter matches every movie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieFilter {
    pub all: Vec<Predicate>,
}

impl MovieFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.all.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    AverageRating,
    ReleaseDate,
    Title,
    Runtime,
    ViewCount,
    CreatedAt,
}

impl SortField {
    pub const ALLOWED: [SortField; 6] = [
        SortField::AverageRating,
        SortField::ReleaseDate,
        SortField::Title,
        SortField::Runtime,
        SortField::ViewCount,
        SortField::CreatedAt,
    ];

    /// Name as accepted in the `sortBy` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::AverageRating => "averageRating",
            SortField::ReleaseDate => "releaseDate",
            SortField::Title => "title",
            SortField::Runtime => "runtime",
            SortField::ViewCount => "viewCount",
            SortField::CreatedAt => "createdAt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALLOWED.into_iter().find(|f| f.as_str() == s)
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::AverageRating => "movies.average_rating",
            SortField::ReleaseDate => "movies.release_date",
            SortField::Title => "movies.title",
            SortField::Runtime => "movies.runtime",
            SortField::ViewCount => "movies.view_count",
            SortField::CreatedAt => "movies.created",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// Filter, sort and window for a movie lookup. Rows that tie on every sort
/// key come back in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieQuery {
    pub filter: MovieFilter,
    pub sort: Vec<SortKey>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl MovieQuery {
    pub fn new(filter: MovieFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn window(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_allow_list() {
        for field in SortField::ALLOWED {
            assert_eq!(SortField::from_str(field.as_str()), Some(field));
        }
        assert_eq!(SortField::from_str("password"), None);
        assert_eq!(SortField::from_str("AverageRating"), None);
    }
}
