use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;
use tracing::debug;

use super::model::Movie;

const WRITER_MEMORY: usize = 20_000_000;

/// Upper bound on ids returned for one query. Each id becomes a bound SQL
/// parameter, and SQLite caps those per statement.
pub const MAX_MATCHES: usize = 500;

/// In-memory full-text index over movie titles and synopses.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    id_field: Field,
    title_field: Field,
    synopsis_field: Field,
}

impl SearchIndex {
    pub fn new() -> Result<Self, SearchError> {
        let mut schema_builder = Schema::builder();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT);
        let synopsis_field = schema_builder.add_text_field("synopsis", TEXT);

        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let writer = index.writer_with_num_threads(1, WRITER_MEMORY)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            id_field,
            title_field,
            synopsis_field,
        })
    }

    fn document(&self, movie: &Movie) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_text(self.id_field, &movie.id);
        doc.add_text(self.title_field, &movie.title);
        doc.add_text(self.synopsis_field, &movie.synopsis);
        doc
    }

    pub async fn rebuild(&self, movies: &[Movie]) -> Result<(), SearchError> {
        debug!("Rebuilding search index with {} movies", movies.len());

        let mut writer = self.writer.write().await;
        writer.delete_all_documents()?;

        for movie in movies {
            writer.add_document(self.document(movie))?;
        }

        writer.commit()?;
        self.reader.reload()?;

        debug!("Search index rebuilt successfully");
        Ok(())
    }

    /// Insert or replace the document for one movie.
    pub async fn upsert(&self, movie: &Movie) -> Result<(), SearchError> {
        let mut writer = self.writer.write().await;
        writer.delete_term(Term::from_field_text(self.id_field, &movie.id));
        writer.add_document(self.document(movie))?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub async fn remove(&self, movie_id: &str) -> Result<(), SearchError> {
        let mut writer = self.writer.write().await;
        writer.delete_term(Term::from_field_text(self.id_field, movie_id));
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Ids of the best-scoring movies whose title or synopsis matches any term
    /// of the query, at most [`MAX_MATCHES`].
    pub fn matching_ids(&self, query_str: &str) -> Result<Vec<String>, SearchError> {
        self.top_matching_ids(query_str, MAX_MATCHES)
    }

    pub fn top_matching_ids(
        &self,
        query_str: &str,
        max_hits: usize,
    ) -> Result<Vec<String>, SearchError> {
        let searcher = self.reader.searcher();

        let query_parser =
            QueryParser::for_index(&self.index, vec![self.title_field, self.synopsis_field]);

        // Stray syntax in user input is dropped rather than failing the search.
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            debug!("Ignored {} malformed parts in query {:?}", errors.len(), query_str);
        }

        let limit = (searcher.num_docs() as usize).min(max_hits).max(1);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut ids = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(id) = retrieved_doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
            {
                ids.push(id.to_string());
            }
        }

        Ok(ids)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::model::{AgeRating, ReleaseStatus};
    use chrono::{NaiveDate, Utc};

    fn movie(id: &str, title: &str, synopsis: &str) -> Movie {
        Movie {
            id: id.to_string(),
            title: title.to_string(),
            genres: vec![],
            director: "d".to_string(),
            cast: vec![],
            release_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            release_status: ReleaseStatus::Released,
            runtime: 100,
            synopsis: synopsis.to_string(),
            age_rating: AgeRating::Pg,
            cover_photo: String::new(),
            trailer_url: None,
            trivia: vec![],
            average_rating: 0.0,
            review_count: 0,
            view_count: 0,
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_matches_title_and_synopsis() {
        let index = SearchIndex::new().unwrap();
        index
            .rebuild(&[
                movie("1", "The Harbour", "A fisherman waits for the tide."),
                movie("2", "Night Train", "Two strangers share a compartment."),
            ])
            .await
            .unwrap();

        assert_eq!(index.matching_ids("harbour").unwrap(), vec!["1"]);
        assert_eq!(index.matching_ids("strangers").unwrap(), vec!["2"]);
        let mut both = index.matching_ids("fisherman compartment").unwrap();
        both.sort();
        assert_eq!(both, vec!["1", "2"]);
        assert!(index.matching_ids("submarine").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_remove_drops() {
        let index = SearchIndex::new().unwrap();
        index.upsert(&movie("1", "Old Title", "")).await.unwrap();
        index.upsert(&movie("1", "New Title", "")).await.unwrap();

        assert!(index.matching_ids("old").unwrap().is_empty());
        assert_eq!(index.matching_ids("new").unwrap(), vec!["1"]);

        index.remove("1").await.unwrap();
        assert!(index.matching_ids("new").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_query_does_not_fail() {
        let index = SearchIndex::new().unwrap();
        index.upsert(&movie("1", "Heat", "")).await.unwrap();
        assert_eq!(index.matching_ids("heat (").unwrap(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_hits_are_capped() {
        let index = SearchIndex::new().unwrap();
        let movies: Vec<Movie> = (0..MAX_MATCHES + 20)
            .map(|i| movie(&i.to_string(), "Western", "Dust and horses."))
            .collect();
        index.rebuild(&movies).await.unwrap();

        assert_eq!(index.matching_ids("western").unwrap().len(), MAX_MATCHES);
        assert_eq!(index.top_matching_ids("horses", 3).unwrap().len(), 3);
    }
}
