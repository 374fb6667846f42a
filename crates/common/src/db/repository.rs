//! Reconciliation repository
//!
//! Every write runs as one transaction on the primary connection; a
//! transaction dropped on an error path is rolled back. Foreign-key
//! preconditions are checked inside the transaction and reported as
//! [`AppError::Integrity`] with the offending ids.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::scoring;
use crate::source::{AuthorRecord, PaperRecord};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Schema, Set, TransactionTrait,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    // ========================================================================
    // Schema & Health
    // ========================================================================

    /// Create all tables that do not exist yet, foreign keys included
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn();
        let backend = conn.get_database_backend();
        let schema = Schema::new(backend);

        // Referenced tables first
        let mut statements = vec![
            schema.create_table_from_entity(TopicEntity),
            schema.create_table_from_entity(PaperEntity),
            schema.create_table_from_entity(AuthorEntity),
            schema.create_table_from_entity(PaperAuthorEntity),
            schema.create_table_from_entity(TopicPaperEntity),
            schema.create_table_from_entity(PaperRecommendationEntity),
        ];

        for stmt in statements.iter_mut() {
            stmt.if_not_exists();
            conn.execute(backend.build(&*stmt)).await?;
        }

        debug!("Schema ensured");
        Ok(())
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Topic Operations
    // ========================================================================

    /// Find or create the topic with the given name
    pub async fn ensure_topic(&self, name: &str) -> Result<Topic> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation {
                message: "topic name is empty".to_string(),
                field: Some("topic".to_string()),
            });
        }

        let txn = self.conn().begin().await?;

        let existing = TopicEntity::find()
            .filter(TopicColumn::Name.eq(name))
            .one(&txn)
            .await?;

        let topic = match existing {
            Some(topic) => topic,
            None => {
                TopicActiveModel {
                    name: Set(name.to_string()),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;
        Ok(topic)
    }

    pub async fn find_topic_by_name(&self, name: &str) -> Result<Option<Topic>> {
        TopicEntity::find()
            .filter(TopicColumn::Name.eq(name.trim()))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// All topics, ordered by name
    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        TopicEntity::find()
            .order_by_asc(TopicColumn::Name)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Set a paper's classification within a topic, replacing any previous one
    pub async fn classify_topic_paper(
        &self,
        topic_id: i32,
        paper_id: &str,
        classification: Classification,
        use_for_recommendation: bool,
    ) -> Result<()> {
        let txn = self.conn().begin().await?;
        ensure_topic_paper_refs(&txn, topic_id, paper_id).await?;

        let model = TopicPaperActiveModel {
            topic_id: Set(topic_id),
            paper_id: Set(paper_id.to_string()),
            classification: Set(classification.into()),
            use_for_recommendation: Set(use_for_recommendation),
        };

        TopicPaperEntity::insert(model)
            .on_conflict(
                OnConflict::columns([TopicPaperColumn::TopicId, TopicPaperColumn::PaperId])
                    .update_columns([
                        TopicPaperColumn::Classification,
                        TopicPaperColumn::UseForRecommendation,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Classify a paper within a topic only if the topic has no classification for it yet.
    ///
    /// Returns whether a classification was written.
    pub async fn classify_if_unclassified(
        &self,
        topic_id: i32,
        paper_id: &str,
        classification: Classification,
        use_for_recommendation: bool,
    ) -> Result<bool> {
        let txn = self.conn().begin().await?;
        ensure_topic_paper_refs(&txn, topic_id, paper_id).await?;

        let existing = TopicPaperEntity::find_by_id((topic_id, paper_id.to_string()))
            .one(&txn)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let model = TopicPaperActiveModel {
            topic_id: Set(topic_id),
            paper_id: Set(paper_id.to_string()),
            classification: Set(classification.into()),
            use_for_recommendation: Set(use_for_recommendation),
        };
        TopicPaperEntity::insert(model)
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn topic_classification(
        &self,
        topic_id: i32,
        paper_id: &str,
    ) -> Result<Option<TopicPaper>> {
        TopicPaperEntity::find_by_id((topic_id, paper_id.to_string()))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Ids of the positive papers seeding recommendations for a topic, ordered by id
    pub async fn seed_papers(&self, topic_id: i32) -> Result<Vec<String>> {
        let rows = TopicPaperEntity::find()
            .filter(TopicPaperColumn::TopicId.eq(topic_id))
            .filter(TopicPaperColumn::Classification.eq(Classification::Positive.as_str()))
            .filter(TopicPaperColumn::UseForRecommendation.eq(true))
            .order_by_asc(TopicPaperColumn::PaperId)
            .all(self.conn())
            .await?;

        Ok(rows.into_iter().map(|row| row.paper_id).collect())
    }

    /// Papers recommendations for a topic should steer away from, ordered by id.
    ///
    /// The topic's own negative papers, plus the seeds of every other topic
    /// that are not positive in this one.
    pub async fn negative_examples(&self, topic_id: i32) -> Result<Vec<String>> {
        let positive = Classification::Positive.as_str();
        let negative = Classification::Negative.as_str();
        let rows = TopicPaperEntity::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(TopicPaperColumn::TopicId.eq(topic_id))
                            .add(TopicPaperColumn::Classification.eq(negative)),
                    )
                    .add(
                        Condition::all()
                            .add(TopicPaperColumn::TopicId.ne(topic_id))
                            .add(TopicPaperColumn::Classification.eq(positive))
                            .add(TopicPaperColumn::UseForRecommendation.eq(true)),
                    ),
            )
            .all(self.conn())
            .await?;

        let own_positives: HashSet<String> = TopicPaperEntity::find()
            .filter(TopicPaperColumn::TopicId.eq(topic_id))
            .filter(TopicPaperColumn::Classification.eq(positive))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|row| row.paper_id)
            .collect();

        let negatives: BTreeSet<String> = rows
            .into_iter()
            .map(|row| row.paper_id)
            .filter(|id| !own_positives.contains(id))
            .collect();
        Ok(negatives.into_iter().collect())
    }

    // ========================================================================
    // Paper Operations
    // ========================================================================

    /// Insert or update a paper; source fields are last-write-wins.
    ///
    /// A `None` derived h-index leaves the stored one in place.
    pub async fn upsert_paper(&self, paper: &PaperRecord, h_index: Option<f64>) -> Result<()> {
        let model = PaperActiveModel {
            id: Set(paper.paper_id.clone()),
            title: Set(paper.title.clone()),
            abstract_text: Set(paper.abstract_text.clone()),
            journal: Set(paper.journal.clone()),
            url: Set(paper.url.clone()),
            publication_date: Set(paper.publication_date),
            citation_count: Set(paper.citation_count.map(i64::from)),
            h_index: Set(h_index),
        };

        let mut update = vec![
            PaperColumn::Title,
            PaperColumn::AbstractText,
            PaperColumn::Journal,
            PaperColumn::Url,
            PaperColumn::PublicationDate,
            PaperColumn::CitationCount,
        ];
        if h_index.is_some() {
            update.push(PaperColumn::HIndex);
        }

        PaperEntity::insert(model)
            .on_conflict(
                OnConflict::column(PaperColumn::Id)
                    .update_columns(update)
                    .to_owned(),
            )
            .exec_without_returning(self.conn())
            .await?;

        metrics::record_papers_upserted(1);
        Ok(())
    }

    pub async fn find_paper(&self, paper_id: &str) -> Result<Option<Paper>> {
        PaperEntity::find_by_id(paper_id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Store a paper's derived h-index; returns false when the paper is unknown
    pub async fn update_paper_h_index(&self, paper_id: &str, h_index: Option<f64>) -> Result<bool> {
        let result = PaperEntity::update_many()
            .col_expr(PaperColumn::HIndex, Expr::value(h_index))
            .filter(PaperColumn::Id.eq(paper_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Every stored paper with its author ids in authorship order, ordered by paper id
    pub async fn list_papers_with_authors(&self) -> Result<Vec<(Paper, Vec<String>)>> {
        let papers = PaperEntity::find()
            .order_by_asc(PaperColumn::Id)
            .all(self.conn())
            .await?;

        let links = PaperAuthorEntity::find()
            .order_by_asc(PaperAuthorColumn::PaperId)
            .order_by_asc(PaperAuthorColumn::Position)
            .all(self.conn())
            .await?;

        let mut by_paper: HashMap<String, Vec<String>> = HashMap::new();
        for link in links {
            by_paper.entry(link.paper_id).or_default().push(link.author_id);
        }

        Ok(papers
            .into_iter()
            .map(|paper| {
                let authors = by_paper.remove(&paper.id).unwrap_or_default();
                (paper, authors)
            })
            .collect())
    }

    // ========================================================================
    // Author Operations
    // ========================================================================

    /// Insert or update an author, returning the stored row.
    ///
    /// Unknown metrics never overwrite known ones.
    pub async fn upsert_author(&self, author: &AuthorRecord) -> Result<Author> {
        let txn = self.conn().begin().await?;
        let stored = upsert_author_in(&txn, author).await?;
        txn.commit().await?;

        metrics::record_authors_upserted(1);
        Ok(stored)
    }

    /// Upsert a batch of authors in one transaction
    pub async fn upsert_authors(&self, authors: &[AuthorRecord]) -> Result<Vec<Author>> {
        let txn = self.conn().begin().await?;

        let mut stored = Vec::with_capacity(authors.len());
        for author in authors {
            stored.push(upsert_author_in(&txn, author).await?);
        }

        txn.commit().await?;
        metrics::record_authors_upserted(stored.len() as u64);
        Ok(stored)
    }

    pub async fn find_author(&self, author_id: &str) -> Result<Option<Author>> {
        AuthorEntity::find_by_id(author_id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Replace a paper's author list; duplicates keep their first position
    pub async fn link_paper_authors(&self, paper_id: &str, author_ids: &[String]) -> Result<()> {
        let ordered = first_occurrences(author_ids);
        let txn = self.conn().begin().await?;

        if PaperEntity::find_by_id(paper_id).one(&txn).await?.is_none() {
            return Err(AppError::integrity(
                "paper_authors",
                format!("paper {} does not exist", paper_id),
            ));
        }

        if !ordered.is_empty() {
            let known: HashSet<String> = AuthorEntity::find()
                .filter(AuthorColumn::Id.is_in(ordered.iter().copied()))
                .all(&txn)
                .await?
                .into_iter()
                .map(|author| author.id)
                .collect();

            let missing: Vec<&str> = ordered
                .iter()
                .copied()
                .filter(|id| !known.contains(*id))
                .collect();
            if !missing.is_empty() {
                return Err(AppError::integrity(
                    "paper_authors",
                    format!("paper {}: unknown authors {}", paper_id, missing.join(", ")),
                ));
            }
        }

        PaperAuthorEntity::delete_many()
            .filter(PaperAuthorColumn::PaperId.eq(paper_id))
            .exec(&txn)
            .await?;

        if !ordered.is_empty() {
            let rows = ordered
                .iter()
                .enumerate()
                .map(|(index, author_id)| PaperAuthorActiveModel {
                    paper_id: Set(paper_id.to_string()),
                    author_id: Set(author_id.to_string()),
                    position: Set(index as i32 + 1),
                });
            PaperAuthorEntity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Authors of a paper in authorship order
    pub async fn paper_authors(&self, paper_id: &str) -> Result<Vec<Author>> {
        let links = PaperAuthorEntity::find()
            .filter(PaperAuthorColumn::PaperId.eq(paper_id))
            .order_by_asc(PaperAuthorColumn::Position)
            .all(self.conn())
            .await?;

        let mut authors: HashMap<String, Author> = AuthorEntity::find()
            .filter(AuthorColumn::Id.is_in(links.iter().map(|l| l.author_id.as_str())))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|author| (author.id.clone(), author))
            .collect();

        Ok(links
            .iter()
            .filter_map(|link| authors.remove(&link.author_id))
            .collect())
    }

    // ========================================================================
    // Recommendation Operations
    // ========================================================================

    /// Replace the ordered recommendation list of a source paper.
    ///
    /// Returns the number of edges written.
    pub async fn record_recommendations(
        &self,
        source_paper_id: &str,
        recommended_ids: &[String],
    ) -> Result<usize> {
        if recommended_ids.iter().any(|id| id == source_paper_id) {
            return Err(AppError::integrity(
                "paper_recommendations",
                format!("paper {} cannot recommend itself", source_paper_id),
            ));
        }

        let ordered = first_occurrences(recommended_ids);
        let txn = self.conn().begin().await?;

        let mut referenced: Vec<&str> = ordered.clone();
        referenced.push(source_paper_id);
        let known: HashSet<String> = PaperEntity::find()
            .filter(PaperColumn::Id.is_in(referenced.iter().copied()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|paper| paper.id)
            .collect();

        let missing: Vec<&str> = referenced
            .iter()
            .copied()
            .filter(|id| !known.contains(*id))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::integrity(
                "paper_recommendations",
                format!(
                    "recommendations of {}: unknown papers {}",
                    source_paper_id,
                    missing.join(", ")
                ),
            ));
        }

        PaperRecommendationEntity::delete_many()
            .filter(PaperRecommendationColumn::SourcePaperId.eq(source_paper_id))
            .exec(&txn)
            .await?;

        if !ordered.is_empty() {
            let rows = ordered
                .iter()
                .enumerate()
                .map(|(index, recommended)| PaperRecommendationActiveModel {
                    source_paper_id: Set(source_paper_id.to_string()),
                    recommended_paper_id: Set(recommended.to_string()),
                    recommendation_order: Set(index as i32 + 1),
                });
            PaperRecommendationEntity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        metrics::record_recommendations(ordered.len() as u64);
        Ok(ordered.len())
    }

    /// Recommended paper ids of a source paper, in recommendation order
    pub async fn recommendations(&self, source_paper_id: &str) -> Result<Vec<String>> {
        let rows = PaperRecommendationEntity::find()
            .filter(PaperRecommendationColumn::SourcePaperId.eq(source_paper_id))
            .order_by_asc(PaperRecommendationColumn::RecommendationOrder)
            .all(self.conn())
            .await?;

        Ok(rows.into_iter().map(|row| row.recommended_paper_id).collect())
    }
}

async fn upsert_author_in<C: ConnectionTrait>(conn: &C, author: &AuthorRecord) -> Result<Author> {
    let existing = AuthorEntity::find_by_id(author.author_id.as_str())
        .one(conn)
        .await?;

    let h_index = scoring::author_h_index(author);
    let citation_count = author.citation_count.map(i64::from);
    let merged = Author {
        id: author.author_id.clone(),
        name: author.name.clone(),
        h_index: h_index.or(existing.as_ref().and_then(|a| a.h_index)),
        citation_count: citation_count.or(existing.as_ref().and_then(|a| a.citation_count)),
    };

    let model = AuthorActiveModel {
        id: Set(merged.id.clone()),
        name: Set(merged.name.clone()),
        h_index: Set(merged.h_index),
        citation_count: Set(merged.citation_count),
    };

    AuthorEntity::insert(model)
        .on_conflict(
            OnConflict::column(AuthorColumn::Id)
                .update_columns([
                    AuthorColumn::Name,
                    AuthorColumn::HIndex,
                    AuthorColumn::CitationCount,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    Ok(merged)
}

async fn ensure_topic_paper_refs<C: ConnectionTrait>(
    conn: &C,
    topic_id: i32,
    paper_id: &str,
) -> Result<()> {
    if TopicEntity::find_by_id(topic_id).one(conn).await?.is_none() {
        return Err(AppError::integrity(
            "topic_papers",
            format!("topic {} does not exist", topic_id),
        ));
    }
    if PaperEntity::find_by_id(paper_id).one(conn).await?.is_none() {
        return Err(AppError::integrity(
            "topic_papers",
            format!("paper {} does not exist", paper_id),
        ));
    }
    Ok(())
}

/// Ids in input order, keeping the first occurrence of each
fn first_occurrences(ids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}
