//! Ordered recommendation edge between two papers

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "paper_recommendations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub source_paper_id: String,

    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub recommended_paper_id: String,

    /// 1-based rank within the source paper's list
    pub recommendation_order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::SourcePaperId",
        to = "super::paper::Column::Id"
    )]
    SourcePaper,

    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::RecommendedPaperId",
        to = "super::paper::Column::Id"
    )]
    RecommendedPaper,
}

impl ActiveModelBehavior for ActiveModel {}
