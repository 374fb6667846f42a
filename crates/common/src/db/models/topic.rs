//! Topic entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "topics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text", unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::topic_paper::Entity")]
    TopicPapers,
}

impl Related<super::topic_paper::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TopicPapers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
