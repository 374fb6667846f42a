//! SeaORM entity models
//!
//! Tables of the literature graph: topics, papers, authors and the
//! association tables linking them.

mod author;
mod paper;
mod paper_author;
mod paper_recommendation;
mod topic;
mod topic_paper;

pub use topic::{
    Entity as TopicEntity,
    Model as Topic,
    ActiveModel as TopicActiveModel,
    Column as TopicColumn,
};

pub use paper::{
    Entity as PaperEntity,
    Model as Paper,
    ActiveModel as PaperActiveModel,
    Column as PaperColumn,
};

pub use author::{
    Entity as AuthorEntity,
    Model as Author,
    ActiveModel as AuthorActiveModel,
    Column as AuthorColumn,
};

pub use paper_author::{
    Entity as PaperAuthorEntity,
    Model as PaperAuthor,
    ActiveModel as PaperAuthorActiveModel,
    Column as PaperAuthorColumn,
};

pub use topic_paper::{
    Entity as TopicPaperEntity,
    Model as TopicPaper,
    ActiveModel as TopicPaperActiveModel,
    Column as TopicPaperColumn,
    Classification,
};

pub use paper_recommendation::{
    Entity as PaperRecommendationEntity,
    Model as PaperRecommendation,
    ActiveModel as PaperRecommendationActiveModel,
    Column as PaperRecommendationColumn,
};
