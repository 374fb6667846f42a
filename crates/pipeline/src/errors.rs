//! Pipeline error types

use litforge_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error(transparent)]
    App(#[from] AppError),
}
