//! Views handed to the presentation layer.

use crate::entities::{Comment, Post, User};
use serde::{Deserialize, Serialize};

/// Author name shown when a post's user is not known locally.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// A post with its author name resolved and its comments counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedPost {
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
    pub comment_count: usize,
}

impl EnhancedPost {
    #[must_use]
    pub fn new(post: Post, author: Option<&User>, comment_count: usize) -> Self {
        let author_name = author
            .map(|user| user.name.clone())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
        Self {
            post,
            author_name,
            comment_count,
        }
    }
}

/// A post together with everything its detail page shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetails {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub author: Option<User>,
}
