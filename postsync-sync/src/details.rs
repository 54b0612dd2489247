//! Post detail pages and list enrichment.

use crate::error::{SyncError, SyncResult};
use crate::service::EntityService;
use postsync_types::{Comment, EnhancedPost, Post, PostDetails, RecordId, User};
use std::collections::HashMap;

/// Assembles the views the presentation layer shows for posts.
#[derive(Clone)]
pub struct PostViews {
    posts: EntityService<Post>,
    comments: EntityService<Comment>,
    users: EntityService<User>,
}

impl PostViews {
    pub fn new(
        posts: EntityService<Post>,
        comments: EntityService<Comment>,
        users: EntityService<User>,
    ) -> Self {
        Self {
            posts,
            comments,
            users,
        }
    }

    /// A post with its comments and author. A missing author is not an
    /// error.
    pub async fn post_details(&self, post_id: RecordId) -> SyncResult<PostDetails> {
        let post = self.posts.get_by_id(post_id).await?;
        let (comments, author) = tokio::join!(
            self.comments.comments_for_post(post_id),
            self.author_of(&post)
        );
        Ok(PostDetails {
            post,
            comments: comments?,
            author: author?,
        })
    }

    async fn author_of(&self, post: &Post) -> SyncResult<Option<User>> {
        match self.users.get_by_id(post.user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(SyncError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves author names and comment counts from the local store.
    pub async fn enrich(&self, posts: Vec<Post>) -> SyncResult<Vec<EnhancedPost>> {
        let users: HashMap<RecordId, User> = self
            .users
            .list_local()
            .await?
            .into_iter()
            .filter_map(|u| u.id.map(|id| (id, u)))
            .collect();

        let mut comment_counts: HashMap<RecordId, usize> = HashMap::new();
        for comment in self.comments.list_local().await? {
            if !comment.meta.sync_status.is_tombstone() {
                *comment_counts.entry(comment.post_id).or_default() += 1;
            }
        }

        Ok(posts
            .into_iter()
            .map(|post| {
                let count = post
                    .id
                    .and_then(|id| comment_counts.get(&id).copied())
                    .unwrap_or(0);
                let author = users.get(&post.user_id);
                EnhancedPost::new(post, author, count)
            })
            .collect())
    }
}
