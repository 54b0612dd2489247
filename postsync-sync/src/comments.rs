//! Comment queries by post.

use crate::error::SyncResult;
use crate::service::{decode_all, EntityService};
use postsync_types::{is_remote, Comment, RecordId};
use tracing::debug;

impl EntityService<Comment> {
    /// Comments attached to a post.
    ///
    /// Online, the post's comments are fetched and cached first. The answer
    /// always comes from the local store so comments written offline show
    /// up next to the remote ones.
    pub async fn comments_for_post(&self, post_id: RecordId) -> SyncResult<Vec<Comment>> {
        if self.connectivity.is_online() && is_remote(post_id) {
            let fetched = self
                .remote
                .comments_for_post(post_id)
                .await
                .and_then(decode_all::<Comment>);
            match fetched {
                Ok(comments) => {
                    self.absorb_batch(comments).await?;
                }
                Err(e) => debug!("Remote comments of post {} unavailable: {}", post_id, e),
            }
        }

        Ok(self
            .records
            .all()
            .await?
            .into_iter()
            .filter(|c| c.post_id == post_id)
            .collect())
    }
}
