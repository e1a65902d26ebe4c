use std::path::Path;

use anyhow::Result;
use contenthub_shared::comment_store::CommentStore;

use crate::{comment_service::CommentService, user_directory::UserDirectory};

#[derive(Clone)]
pub struct AppState {
    /// Comment operations, shared by every handler.
    pub comments: CommentService,
}

impl AppState {
    pub fn new(db_path: &Path) -> Result<Self> {
        let store = CommentStore::open(db_path)?;
        let users = UserDirectory::from_env()?;

        Ok(Self {
            comments: CommentService::new(store, users),
        })
    }
}
