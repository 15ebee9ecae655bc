//! Link previews posted back to the channel a URL was seen in.

pub mod hn;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// A rendered preview ready to post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preview {
    pub text: String,
}

/// One link handler. `Ok(None)` means the URL is not ours or not worth
/// posting about.
#[async_trait]
pub trait Previewer: Send + Sync {
    async fn preview(&self, url: &str) -> Result<Option<Preview>>;
}

/// Offer `url` to each previewer in turn and keep the first preview. A
/// failing previewer is logged and skipped.
pub async fn preview_url(previewers: &[Arc<dyn Previewer>], url: &str) -> Option<Preview> {
    for previewer in previewers {
        match previewer.preview(url).await {
            Ok(Some(preview)) => return Some(preview),
            Ok(None) => {}
            Err(e) => warn!("preview of {url} failed: {e:#}"),
        }
    }

    None
}
