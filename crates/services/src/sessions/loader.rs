use assessment_client::AssessmentService;
use chrono::{DateTime, Utc};
use quiz_core::model::{Attempt, AttemptId};
use quiz_core::{AnswerCodec, PageCache};

use crate::error::PageLoadError;

/// A fetched page, parsed and ready to swap in.
#[derive(Debug, Clone)]
pub(crate) struct LoadedPage {
    pub cache: PageCache,
    pub attempt: Attempt,
    pub server_time: Option<DateTime<Utc>>,
}

/// Fetch page `page` of an attempt and build its cache.
pub(crate) async fn load_page(
    service: &dyn AssessmentService,
    codec: &dyn AnswerCodec,
    attempt_id: AttemptId,
    page: usize,
) -> Result<LoadedPage, PageLoadError> {
    let data = service.get_attempt_data(attempt_id, page).await?;
    let total = data.attempt.total_pages;
    if total == 0 {
        return Err(PageLoadError::NoPages);
    }
    // the quiz may have shrunk since the page index was chosen
    if page >= total {
        return Err(PageLoadError::PastLastPage { page, total });
    }
    let cache = PageCache::from_raw(codec, page, &data.questions)?;
    Ok(LoadedPage {
        cache,
        attempt: data.attempt,
        server_time: data.server_time,
    })
}
