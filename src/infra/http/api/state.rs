use std::sync::Arc;

use crate::application::query::QueryService;
use crate::application::resolver::PageResolver;
use crate::application::summary::SummaryService;

#[derive(Clone)]
pub struct ApiState {
    pub resolver: Arc<PageResolver>,
    pub queries: Arc<QueryService>,
    pub summaries: Arc<SummaryService>,
}
