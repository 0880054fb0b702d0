use std::sync::Arc;

use crate::pipeline::RecallPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RecallPipeline>,
}

impl AppState {
    pub fn new(pipeline: RecallPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
