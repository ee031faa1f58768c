use std::sync::Arc;

use crate::domain::processor::processor::VdagProcessor;
use crate::domain::processor::worker::Submitter;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<VdagProcessor>,
    pub submitter: Arc<Submitter>,
}
