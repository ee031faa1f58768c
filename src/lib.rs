use std::sync::Arc;

use crate::api::vdag_dto::VdagDto;
use crate::collaborators::http::{
    HttpDiscovery, HttpSearchPolicy, HttpTaskStore, HttpVdagRegistry, RemotePolicyLoader, build_client,
};
use crate::collaborators::{DiscoveryService, PolicyLoader, SearchPolicy, TaskStore, VdagRegistry};
use crate::config::Settings;
use crate::domain::processor::processor::VdagProcessor;
use crate::domain::vdag::vdag::VdagObject;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;
pub mod runtime;
pub mod server;
pub mod transport;

/// HTTP clients for every remote collaborator, built from one settings set.
pub struct RemoteServices {
    pub registry: Arc<dyn VdagRegistry>,
    pub search: Arc<dyn SearchPolicy>,
    pub discovery: Arc<dyn DiscoveryService>,
    pub tasks: Arc<dyn TaskStore>,
    pub policies: Arc<dyn PolicyLoader>,
}

impl RemoteServices {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = build_client(settings.http_timeout())?;

        Ok(RemoteServices {
            registry: Arc::new(HttpVdagRegistry::new(client.clone(), &settings.vdag_registry_url)),
            search: Arc::new(HttpSearchPolicy::new(client.clone(), &settings.search_server_url)),
            discovery: Arc::new(HttpDiscovery::new(client.clone(), &settings.discovery_url)),
            tasks: Arc::new(HttpTaskStore::new(client.clone(), &settings.tasks_db_url)),
            policies: Arc::new(RemotePolicyLoader::new(client, &settings.policy_executor_url)),
        })
    }

    pub fn processor(&self) -> VdagProcessor {
        VdagProcessor::new(self.registry.clone(), self.search.clone(), self.discovery.clone())
    }
}

/// Reads a vDAG document from disk.
pub fn load_vdag_file(file_path: &str) -> Result<VdagObject> {
    let dto: VdagDto = parse_json_file::<VdagDto>(file_path)?;
    log::info!("vDAG file '{}' parsed successfully.", file_path);

    VdagObject::try_from(dto)
}
