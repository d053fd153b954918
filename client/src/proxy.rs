use crate::client::DataClient;
use crate::config::ClientConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use streamkv_common::proxy::{ClientProxy, CreateClientRequest, MutateRowsResult, RowsResult};
use streamkv_common::{Code, DataService, MutateRowsRequest, ReadRowsRequest, Status};

/// In-process proxy hosting data clients by id, all talking to one service
pub struct LocalProxy {
    service: Arc<dyn DataService>,
    defaults: ClientConfig,
    clients: DashMap<String, Arc<DataClient>>,
}

impl LocalProxy {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Self::with_defaults(service, ClientConfig::default())
    }

    /// `defaults` seeds every client; per-client options override it
    pub fn with_defaults(service: Arc<dyn DataService>, defaults: ClientConfig) -> Self {
        Self {
            service,
            defaults,
            clients: DashMap::new(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn client(&self, client_id: &str) -> Result<Arc<DataClient>, Status> {
        self.clients
            .get(client_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Status::not_found(format!("client {} not found", client_id)))
    }
}

#[async_trait]
impl ClientProxy for LocalProxy {
    async fn create_client(&self, request: CreateClientRequest) -> Result<(), Status> {
        if self.clients.contains_key(&request.client_id) {
            return Err(Status::new(
                Code::AlreadyExists,
                format!("client {} already exists", request.client_id),
            ));
        }
        let mut config = self.defaults.clone();
        if !request.app_profile_id.is_empty() {
            config.app_profile_id = request.app_profile_id;
        }
        if let Some(timeout) = request.timeout {
            config.timeout = Some(timeout);
        }
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "creating client {} for {} with {:?}",
                request.client_id,
                request.data_target,
                config
            );
        }
        let client = DataClient::new(Arc::clone(&self.service), config);
        self.clients.insert(request.client_id, Arc::new(client));
        Ok(())
    }

    async fn close_client(&self, client_id: &str) -> Result<(), Status> {
        self.client(client_id)?.close();
        Ok(())
    }

    async fn remove_client(&self, client_id: &str) -> Result<(), Status> {
        self.clients
            .remove(client_id)
            .map(|_| ())
            .ok_or_else(|| Status::not_found(format!("client {} not found", client_id)))
    }

    async fn read_rows(
        &self,
        client_id: &str,
        request: ReadRowsRequest,
    ) -> Result<RowsResult, Status> {
        let client = self.client(client_id)?;
        Ok(client.read_rows(request).await)
    }

    async fn mutate_rows(
        &self,
        client_id: &str,
        request: MutateRowsRequest,
    ) -> Result<MutateRowsResult, Status> {
        let client = self.client(client_id)?;
        Ok(client.mutate_rows(request).await)
    }
}
