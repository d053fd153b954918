use crate::config::ClientConfig;
use crate::{mutate_rows, read_rows};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use streamkv_common::metadata::{API_CLIENT, FEATURE_FLAGS, REQUEST_PARAMS, USER_AGENT};
use streamkv_common::proxy::{MutateRowsResult, RowsResult};
use streamkv_common::{
    DataService, FeatureFlags, MetadataMap, MutateRowsRequest, ReadRowsRequest, RequestParams,
    Status,
};

/// Data client bound to one service endpoint.
///
/// Operations are independent; each carries its own retry and routing state.
/// Closing only affects operations started afterwards.
pub struct DataClient {
    service: Arc<dyn DataService>,
    config: ClientConfig,
    features: String,
    closed: AtomicBool,
}

impl DataClient {
    pub fn new(service: Arc<dyn DataService>, config: ClientConfig) -> Self {
        let features = FeatureFlags {
            reverse_scans: true,
            last_scanned_row_responses: true,
            routing_cookie: true,
            retry_info: true,
            ..Default::default()
        }
        .encode();
        Self {
            service,
            config,
            features,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn service(&self) -> &dyn DataService {
        self.service.as_ref()
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("data client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), Status> {
        if self.is_closed() {
            return Err(Status::unavailable("client closed"));
        }
        Ok(())
    }

    /// Headers sent with every attempt, before routing cookies are added
    pub(crate) fn call_metadata(&self, table_name: &str, app_profile_id: &str) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        metadata.insert(USER_AGENT, self.config.user_agent.clone());
        metadata.insert(API_CLIENT, self.config.api_client.clone());
        metadata.insert(
            REQUEST_PARAMS,
            RequestParams::encode(table_name, app_profile_id),
        );
        metadata.insert(FEATURE_FLAGS, self.features.clone());
        metadata
    }

    pub async fn read_rows(&self, mut request: ReadRowsRequest) -> RowsResult {
        if let Err(status) = self.check_open() {
            return RowsResult {
                status,
                rows: Vec::new(),
            };
        }
        if request.app_profile_id.is_empty() {
            request.app_profile_id = self.config.app_profile_id.clone();
        }
        read_rows::run(self, request).await
    }

    pub async fn mutate_rows(&self, mut request: MutateRowsRequest) -> MutateRowsResult {
        if let Err(status) = self.check_open() {
            return MutateRowsResult {
                status,
                entries: Vec::new(),
            };
        }
        if request.app_profile_id.is_empty() {
            request.app_profile_id = self.config.app_profile_id.clone();
        }
        mutate_rows::run(self, request).await
    }
}

impl std::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataClient")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}
