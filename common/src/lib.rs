#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]

pub mod data;
pub mod metadata;
pub mod proxy;
pub mod serializer;
pub mod service;
pub mod status;

pub use data::{
    Cell, CellChunk, Column, Family, MutateRowsRequest, MutateRowsResponse, Mutation,
    MutationEntry, ReadRowsRequest, ReadRowsResponse, ResponseEntry, Row, RowBound, RowFilter,
    RowRange, RowSet,
};
pub use metadata::{FeatureFlags, MetadataMap, RequestParams};
pub use service::{CallContext, DataService, ResponseStream};
pub use status::{Code, ErrorDetail, Status};

/// Table path used by the conformance suites, `projects/<p>/instances/<i>/tables/<t>`
pub fn build_table_name(table_id: &str) -> String {
    format!("projects/project/instances/instance/tables/{}", table_id)
}

/// Package version and short commit hash, stamped by the build script
pub const VERSION: &str = env!("BUILD_VERSION");
