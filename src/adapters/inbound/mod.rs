mod api_server;

pub use api_server::{router, ApiError, ApiServer, ApiState, REQUEST_TIMEOUT_HEADER};
