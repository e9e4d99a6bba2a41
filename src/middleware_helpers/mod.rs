pub mod error_disclosure;
pub mod request_id;

pub use error_disclosure::error_disclosure_middleware;
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
