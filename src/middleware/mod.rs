pub mod credentials;
pub mod response;

pub use credentials::HeaderCredentials;
pub use response::{ApiResponse, ApiResult};
