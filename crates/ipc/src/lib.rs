mod error;
mod method;
mod protocol;
mod request;
mod response;

pub use error::IpcError;
pub use method::Method;
pub use protocol::{Request, Response, RpcError};
pub use request::*;
pub use response::*;
