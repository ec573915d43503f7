mod header;
pub use header::HeaderMap;

mod request;
pub use request::HttpVersion;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;
pub use response::Status;

mod error;
pub use error::HandlerError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
