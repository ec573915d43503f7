mod context;
pub use context::HttpContext;

mod http_connection;
pub use http_connection::HttpConnection;
