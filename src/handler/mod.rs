//! The request-handler seam.
//!
//! A server is built around exactly one [`Handler`]; routing beyond that is
//! somebody else's business. Handlers drive the whole exchange through the
//! [`HttpContext`](crate::connection::HttpContext): read the body, set
//! status and headers, write and end the response.

use async_trait::async_trait;

use crate::connection::HttpContext;
use crate::protocol::HandlerError;
use crate::util;

mod static_handler;
pub use static_handler::StaticHandler;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, context: &mut HttpContext<'_>) -> Result<(), HandlerError>;
}

/// The replacement handler used when the server is at its connection cap:
/// answers `503 Service Unavailable`, which closes the connection.
pub struct UnavailableHandler;

#[async_trait]
impl Handler for UnavailableHandler {
    async fn handle(&self, context: &mut HttpContext<'_>) -> Result<(), HandlerError> {
        util::send_unavailable(context).await?;
        Ok(())
    }
}
