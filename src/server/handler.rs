use crate::{errors::Error, http::request::Request, http::response::ResponseWriter};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};

/// Application entry point invoked once per parsed request.
///
/// The request and response writer are borrowed from the serve loop: every
/// byte view in the request, and the response sink, become property of the
/// loop again when `handle` returns. Handlers that need request bytes past
/// their return must copy them.
///
/// Returning an error is connection-fatal; whatever was already written is
/// flushed first. A panic inside the handler is caught at the serve-loop
/// boundary and treated the same way.
///
/// `R`/`W` are the connection's read and write halves. Handlers normally
/// stay generic over both:
///
/// ```
/// use filament::{Error, Handler, Request, ResponseWriter};
/// use tokio::io::{AsyncRead, AsyncWrite};
///
/// struct Hello;
///
/// impl<R, W> Handler<R, W> for Hello
/// where
///     R: AsyncRead + Unpin + Send,
///     W: AsyncWrite + Unpin + Send,
/// {
///     async fn handle(
///         &self,
///         request: &mut Request<'_, R>,
///         response: &mut ResponseWriter<'_, W>,
///     ) -> Result<(), Error> {
///         if request.path() == b"/hello" {
///             response.write_text(200, b"Hello world!").await
///         } else {
///             response.write_error(404, b"not found").await
///         }
///     }
/// }
/// ```
pub trait Handler<R, W>
where
    Self: Sync + Send + 'static,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Processes one request and writes the response.
    fn handle(
        &self,
        request: &mut Request<'_, R>,
        response: &mut ResponseWriter<'_, W>,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
