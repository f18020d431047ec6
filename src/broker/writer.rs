//! Serialized response output.
//!
//! The output stream is owned exclusively by the writer; workers borrow it
//! only for the duration of a single atomic record write. One mutex guards
//! the stream, so concurrent workers can never interleave partial records.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::proto::{empty_data, Response};
use crate::{AppError, Result};

/// Buffers that grew beyond this size are not returned to the pool, so one
/// outlier response cannot pin an oversized allocation for the process
/// lifetime.
const MAX_POOLED_BUF_BYTES: usize = 64 * 1024;

/// Upper bound on pooled buffers; matches the worst case of every worker
/// writing at once.
const MAX_POOLED_BUFS: usize = 8;

struct WriterInner {
    out: Box<dyn AsyncWrite + Send + Unpin>,
    pool: Vec<Vec<u8>>,
}

/// Mutex-guarded writer serializing responses onto the output stream.
pub struct ResponseWriter {
    tag: String,
    inner: Mutex<WriterInner>,
}

impl ResponseWriter {
    /// Wrap `out` as the broker's response stream, stamping `tag` onto
    /// responses that do not set one.
    pub fn new(out: impl AsyncWrite + Send + Unpin + 'static, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            inner: Mutex::new(WriterInner {
                out: Box::new(out),
                pool: Vec::new(),
            }),
        }
    }

    /// Send `resp`, logging any failure. Most write failures mean the
    /// client has disconnected, which is not actionable here.
    pub async fn send(&self, resp: Response) {
        if let Err(err) = self.try_send(resp).await {
            warn!(%err, "cannot send response");
        }
    }

    /// Send `resp`, filling in defaults first.
    ///
    /// `data` is replaced with the empty-object sentinel when `null`, and
    /// an empty `tag` gets the broker instance tag. If the payload cannot
    /// be serialized and the response carries a token, a minimal error
    /// envelope is substituted so the client waiting on that token is not
    /// left hanging.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the record cannot be written to the
    /// output stream.
    pub async fn try_send(&self, mut resp: Response) -> Result<()> {
        if resp.data.is_null() {
            resp.data = empty_data();
        }
        if resp.tag.is_empty() {
            resp.tag.clone_from(&self.tag);
        }

        let mut inner = self.inner.lock().await;
        let mut buf = inner.pool.pop().unwrap_or_default();
        buf.clear();

        if let Err(err) = serde_json::to_writer(&mut buf, &resp) {
            if resp.token.is_empty() {
                return Err(AppError::Protocol(format!(
                    "cannot encode response: {err}"
                )));
            }
            // The client is blocked waiting on this token; answer it with
            // a minimal envelope instead of staying silent.
            error!(token = %resp.token, %err, "cannot encode response, substituting error envelope");
            buf.clear();
            let fallback = Response {
                token: resp.token,
                error: format!("broker: cannot encode response: {err}"),
                tag: resp.tag,
                data: Value::Object(serde_json::Map::new()),
            };
            serde_json::to_writer(&mut buf, &fallback)
                .map_err(|err| AppError::Protocol(format!("cannot encode error envelope: {err}")))?;
        }
        buf.push(b'\n');

        let write_result = async {
            inner.out.write_all(&buf).await?;
            inner.out.flush().await
        }
        .await;

        if buf.capacity() <= MAX_POOLED_BUF_BYTES && inner.pool.len() < MAX_POOLED_BUFS {
            inner.pool.push(buf);
        }

        write_result.map_err(|err| AppError::Io(err.to_string()))
    }
}
