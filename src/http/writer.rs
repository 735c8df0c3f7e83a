use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Files are streamed to the socket in chunks of this size so peak memory
/// stays bounded regardless of file size.
const CHUNK_SIZE: usize = 8192;

fn serialize_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers, in insertion order
    for (k, v) in resp.headers.iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Writes a response to a stream.
///
/// Consumes the response: once the status line and headers have gone out
/// there is no way to mutate them, which is the "headers sent" barrier.
/// With `head_only` (HEAD requests) the body is suppressed while the head,
/// including `Content-Length`, is written unchanged.
pub struct ResponseWriter {
    response: Response,
    head_only: bool,
}

impl ResponseWriter {
    pub fn new(response: Response, head_only: bool) -> Self {
        Self { response, head_only }
    }

    pub async fn write_to_stream<W>(self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let head = serialize_head(&self.response);
        stream.write_all(&head).await?;

        if !self.head_only {
            match self.response.body {
                Body::Bytes(bytes) => {
                    if !bytes.is_empty() {
                        stream.write_all(&bytes).await?;
                    }
                }
                Body::File { mut file, .. } => {
                    let mut chunk = vec![0u8; CHUNK_SIZE];
                    loop {
                        let n = file.read(&mut chunk).await?;
                        if n == 0 {
                            break;
                        }
                        stream.write_all(&chunk[..n]).await?;
                    }
                }
            }
        }

        stream.flush().await?;
        Ok(())
    }
}
