use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use crate::channel::Connection;
use crate::protocol::{HttpError, ParseError, SendError};

/// Runs a [`Connection`] over an async reader and writer.
///
/// Bytes read are fed to the connection, whatever it produced is written back
/// after every read. The loop ends once the connection closed its output or
/// the peer closed its side.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    reader: R,
    writer: W,
    read_buf: BytesMut,
    connection: Connection,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, connection: Connection) -> Self {
        let read_buf = BytesMut::with_capacity(connection.config().read_capacity());
        Self { reader, writer, read_buf, connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub async fn process(mut self) -> Result<(), HttpError> {
        loop {
            let read = self.reader.read_buf(&mut self.read_buf).await.map_err(ParseError::io)?;

            let result = if read == 0 {
                info!("peer closed the connection input");
                self.connection.close_input()
            } else {
                let result = self.connection.feed(&self.read_buf);
                self.read_buf.clear();
                result
            };

            // a malformed head still has its 400 to write
            self.write_output().await?;
            if let Err(e) = result {
                error!(cause = %e, "can't process request, shutdown connection");
                self.shutdown().await?;
                return Err(e);
            }

            if read == 0 || self.connection.stream().is_output_closed() {
                debug!(persistent = self.connection.is_persistent(), "connection finished");
                self.shutdown().await?;
                return Ok(());
            }
        }
    }

    async fn write_output(&mut self) -> Result<(), SendError> {
        let output = self.connection.take_output();
        if output.is_empty() {
            return Ok(());
        }

        self.writer.write_all(&output).await?;
        Ok(self.writer.flush().await?)
    }

    async fn shutdown(&mut self) -> Result<(), SendError> {
        Ok(self.writer.shutdown().await?)
    }
}

impl<R, W> std::fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("connection", &self.connection).finish_non_exhaustive()
    }
}
