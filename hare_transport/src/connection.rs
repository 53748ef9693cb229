use bytes::BytesMut;
use hare_core::{
    connection::{ConEventReceiver, ConnectionEvent, ConnectionId},
    methods::{Request, Response},
};
use hare_messaging::ConnectionHandle;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    select,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    error::{Result, TransError},
    frame,
};

const READ_BUF_CAPACITY: usize = 8 * 1024;

/// Owns the socket of a client. Requests are read from it and handed to the connection, responses
/// and deliveries are written back.
pub struct TransportConnection<S> {
    id: ConnectionId,
    stream: S,
    read_buf: BytesMut,
    /// Closed on drop
    connection: ConnectionHandle,
    /// Responses and deliveries from other tasks
    event_receiver: ConEventReceiver,
}

impl<S> TransportConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, connection: ConnectionHandle, event_receiver: ConEventReceiver) -> Self {
        Self {
            id: connection.id,
            stream,
            read_buf: BytesMut::with_capacity(READ_BUF_CAPACITY),
            connection,
            event_receiver,
        }
    }

    pub async fn start_connection_processing(mut self) {
        match self.main_loop().await {
            Ok(()) => {}
            Err(TransError::UnexpectedEof) => {
                debug!("Client disconnected in the middle of a frame");
            }
            Err(err @ (TransError::FrameTooLarge(_) | TransError::Codec(_))) => {
                warn!(%err, "Closing connection to faulty client");
            }
            Err(err) => error!(%err, "Error during processing of connection"),
        }

        if let Err(err) = self.stream.shutdown().await {
            debug!(%err, "Failed to shut down stream");
        }

        // the connection is closed on drop
    }

    async fn main_loop(&mut self) -> Result<()> {
        loop {
            select! {
                frame = frame::read_frame(&mut self.stream, &mut self.read_buf) => {
                    match frame? {
                        Some(frame) => self.handle_frame(&frame).await?,
                        None => {
                            info!(id = %self.id, "Client closed the connection");
                            return Ok(());
                        }
                    }
                }
                event = self.event_receiver.recv() => {
                    match event {
                        Some(ConnectionEvent::Response(response)) => {
                            trace!(?response, "Received response from event queue");
                            self.send_response(&response).await?;
                        }
                        Some(ConnectionEvent::Shutdown) | None => {
                            info!(id = %self.id, "Shutting down connection");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    #[tracing::instrument(skip(self, frame), level = "trace")]
    async fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        let request = serde_json::from_slice::<Request>(frame)?;
        trace!(?request, "Received request");

        let response = self.connection.handle(request);
        self.send_response(&response).await
    }

    async fn send_response(&mut self, response: &Response) -> Result<()> {
        let payload = serde_json::to_vec(response)?;
        frame::write_frame(&mut self.stream, &payload).await
    }
}

impl<S> Drop for TransportConnection<S> {
    fn drop(&mut self) {
        self.connection.close();
    }
}
