//! Background tasks that own an open stream.
//!
//! Every open attempt gets a generation number. All events carry it so the
//! handler can drop whatever a torn-down link still manages to report.

use std::sync::Arc;

use bytes::Bytes;
use duelboard_netproto::{LineFramer, Message, constants::RX_BUFFER_SIZE, encode_frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{LinkError, NetplayError};
use crate::session::LinkInfo;
use crate::transport::{BoxReader, BoxWriter, Connection, Transport};

const LINK_COMMAND_CAPACITY: usize = 64;

/// Events sent from link tasks to the session handler.
#[derive(Debug)]
pub enum LinkEvent {
    Listening {
        generation: u64,
        local_addr: String,
    },
    Opened {
        generation: u64,
        link: LinkHandle,
        info: LinkInfo,
    },
    OpenFailed {
        generation: u64,
        error: LinkError,
    },
    /// One complete line, delimiter stripped.
    Frame {
        generation: u64,
        frame: Bytes,
    },
    Closed {
        generation: u64,
        error: LinkError,
    },
}

impl LinkEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Listening { generation, .. }
            | Self::Opened { generation, .. }
            | Self::OpenFailed { generation, .. }
            | Self::Frame { generation, .. }
            | Self::Closed { generation, .. } => *generation,
        }
    }
}

#[derive(Debug)]
enum LinkCommand {
    SendRaw(Bytes),
    Close,
}

/// Handle for writing to a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    generation: u64,
    cmd_tx: mpsc::Sender<LinkCommand>,
    cancel: CancellationToken,
}

impl LinkHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a message. Write failures surface later as
    /// [`LinkEvent::Closed`].
    pub async fn send_message(&self, msg: &Message) -> Result<(), NetplayError> {
        let bytes = Bytes::from(encode_frame(msg)?);
        self.cmd_tx
            .send(LinkCommand::SendRaw(bytes))
            .await
            .map_err(|_| NetplayError::ChannelSend)
    }

    /// Stop both halves. Frames already queued are written only if the
    /// stream accepts them without blocking.
    pub fn close(&self) {
        let _ = self.cmd_tx.try_send(LinkCommand::Close);
        self.cancel.cancel();
    }
}

/// Accept one inbound peer in the background.
pub fn spawn_listen(
    transport: Arc<dyn Transport>,
    service: String,
    generation: u64,
    event_tx: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let open = async {
            let acceptor = transport.listen(&service).await?;
            let _ = event_tx
                .send(LinkEvent::Listening {
                    generation,
                    local_addr: acceptor.local_addr(),
                })
                .await;
            acceptor.accept().await
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(generation, "Listen cancelled");
                return;
            }
            result = open => result,
        };
        report_open(result, generation, event_tx, cancel).await;
    });
}

/// Connect to `address` in the background.
pub fn spawn_connect(
    transport: Arc<dyn Transport>,
    address: String,
    generation: u64,
    event_tx: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        transport.cancel_discovery();
        info!(%address, transport = transport.name(), "Connecting to peer");
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(generation, "Connect cancelled");
                return;
            }
            result = transport.connect(&address) => result,
        };
        report_open(result, generation, event_tx, cancel).await;
    });
}

async fn report_open(
    result: Result<Connection, LinkError>,
    generation: u64,
    event_tx: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
) {
    let event = match result {
        Ok(conn) => {
            let info = conn.info.clone();
            let link = spawn_link(conn, generation, event_tx.clone(), cancel);
            LinkEvent::Opened {
                generation,
                link,
                info,
            }
        }
        Err(error) => LinkEvent::OpenFailed { generation, error },
    };
    let _ = event_tx.send(event).await;
}

/// Start reader and writer tasks for an open stream.
pub fn spawn_link(
    conn: Connection,
    generation: u64,
    event_tx: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
) -> LinkHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(LINK_COMMAND_CAPACITY);

    let writer_tx = event_tx.clone();
    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        writer_loop(conn.writer, cmd_rx, writer_tx, generation, writer_cancel).await;
    });

    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        reader_loop(conn.reader, event_tx, generation, reader_cancel).await;
    });

    LinkHandle {
        generation,
        cmd_tx,
        cancel,
    }
}

async fn writer_loop(
    mut write: BoxWriter,
    mut cmd_rx: mpsc::Receiver<LinkCommand>,
    event_tx: mpsc::Sender<LinkEvent>,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        // Queued commands drain ahead of cancellation.
        let cmd = tokio::select! {
            biased;
            cmd = cmd_rx.recv() => cmd,
            _ = cancel.cancelled() => break,
        };
        match cmd {
            Some(LinkCommand::SendRaw(bytes)) => {
                trace!(generation, len = bytes.len(), "Writing frame");
                let write_frame = async {
                    write.write_all(&bytes).await?;
                    write.flush().await
                };
                // A peer that stops reading must not pin this task.
                let res = tokio::select! {
                    biased;
                    res = write_frame => res,
                    _ = cancel.cancelled() => {
                        debug!(generation, "Write abandoned on cancel");
                        break;
                    }
                };
                if let Err(e) = res {
                    warn!(generation, error = %e, "Write error");
                    let _ = event_tx
                        .send(LinkEvent::Closed {
                            generation,
                            error: LinkError::WriteFailed(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
            Some(LinkCommand::Close) => {
                debug!(generation, "Close requested");
                break;
            }
            None => {
                debug!(generation, "Link command channel closed");
                break;
            }
        }
    }

    tokio::select! {
        biased;
        _ = write.shutdown() => {}
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}

async fn reader_loop(
    mut read: BoxReader,
    event_tx: mpsc::Sender<LinkEvent>,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut framer = LineFramer::new(RX_BUFFER_SIZE);

    let error = loop {
        framer.buf_mut().reserve(4096);
        let res = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(generation, "Reader stopped");
                return;
            }
            res = read.read_buf(framer.buf_mut()) => res,
        };
        match res {
            Ok(0) => {
                info!(generation, "Peer closed the stream");
                break LinkError::StreamClosed("peer closed the stream".to_string());
            }
            Ok(n) => {
                trace!(generation, n, "Received bytes");
                let frames = match framer.drain_frames() {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(generation, error = %e, "Unframeable input");
                        break LinkError::StreamClosed(e.to_string());
                    }
                };
                for frame in frames {
                    if event_tx
                        .send(LinkEvent::Frame { generation, frame })
                        .await
                        .is_err()
                    {
                        warn!(generation, "Event channel closed");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(generation, error = %e, "Read error");
                break LinkError::StreamClosed(e.to_string());
            }
        }
    };

    cancel.cancel();
    let _ = event_tx.send(LinkEvent::Closed { generation, error }).await;
}
