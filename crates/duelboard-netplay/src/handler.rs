//! Session handler task.
//!
//! One task owns the [`SessionController`] and the active link. It reacts to
//! link events and user commands in arrival order, so the controller never
//! sees concurrent input.

use std::sync::Arc;

use duelboard_netproto::{GameResult, GameState, PeerId, RuleVariant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::PeerConfig,
    controller::{SessionController, Step},
    error::{LinkError, MoveRejection, NetplayError},
    link::{self, LinkEvent, LinkHandle},
    negotiator::RoleAssignment,
    session::{LinkSide, SessionState, SessionView},
    transport::Transport,
};

const COMMAND_CAPACITY: usize = 32;
const LINK_EVENT_CAPACITY: usize = 256;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Listening {
        local_addr: String,
    },
    Connected {
        peer: PeerId,
        side: LinkSide,
    },
    ConnectFailed {
        error: LinkError,
    },
    /// `error` is `None` when the local user disconnected.
    Disconnected {
        error: Option<LinkError>,
    },
    HandshakeComplete {
        roles: RoleAssignment,
        local_first: bool,
    },
    RuleMismatch {
        local: RuleVariant,
        remote: RuleVariant,
    },
    BoardUpdated {
        state: GameState,
        is_local_turn: bool,
    },
    MoveRejected {
        reason: MoveRejection,
    },
    /// A command was not valid in the current state.
    CommandRejected {
        command: &'static str,
        state: SessionState,
    },
    GameOver {
        result: GameResult,
        /// `None` on a draw.
        local_won: Option<bool>,
    },
    ResetByPeer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    StartListening,
    Connect(String),
    ClaimFirstMove { self_first: bool },
    LocalMove { row: usize, col: usize },
    Reset,
    Disconnect,
    Shutdown,
}

impl PeerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartListening => "start_listening",
            Self::Connect(_) => "connect",
            Self::ClaimFirstMove { .. } => "claim_first_move",
            Self::LocalMove { .. } => "local_move",
            Self::Reset => "reset",
            Self::Disconnect => "disconnect",
            Self::Shutdown => "shutdown",
        }
    }
}

pub struct SessionHandler {
    transport: Arc<dyn Transport>,
    config: PeerConfig,
    controller: SessionController,
    view: SessionView,
    /// Generation of the current open attempt or link.
    generation: u64,
    /// Cancels the current open attempt and its link tasks.
    cancel: Option<CancellationToken>,
    link: Option<LinkHandle>,
    link_tx: mpsc::Sender<LinkEvent>,
    link_rx: mpsc::Receiver<LinkEvent>,
    command_rx: mpsc::Receiver<PeerCommand>,
    event_tx: mpsc::Sender<PeerEvent>,
}

impl SessionHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: PeerConfig,
        event_tx: mpsc::Sender<PeerEvent>,
    ) -> (Self, mpsc::Sender<PeerCommand>, SessionView) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (link_tx, link_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
        let controller = SessionController::new(config.rule, config.keep_roles_on_reset);
        let view = SessionView::new();
        view.publish(controller.snapshot());

        (
            Self {
                transport,
                config,
                controller,
                view: view.clone(),
                generation: 0,
                cancel: None,
                link: None,
                link_tx,
                link_rx,
                command_rx,
                event_tx,
            },
            command_tx,
            view,
        )
    }

    /// Process link events and commands until shutdown or until every
    /// command sender is dropped.
    pub async fn run(&mut self) -> Result<(), NetplayError> {
        loop {
            // Inbound frames go first so a command always sees the freshest
            // peer state.
            tokio::select! {
                biased;

                event = self.link_rx.recv() => {
                    // `link_tx` lives in self, so the channel never closes here.
                    if let Some(event) = event {
                        self.handle_link_event(event).await;
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PeerCommand::Shutdown) | None => {
                            debug!("Session handler shutting down");
                            let step = self.teardown();
                            let _ = self.dispatch(step).await;
                            self.publish();
                            return Ok(());
                        }
                        Some(cmd) => self.handle_command(cmd).await?,
                    }
                }
            }
            self.publish();
        }
    }

    async fn handle_command(&mut self, cmd: PeerCommand) -> Result<(), NetplayError> {
        let name = cmd.name();
        let result = match cmd {
            PeerCommand::StartListening => {
                let step = self.teardown();
                self.dispatch(step).await?;
                let step = self.controller.begin_listening();
                self.dispatch(step).await?;
                let cancel = self.next_attempt();
                link::spawn_listen(
                    self.transport.clone(),
                    self.config.service.clone(),
                    self.generation,
                    self.link_tx.clone(),
                    cancel,
                );
                Ok(Step::default())
            }
            PeerCommand::Connect(address) => {
                let step = self.teardown();
                self.dispatch(step).await?;
                let step = self.controller.begin_connecting(&address);
                self.dispatch(step).await?;
                let cancel = self.next_attempt();
                link::spawn_connect(
                    self.transport.clone(),
                    address,
                    self.generation,
                    self.link_tx.clone(),
                    cancel,
                );
                Ok(Step::default())
            }
            PeerCommand::ClaimFirstMove { self_first } => {
                self.controller.claim_first_move(self_first)
            }
            PeerCommand::LocalMove { row, col } => self.controller.local_move(row, col),
            PeerCommand::Reset => self.controller.reset(),
            PeerCommand::Disconnect => Ok(self.teardown()),
            PeerCommand::Shutdown => Ok(Step::default()),
        };

        match result {
            Ok(step) => self.dispatch(step).await,
            Err(NetplayError::MoveRejected(reason)) => {
                info!(%reason, "Move rejected");
                self.emit(PeerEvent::MoveRejected { reason }).await
            }
            Err(NetplayError::InvalidCommand { command, state }) => {
                info!(command, %state, "Command rejected");
                self.emit(PeerEvent::CommandRejected { command, state }).await
            }
            Err(e) => {
                warn!(command = name, error = %e, "Command failed");
                self.emit(PeerEvent::CommandRejected {
                    command: name,
                    state: self.controller.state(),
                })
                .await
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        if event.generation() != self.generation {
            debug!(
                stale = event.generation(),
                current = self.generation,
                "Dropping event from an old link"
            );
            return;
        }

        let step = match event {
            LinkEvent::Listening { local_addr, .. } => self.controller.on_listening(local_addr),
            LinkEvent::Opened { link, info, .. } => {
                self.link = Some(link);
                self.controller.on_link_up(info)
            }
            LinkEvent::OpenFailed { error, .. } => {
                self.cancel = None;
                self.controller.on_open_failed(error)
            }
            LinkEvent::Frame { frame, .. } => self.controller.on_frame(&frame),
            LinkEvent::Closed { error, .. } => {
                // Retire the generation so a second report from the other
                // half of the link is dropped.
                self.generation += 1;
                self.link = None;
                if let Some(cancel) = self.cancel.take() {
                    cancel.cancel();
                }
                self.controller.on_link_down(Some(error))
            }
        };

        if let Err(e) = self.dispatch(step).await {
            warn!(error = %e, "Failed to dispatch link event");
        }
    }

    /// Close the current link or abandon the current open attempt.
    fn teardown(&mut self) -> Step {
        self.generation += 1;
        if let Some(link) = self.link.take() {
            link.close();
        }
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.controller.on_link_down(None)
    }

    fn next_attempt(&mut self) -> CancellationToken {
        self.generation += 1;
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        cancel
    }

    async fn dispatch(&self, step: Step) -> Result<(), NetplayError> {
        for msg in &step.outbound {
            match &self.link {
                Some(link) => {
                    debug!(kind = %msg.kind(), "Sending frame");
                    // A dead writer reports `Closed` on the link channel.
                    if let Err(e) = link.send_message(msg).await {
                        warn!(error = %e, "Frame not queued");
                    }
                }
                None => warn!(kind = %msg.kind(), "No link for outbound frame"),
            }
        }
        for event in step.events {
            self.emit(event).await?;
        }
        Ok(())
    }

    async fn emit(&self, event: PeerEvent) -> Result<(), NetplayError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| NetplayError::ChannelSend)
    }

    fn publish(&self) {
        self.view.publish(self.controller.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use duelboard_netproto::PeerId;
    use parking_lot::Mutex;
    use tokio::io::{AsyncWrite, DuplexStream, duplex};
    use tokio::time::timeout;

    use super::*;
    use crate::session::LinkInfo;
    use crate::transport::{Acceptor, BoxFuture, Connection, TcpTransport};

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn link_info() -> LinkInfo {
        LinkInfo {
            local_id: PeerId::new("local").unwrap(),
            remote_id: PeerId::new("remote").unwrap(),
            side: LinkSide::Initiator,
        }
    }

    /// Connects to nothing. Reads stay pending; every write fails.
    #[derive(Default)]
    struct BrokenPipeTransport {
        far_ends: Mutex<Vec<DuplexStream>>,
    }

    impl Transport for BrokenPipeTransport {
        fn listen<'a>(
            &'a self,
            _service: &'a str,
        ) -> BoxFuture<'a, Result<Box<dyn Acceptor>, LinkError>> {
            Box::pin(async { Err(LinkError::PermissionDenied("no listener".to_string())) })
        }

        fn connect<'a>(
            &'a self,
            _address: &'a str,
        ) -> BoxFuture<'a, Result<Connection, LinkError>> {
            Box::pin(async move {
                let (ours, theirs) = duplex(1024);
                self.far_ends.lock().push(theirs);
                Ok(Connection {
                    reader: Box::new(ours),
                    writer: Box::new(BrokenPipe),
                    info: link_info(),
                })
            })
        }

        fn name(&self) -> &'static str {
            "broken-pipe"
        }
    }

    async fn next(events: &mut mpsc::Receiver<PeerEvent>) -> PeerEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn write_failure_disconnects_once() {
        let (event_tx, mut events) = mpsc::channel(32);
        let transport = Arc::new(BrokenPipeTransport::default());
        let (mut handler, cmd, view) =
            SessionHandler::new(transport, PeerConfig::default(), event_tx);
        tokio::spawn(async move {
            let _ = handler.run().await;
        });

        cmd.send(PeerCommand::Connect("remote".to_string()))
            .await
            .unwrap();
        assert!(matches!(
            next(&mut events).await,
            PeerEvent::Connected {
                side: LinkSide::Initiator,
                ..
            }
        ));

        cmd.send(PeerCommand::ClaimFirstMove { self_first: true })
            .await
            .unwrap();
        assert!(matches!(
            next(&mut events).await,
            PeerEvent::Disconnected {
                error: Some(LinkError::WriteFailed(_))
            }
        ));

        let more = timeout(Duration::from_millis(200), events.recv()).await;
        assert!(more.is_err(), "unexpected event: {more:?}");
        assert_eq!(view.snapshot().session_state, SessionState::Idle);
    }

    #[tokio::test]
    async fn second_close_report_is_dropped() {
        let (event_tx, mut events) = mpsc::channel(32);
        let transport = Arc::new(TcpTransport::new("127.0.0.1:0".parse().unwrap()));
        let (mut handler, _cmd, _view) =
            SessionHandler::new(transport, PeerConfig::default(), event_tx);

        handler.controller.begin_connecting("remote");
        let cancel = handler.next_attempt();
        let generation = handler.generation;
        let (ours, _theirs) = duplex(1024);
        let (reader, writer) = tokio::io::split(ours);
        let conn = Connection {
            reader: Box::new(reader),
            writer: Box::new(writer),
            info: link_info(),
        };
        let link = link::spawn_link(conn, generation, handler.link_tx.clone(), cancel);
        handler
            .handle_link_event(LinkEvent::Opened {
                generation,
                link,
                info: link_info(),
            })
            .await;
        assert!(matches!(next(&mut events).await, PeerEvent::Connected { .. }));

        for error in [
            LinkError::WriteFailed("broken pipe".to_string()),
            LinkError::StreamClosed("connection reset".to_string()),
        ] {
            handler
                .handle_link_event(LinkEvent::Closed { generation, error })
                .await;
        }

        assert_eq!(
            next(&mut events).await,
            PeerEvent::Disconnected {
                error: Some(LinkError::WriteFailed("broken pipe".to_string()))
            }
        );
        assert!(events.try_recv().is_err());
        assert_eq!(handler.controller.state(), SessionState::Idle);
    }
}
