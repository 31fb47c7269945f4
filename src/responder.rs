//! Async REQ/REP responder loop.
//!
//! Single cooperative task over a ZMQ REP socket, using TMQ for
//! epoll-backed async I/O. At most one message is ever in flight: the loop
//! suspends only while awaiting the next request and while awaiting the
//! reply send. The session handler (including the blocking engine call)
//! runs in `spawn_blocking` with the session moved in and back out, so a
//! slow inference pass delays the next receive instead of the runtime.

use std::sync::Arc;
use std::time::Duration;

use tmq::request_reply::RequestReceiver;
use tmq::{FromZmqSocket, Multipart};
use tokio::sync::Notify;
use tracing::{debug, error, info, trace};

use crate::error::ServerError;
use crate::session::{Outcome, Session};
use crate::transport::Endpoint;

pub struct Responder {
    endpoint: Endpoint,
    context: Arc<zmq::Context>,
    recv_timeout: Duration,
}

impl Responder {
    pub fn new(endpoint: Endpoint, context: Arc<zmq::Context>, recv_timeout: Duration) -> Self {
        Self {
            endpoint,
            context,
            recv_timeout,
        }
    }

    /// Bind the socket and start serving the session.
    ///
    /// Returns once the socket is bound (or fails to), with a handle for
    /// stopping the loop and waiting for it to finish. The loop also exits
    /// on its own when the sentinel arrives.
    pub async fn run(self, session: Session) -> Result<ResponderHandle, ServerError> {
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = Arc::clone(&shutdown);
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn(async move {
            if let Err(err) = Self::serve(
                self.endpoint,
                self.context,
                session,
                self.recv_timeout,
                shutdown_clone,
                ready_tx,
            )
            .await
            {
                error!(%err, "responder loop failed");
            }
        });

        // Wait for the socket to bind (or surface the bind error).
        ready_rx
            .await
            .map_err(|_| ServerError::Transport("responder exited before binding".into()))??;

        Ok(ResponderHandle {
            task: Some(task),
            shutdown,
        })
    }

    async fn serve(
        endpoint: Endpoint,
        context: Arc<zmq::Context>,
        mut session: Session,
        recv_timeout: Duration,
        shutdown: Arc<Notify>,
        ready_tx: tokio::sync::oneshot::Sender<Result<(), ServerError>>,
    ) -> Result<(), ServerError> {
        let socket = match Self::bind_rep_socket(&endpoint, &context) {
            Ok(socket) => socket,
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                return Ok(());
            }
        };
        let mut receiver = match RequestReceiver::from_zmq_socket(socket) {
            Ok(receiver) => receiver,
            Err(err) => {
                let _ = ready_tx.send(Err(ServerError::Transport(format!(
                    "failed to wrap socket in TMQ: {err}"
                ))));
                return Ok(());
            }
        };

        info!(endpoint = %endpoint, "responder listening");
        if ready_tx.send(Ok(())).is_err() {
            return Ok(());
        }

        'serve: loop {
            let recv = receiver.recv();
            tokio::pin!(recv);
            // Inner loop so a receive timeout logs and keeps waiting
            // without tearing down the pending receive.
            let (request, sender) = loop {
                tokio::select! {
                    biased;

                    _ = shutdown.notified() => {
                        debug!("shutdown signal received");
                        break 'serve;
                    }

                    _ = tokio::time::sleep(recv_timeout) => {
                        debug!(timeout = ?recv_timeout, "no message within the receive window; still waiting");
                    }

                    result = &mut recv => {
                        break result.map_err(|e| ServerError::Transport(format!("recv error: {e}")))?;
                    }
                }
            };

            let raw: Vec<u8> = request.into_iter().flat_map(|frame| frame.to_vec()).collect();
            trace!(bytes = raw.len(), "request received");

            // The engine call may block for a long time; keep it off the
            // runtime threads. Moving the session through the closure keeps
            // single-message-in-flight admission control without locks.
            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = session.handle(&raw);
                (session, outcome)
            })
            .await
            .map_err(|e| ServerError::Transport(format!("handler task failed: {e}")))?;
            session = returned;

            let reply = match outcome {
                Outcome::Shutdown => {
                    info!("sentinel received; closing session");
                    break 'serve;
                }
                Outcome::Reply(reply) => reply,
                // Strict REP alternation requires one send per receive; an
                // empty reply is the wire form of "no result".
                Outcome::Dropped => Vec::new(),
            };

            trace!(bytes = reply.len(), "sending reply");
            let msg: Multipart = vec![reply].into();
            receiver = sender
                .send(msg)
                .await
                .map_err(|e| ServerError::Transport(format!("send error: {e}")))?;
        }

        info!("responder stopped");
        Ok(())
    }

    fn bind_rep_socket(
        endpoint: &Endpoint,
        context: &zmq::Context,
    ) -> Result<zmq::Socket, ServerError> {
        let socket = context.socket(zmq::REP)?;
        socket.set_linger(0).ok();
        endpoint.bind(&socket)?;
        Ok(socket)
    }
}

/// Handle for a running responder.
pub struct ResponderHandle {
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown: Arc<Notify>,
}

impl ResponderHandle {
    /// Shared shutdown signal, for wiring to an interrupt handler.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Stop the loop and wait for it to finish. Idempotent.
    pub async fn stop(&mut self) {
        self.shutdown.notify_one();
        self.wait().await;
    }

    /// Wait for the loop to exit on its own (sentinel or fatal error).
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}
