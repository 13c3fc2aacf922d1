//! The readiness-driven relay loop.
//!
//! One task watches three classes of sources: the pty master, the attach
//! listener, and every registered client socket. Events are dispatched one
//! at a time; handlers run to completion without blocking. Console output
//! fans out to all clients in registry insertion order; client input is
//! forwarded verbatim to the pty master.

use std::fs::File;
use std::future;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use futures::future::select_all;
use tokio::io::unix::AsyncFd;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{MuxError, SetupStep};
use crate::notify::{ConsoleSink, ReadinessNotifier};
use crate::pty::PtyConsole;
use crate::registry::{AttachClient, ClientRegistry};

/// Staging buffer for one read before fan-out or forwarding.
const RELAY_BUF_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxState {
    Initializing,
    Running,
    Terminated,
}

enum Event {
    PtyReadable,
    Inbound(io::Result<(TcpStream, SocketAddr)>),
    ClientReadable(usize),
}

/// The console multiplexer. Owns the pty master, the attach listener, the
/// client registry and the relay buffer; everything else is injected.
pub struct Multiplexer {
    console: AsyncFd<File>,
    listener: TcpListener,
    registry: ClientRegistry,
    buf: [u8; RELAY_BUF_LEN],
    sink: Box<dyn ConsoleSink>,
    notifier: Box<dyn ReadinessNotifier>,
    state: MuxState,
}

impl Multiplexer {
    /// Register the console and listener with the dispatcher and build the
    /// multiplexer. Must be called from within a tokio runtime; registration
    /// failure is a fatal setup error.
    pub fn new(
        console: PtyConsole,
        listener: TcpListener,
        capacity: usize,
        sink: Box<dyn ConsoleSink>,
        notifier: Box<dyn ReadinessNotifier>,
    ) -> Result<Self, MuxError> {
        let console = AsyncFd::new(console.into_master())
            .map_err(|e| MuxError::setup(SetupStep::Dispatch, e))?;
        Ok(Self {
            console,
            listener,
            registry: ClientRegistry::new(capacity),
            buf: [0u8; RELAY_BUF_LEN],
            sink,
            notifier,
            state: MuxState::Initializing,
        })
    }

    /// Address the attach listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Signal readiness and relay until an unrecoverable error.
    ///
    /// Ordinary per-client I/O failures never end the loop; it terminates
    /// only on a pty end-of-file/read error or a dispatcher failure.
    pub async fn run(mut self) -> Result<(), MuxError> {
        self.notifier.notify_ready();
        self.state = MuxState::Running;
        info!(
            state = ?self.state,
            clients_max = self.registry.capacity(),
            "console multiplexer running"
        );

        let result = self.relay_loop().await;
        self.state = MuxState::Terminated;
        if let Err(e) = &result {
            warn!(state = ?self.state, error = %e, "console multiplexer terminated");
        }
        result
    }

    async fn relay_loop(&mut self) -> Result<(), MuxError> {
        loop {
            let event = tokio::select! {
                res = self.console.readable() => {
                    let _ = res.map_err(MuxError::Relay)?;
                    Event::PtyReadable
                }
                res = self.listener.accept() => Event::Inbound(res),
                idx = Self::client_readable(&self.registry) => Event::ClientReadable(idx),
            };

            match event {
                Event::PtyReadable => self.relay_console_output().await?,
                Event::Inbound(res) => self.handle_inbound(res),
                Event::ClientReadable(idx) => self.handle_client_input(idx),
            }
        }
    }

    /// Resolves with the registry index of the next client whose socket
    /// becomes readable. Pends forever while no clients are attached.
    async fn client_readable(registry: &ClientRegistry) -> usize {
        if registry.is_empty() {
            return future::pending().await;
        }
        let waits: Vec<_> = registry
            .iter()
            .map(|client| Box::pin(client.stream().readable()))
            .collect();
        let (_ready, index, _rest) = select_all(waits).await;
        index
    }

    /// pty-readable: read one chunk and fan it out to every client, then
    /// echo it to the sink. A read of zero or an error is abnormal and ends
    /// the loop.
    async fn relay_console_output(&mut self) -> Result<(), MuxError> {
        let mut guard = self.console.readable().await.map_err(MuxError::Relay)?;
        let read = guard.try_io(|fd| {
            let mut master = fd.get_ref();
            master.read(&mut self.buf[..RELAY_BUF_LEN - 1])
        });

        match read {
            Err(_would_block) => Ok(()),
            Ok(Ok(0)) => Err(MuxError::Relay(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "console pty closed",
            ))),
            Ok(Ok(n)) => {
                self.fan_out(n);
                Ok(())
            }
            Ok(Err(e)) => Err(MuxError::Relay(e)),
        }
    }

    /// Write the staged chunk to every client in insertion order.
    ///
    /// Writes are best-effort: a would-block client loses the chunk rather
    /// than back-pressuring the console, and a failed write disconnects the
    /// client and reclaims its slot.
    fn fan_out(&mut self, len: usize) {
        let chunk = &self.buf[..len];
        let mut failed = Vec::new();

        for (index, client) in self.registry.iter().enumerate() {
            match client.stream().try_write(chunk) {
                Ok(written) if written < len => {
                    debug!(peer = %client.addr(), written, len, "partial write to attach client");
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    debug!(peer = %client.addr(), "attach client not ready, chunk dropped");
                }
                Err(e) => {
                    warn!(peer = %client.addr(), error = %e, "write to attach client failed");
                    failed.push(index);
                }
            }
        }

        for index in failed.into_iter().rev() {
            let client = self.registry.remove(index);
            info!(
                peer = %client.addr(),
                clients = self.registry.len(),
                "attach client dropped"
            );
        }

        self.sink.echo(chunk);
    }

    /// Listener-readable: accept exactly one pending connection.
    ///
    /// Accept failures are logged and ignored; a single failed accept must
    /// not take down an otherwise healthy console.
    fn handle_inbound(&mut self, res: io::Result<(TcpStream, SocketAddr)>) {
        match res {
            Ok((stream, addr)) => {
                match self.registry.push(AttachClient::new(stream, addr)) {
                    Ok(()) => {
                        info!(
                            peer = %addr,
                            clients = self.registry.len(),
                            "attach client connected"
                        );
                    }
                    Err(rejected) => {
                        warn!(
                            peer = %addr,
                            clients = self.registry.len(),
                            clients_max = self.registry.capacity(),
                            "attach client rejected: too many connected clients"
                        );
                        drop(rejected);
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to accept attach client"),
        }
    }

    /// client-readable: forward available bytes verbatim to the pty master.
    /// End-of-file or a read error removes the client and reclaims the slot.
    fn handle_client_input(&mut self, index: usize) {
        let Some(client) = self.registry.get(index) else {
            return;
        };
        let peer = client.addr();

        match client.stream().try_read(&mut self.buf[..RELAY_BUF_LEN - 1]) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Ok(0) => {
                self.registry.remove(index);
                info!(
                    peer = %peer,
                    clients = self.registry.len(),
                    "attach client disconnected"
                );
            }
            Ok(n) => {
                if let Err(e) = self.write_to_console(n) {
                    warn!(peer = %peer, error = %e, "failed to forward client input to console");
                }
            }
            Err(e) => {
                self.registry.remove(index);
                warn!(
                    peer = %peer,
                    error = %e,
                    clients = self.registry.len(),
                    "attach client read failed, dropping"
                );
            }
        }
    }

    /// Write the staged chunk to the pty master in a single best-effort
    /// pass. The master is non-blocking; when its input queue is full the
    /// rest of the chunk is dropped so the dispatch loop never stalls on a
    /// flooding client.
    fn write_to_console(&mut self, len: usize) -> io::Result<()> {
        let mut master = self.console.get_ref();
        match master.write(&self.buf[..len]) {
            Ok(0) => Err(io::ErrorKind::WriteZero.into()),
            Ok(written) if written < len => {
                debug!(written, len, "console input queue full, remainder dropped");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(len, "console not writable, client input dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
