//! Named control endpoint through which a `STOP` invocation reaches the
//! running instance.
//!
//! Unix uses a domain socket under the runtime directory, Windows a named
//! pipe. Both speak the same line protocol: the client sends `STOP\n`, the
//! server answers `OK\n` (or `ERR <reason>\n`) and posts a stop request.

use super::STOP_TOKEN;
use crate::lifecycle::{StopHandle, StopReason};
use hsu_common::ControlError;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::path::{Path, PathBuf};

/// Prefix shared by every endpoint name.
pub const ENDPOINT_PREFIX: &str = "hsu-watchdog";

/// Bound on a single request or reply exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest command line the server is willing to read.
const MAX_COMMAND_LEN: u64 = 256;

const REPLY_OK: &str = "OK";
const REPLY_UNKNOWN: &str = "ERR unknown command";

/// Well-known address of one watchdog instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    name: String,
    #[cfg(unix)]
    socket_path: PathBuf,
}

impl ControlEndpoint {
    /// Endpoint for `instance` at its default location.
    pub fn for_instance(instance: &str) -> Self {
        #[cfg(unix)]
        {
            Self::in_directory(instance, &default_socket_directory())
        }

        #[cfg(windows)]
        {
            Self {
                name: endpoint_name(instance),
            }
        }
    }

    /// Endpoint for `instance` with its socket placed in `dir`.
    #[cfg(unix)]
    pub fn in_directory(instance: &str, dir: &Path) -> Self {
        let name = endpoint_name(instance);
        let socket_path = dir.join(format!("{}.sock", name));
        Self { name, socket_path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(unix)]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    #[cfg(windows)]
    pub fn pipe_name(&self) -> String {
        format!(r"\\.\pipe\{}", self.name)
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(unix)]
        {
            write!(f, "{}", self.socket_path.display())
        }

        #[cfg(windows)]
        {
            write!(f, "{}", self.pipe_name())
        }
    }
}

/// Deterministic endpoint name for an instance identity.
pub fn endpoint_name(instance: &str) -> String {
    format!("{}-{}", ENDPOINT_PREFIX, instance)
}

/// Directory holding control sockets: `$XDG_RUNTIME_DIR`, else the local
/// data directory, else `/tmp`, with an `hsu-watchdog` subdirectory.
#[cfg(unix)]
pub fn default_socket_directory() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"));

    base.join(ENDPOINT_PREFIX)
}

/// What happened to a stop request sent by [`send_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDelivery {
    /// The instance acknowledged the request.
    Delivered,
    /// Connected, but the instance went away before acknowledging. Happens
    /// when it is already shutting down.
    Unacknowledged,
    /// Nothing is listening on the endpoint.
    NoInstance,
}

impl fmt::Display for StopDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopDelivery::Delivered => write!(f, "delivered"),
            StopDelivery::Unacknowledged => write!(f, "unacknowledged"),
            StopDelivery::NoInstance => write!(f, "no running instance"),
        }
    }
}

/// Ask the instance behind `endpoint` to stop.
///
/// Finding nobody to talk to is a normal outcome, not an error.
pub async fn send_stop(endpoint: &ControlEndpoint) -> Result<StopDelivery, ControlError> {
    let stream = match connect(endpoint).await {
        Ok(stream) => stream,
        Err(e) if is_no_instance(&e) => {
            debug!("No watchdog listening on {}: {}", endpoint, e);
            return Ok(StopDelivery::NoInstance);
        }
        Err(e) => return Err(ControlError::io(endpoint.to_string(), e.to_string())),
    };

    request_stop(stream, &endpoint.to_string()).await
}

async fn request_stop<S>(stream: S, endpoint: &str) -> Result<StopDelivery, ControlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let io_error = |e: io::Error| ControlError::io(endpoint, e.to_string());

    let request = format!("{}\n", STOP_TOKEN);
    match writer.write_all(request.as_bytes()).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(StopDelivery::Unacknowledged),
        Err(e) => return Err(io_error(e)),
    }
    writer.flush().await.map_err(io_error)?;

    let mut reply = String::new();
    let mut reader = BufReader::new(reader.take(MAX_COMMAND_LEN));
    let read = tokio::time::timeout(EXCHANGE_TIMEOUT, reader.read_line(&mut reply))
        .await
        .map_err(|_| ControlError::protocol(endpoint, "timed out waiting for reply"))?;

    match read {
        Ok(0) => Ok(StopDelivery::Unacknowledged),
        Ok(_) => match reply.trim_end() {
            REPLY_OK => Ok(StopDelivery::Delivered),
            other => Err(ControlError::protocol(
                endpoint,
                format!("unexpected reply '{}'", other),
            )),
        },
        Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(StopDelivery::Unacknowledged),
        Err(e) => Err(io_error(e)),
    }
}

/// Serve one client connection: read a command, answer it.
async fn handle_connection<S>(
    stream: S,
    stop: &StopHandle,
    endpoint: &str,
) -> Result<(), ControlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader.take(MAX_COMMAND_LEN));
    let mut command = String::new();

    let read = tokio::time::timeout(EXCHANGE_TIMEOUT, reader.read_line(&mut command))
        .await
        .map_err(|_| ControlError::protocol(endpoint, "timed out waiting for command"))?
        .map_err(|e| ControlError::io(endpoint, e.to_string()))?;

    if read == 0 {
        // Liveness probe from a starting instance, or a client that gave up.
        debug!("Control connection on {} closed without a command", endpoint);
        return Ok(());
    }

    let command = command.trim();
    let reply = if command == STOP_TOKEN {
        info!("Received {} over control endpoint {}", STOP_TOKEN, endpoint);
        if !stop.request(StopReason::ControlRequest) {
            debug!("Shutdown already under way, {} ignored", STOP_TOKEN);
        }
        REPLY_OK
    } else {
        warn!("Unknown control command '{}' on {}", command, endpoint);
        REPLY_UNKNOWN
    };

    writer
        .write_all(format!("{}\n", reply).as_bytes())
        .await
        .map_err(|e| ControlError::io(endpoint, e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| ControlError::io(endpoint, e.to_string()))?;

    Ok(())
}

fn is_no_instance(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

// ==============================================================================
// Unix domain socket transport
// ==============================================================================

#[cfg(unix)]
mod transport {
    use super::*;
    use tokio::net::{UnixListener, UnixStream};

    pub(super) async fn connect(endpoint: &ControlEndpoint) -> io::Result<UnixStream> {
        UnixStream::connect(endpoint.socket_path()).await
    }

    /// Listening side of the control endpoint. Removes its socket file when
    /// dropped.
    #[derive(Debug)]
    pub struct ControlListener {
        endpoint: ControlEndpoint,
        listener: UnixListener,
    }

    impl ControlListener {
        /// Bind the endpoint, replacing a stale socket file left behind by a
        /// crashed instance. Must be called within a tokio runtime.
        pub async fn bind(endpoint: ControlEndpoint) -> Result<Self, ControlError> {
            let path = endpoint.socket_path().to_path_buf();
            let io_error = |e: io::Error| ControlError::io(endpoint.to_string(), e.to_string());

            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(io_error)?;
            }

            let listener = match UnixListener::bind(&path) {
                Ok(listener) => listener,
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    if UnixStream::connect(&path).await.is_ok() {
                        return Err(ControlError::already_listening(endpoint.to_string()));
                    }
                    warn!("Removing stale control socket {}", path.display());
                    std::fs::remove_file(&path).map_err(io_error)?;
                    UnixListener::bind(&path).map_err(io_error)?
                }
                Err(e) => return Err(io_error(e)),
            };

            debug!("Control endpoint listening on {}", path.display());
            Ok(Self { endpoint, listener })
        }

        pub fn endpoint(&self) -> &ControlEndpoint {
            &self.endpoint
        }

        /// Accept clients until the future is dropped.
        pub async fn serve(self, stop: StopHandle) {
            let endpoint = self.endpoint.to_string();

            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let stop = stop.clone();
                        let endpoint = endpoint.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &stop, &endpoint).await {
                                warn!("Control connection failed: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept control connection on {}: {}", endpoint, e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    impl Drop for ControlListener {
        fn drop(&mut self) {
            match std::fs::remove_file(self.endpoint.socket_path()) {
                Ok(()) => debug!("Removed control socket {}", self.endpoint),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove control socket {}: {}", self.endpoint, e),
            }
        }
    }
}

// ==============================================================================
// Windows named pipe transport
// ==============================================================================

#[cfg(windows)]
mod transport {
    use super::*;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    const ERROR_PIPE_BUSY: i32 = 231;
    const CONNECT_ATTEMPTS: u32 = 20;

    pub(super) async fn connect(endpoint: &ControlEndpoint) -> io::Result<NamedPipeClient> {
        let name = endpoint.pipe_name();
        let mut attempts = 0;

        loop {
            match ClientOptions::new().open(&name) {
                Ok(client) => return Ok(client),
                Err(e)
                    if e.raw_os_error() == Some(ERROR_PIPE_BUSY) && attempts < CONNECT_ATTEMPTS =>
                {
                    attempts += 1;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Listening side of the control endpoint.
    #[derive(Debug)]
    pub struct ControlListener {
        endpoint: ControlEndpoint,
        server: NamedPipeServer,
    }

    impl ControlListener {
        /// Create the first instance of the pipe. Fails with
        /// [`ControlError::AlreadyListening`] when another process owns it.
        pub async fn bind(endpoint: ControlEndpoint) -> Result<Self, ControlError> {
            let server = ServerOptions::new()
                .first_pipe_instance(true)
                .create(endpoint.pipe_name())
                .map_err(|e| {
                    if e.kind() == io::ErrorKind::PermissionDenied {
                        ControlError::already_listening(endpoint.to_string())
                    } else {
                        ControlError::io(endpoint.to_string(), e.to_string())
                    }
                })?;

            debug!("Control endpoint listening on {}", endpoint);
            Ok(Self { endpoint, server })
        }

        pub fn endpoint(&self) -> &ControlEndpoint {
            &self.endpoint
        }

        /// Accept clients until the future is dropped.
        pub async fn serve(self, stop: StopHandle) {
            let endpoint = self.endpoint.to_string();
            let pipe_name = self.endpoint.pipe_name();
            let mut server = self.server;

            loop {
                if let Err(e) = server.connect().await {
                    warn!("Failed to accept control connection on {}: {}", endpoint, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }

                // Put up the next pipe instance before handing this one off.
                let connected = server;
                server = match ServerOptions::new().create(&pipe_name) {
                    Ok(next) => next,
                    Err(e) => {
                        warn!("Control endpoint {} stopped accepting: {}", endpoint, e);
                        return;
                    }
                };

                let stop = stop.clone();
                let endpoint = endpoint.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(connected, &stop, &endpoint).await {
                        warn!("Control connection failed: {}", e);
                    }
                });
            }
        }
    }
}

use transport::connect;
pub use transport::ControlListener;
