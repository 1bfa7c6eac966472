use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, error, info, trace, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

use super::types::{EngineError, EngineResult};

/// Grace period between `quit` and a forced kill
const ENGINE_QUIT_GRACE: Duration = Duration::from_millis(500);

/// Line-oriented connection to an engine
///
/// Commands are written into `commands` without waiting for the engine;
/// every line the engine prints arrives on `lines` in order. `process` is
/// present when the other end is a real child process.
#[derive(Debug)]
pub struct EngineTransport {
    pub commands: mpsc::UnboundedSender<String>,
    pub lines: mpsc::UnboundedReceiver<String>,
    pub process: Option<EngineProcess>,
}

/// Child engine process plus the tasks pumping its pipes
#[derive(Debug)]
pub struct EngineProcess {
    path: PathBuf,
    child: Option<Child>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl EngineProcess {
    /// Spawn the engine at `path` and wire its pipes onto channels
    pub fn spawn(path: &Path) -> EngineResult<EngineTransport> {
        info!("Starting engine process: {:?}", path);

        let mut child = Self::spawn_engine_process(path)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            error!("Failed to get stdin handle from engine process");
            EngineError::NoStdin
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            error!("Failed to get stdout handle from engine process");
            EngineError::NoStdout
        })?;

        Self::spawn_stderr_handler(child.stderr.take());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(Self::write_commands(stdin, command_rx));
        let reader = tokio::spawn(Self::read_lines(stdout, line_tx));

        Ok(EngineTransport {
            commands: command_tx,
            lines: line_rx,
            process: Some(Self {
                path: path.to_path_buf(),
                child: Some(child),
                writer,
                reader,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait briefly for the engine to exit after `quit`, then force it
    pub async fn terminate(&mut self) {
        info!("Terminating engine process: {:?}", self.path);

        if let Some(mut child) = self.child.take() {
            match timeout(ENGINE_QUIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("Engine exited with status: {:?}", status),
                Ok(Err(e)) => warn!("Error waiting for engine process: {}", e),
                Err(_) => {
                    debug!("Engine ignored quit, killing process");
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill engine process: {}", e);
                    }
                }
            }
        }

        self.writer.abort();
        self.reader.abort();
    }

    // =============================================================================
    // Private Implementation
    // =============================================================================

    fn spawn_engine_process(path: &Path) -> EngineResult<Child> {
        debug!("Spawning engine process: {:?}", path);

        let mut command = Command::new(path);
        command.current_dir(path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new(".")));
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env("TERM", "dumb")
            .kill_on_drop(true);

        command.spawn().map_err(|e| {
            error!("Failed to spawn engine process {:?}: {}", path, e);
            EngineError::Io(e)
        })
    }

    async fn write_commands(mut stdin: ChildStdin, mut commands: mpsc::UnboundedReceiver<String>) {
        while let Some(command) = commands.recv().await {
            if let Err(e) = Self::write_command(&mut stdin, &command).await {
                error!("Failed to send command '{}': {}", command, e);
                break;
            }
        }
        trace!("Engine command writer finished");
    }

    async fn write_command(stdin: &mut ChildStdin, command: &str) -> EngineResult<()> {
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');

        stdin.write_all(line.as_bytes()).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset => EngineError::BrokenPipe,
            _ => EngineError::Io(e),
        })?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_lines(stdout: ChildStdout, lines: mpsc::UnboundedSender<String>) {
        let mut reader = BufReader::with_capacity(1024, stdout).lines();
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    if lines.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Engine stdout closed");
                    break;
                }
                Err(e) => {
                    error!("Error reading from engine stdout: {}", e);
                    break;
                }
            }
        }
    }

    fn spawn_stderr_handler(stderr: Option<ChildStderr>) {
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut stderr_lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = stderr_lines.next_line().await {
                    warn!("Engine stderr: {}", line);
                }
            });
        }
    }
}
