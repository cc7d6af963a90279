//! PTY process management.

use crate::process::{CommandSpec, Process};
use crate::types::TermSize;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{ErrorKind, Read, Write};

/// Shell used when neither the command nor `SHELL` names one.
const FALLBACK_SHELL: &str = "/bin/sh";

/// Child process running on a native pseudo-terminal.
///
/// Reader, writer and child live behind separate locks so a blocking read on
/// the reader thread never stalls input or a resize.
pub struct PtyProcess {
    master: Mutex<Box<dyn MasterPty + Send>>,
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    exit_code: Mutex<Option<i32>>,
}

impl PtyProcess {
    /// Spawn `command` on a new PTY of the given size.
    ///
    /// An empty argv runs the user's shell from `SHELL`.
    pub fn spawn(command: &CommandSpec, size: TermSize, term: &str) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(size))
            .context("Failed to open PTY")?;

        let mut cmd = match command.argv.split_first() {
            Some((program, args)) => {
                let mut cmd = CommandBuilder::new(program);
                cmd.args(args);
                cmd
            }
            None => {
                let shell = std::env::var("SHELL").unwrap_or_else(|_| FALLBACK_SHELL.to_string());
                CommandBuilder::new(shell)
            }
        };
        cmd.env("TERM", term);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &command.cwd {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {:?}", command.argv))?;
        // The master only sees EOF once every slave handle is closed.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        tracing::debug!(pid = ?child.process_id(), size = %size, "Spawned PTY process");

        Ok(Self {
            master: Mutex::new(pair.master),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            exit_code: Mutex::new(None),
        })
    }

    /// Reap the child if it has exited, caching its exit code.
    fn poll_exit(&self) -> Option<i32> {
        let mut exit_code = self.exit_code.lock();
        if exit_code.is_none() {
            match self.child.lock().try_wait() {
                Ok(Some(status)) => *exit_code = Some(status.exit_code() as i32),
                Ok(None) => {}
                Err(e) => tracing::debug!("Poll child process: {}", e),
            }
        }
        *exit_code
    }
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl Process for PtyProcess {
    fn read(&self, max_bytes: usize) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes.max(1)];
        match self.reader.lock().read(&mut buf) {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some(buf)
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Some(Vec::new()),
            // Linux reports EIO once the slave side is gone.
            Err(e) => {
                tracing::debug!("PTY read ended: {}", e);
                None
            }
        }
    }

    fn write(&self, data: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(data.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn set_window_size(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .lock()
            .resize(pty_size(TermSize::new(rows, cols)))
            .context("Failed to resize PTY")?;
        Ok(())
    }

    fn terminate(&self, force: bool) -> Result<()> {
        if self.poll_exit().is_some() {
            return Ok(());
        }

        let reaped = {
            let mut child = self.child.lock();
            // SIGHUP first, escalating to SIGKILL after a short grace period.
            child.kill().context("Failed to kill child process")?;
            if force {
                Some(child.wait().context("Failed to reap child process")?)
            } else {
                None
            }
        };
        match reaped {
            Some(status) => *self.exit_code.lock() = Some(status.exit_code() as i32),
            None => {
                self.poll_exit();
            }
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.poll_exit().is_none()
    }

    fn exit_status(&self) -> Option<i32> {
        self.poll_exit()
    }
}
