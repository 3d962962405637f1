//! PTY (Pseudo-Terminal) handling with portable-pty.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use ptyprobe_core::{Error, Result, TargetSettings, TimingSettings};

use crate::terminal::{Drained, Terminal};

/// How long to wait for the child to be reaped after SIGKILL.
const REAP_TIMEOUT: Duration = Duration::from_secs(1);
const REAP_POLL: Duration = Duration::from_millis(10);

/// Handle to a spawned PTY process.
pub struct PtyHandle {
    /// The master PTY end; dropping it closes the terminal
    master: Box<dyn MasterPty + Send>,
    /// Raw master descriptor used for readiness checks
    master_fd: RawFd,
    /// Reader on the master (non-blocking)
    reader: Box<dyn Read + Send>,
    /// Writer on the master
    writer: Box<dyn Write + Send>,
    /// The child process (None if it failed to start or was killed)
    child: Option<Box<dyn Child + Send + Sync>>,
    /// Program that was launched
    program: String,
    /// Bound on each readiness wait
    poll_timeout: Duration,
    /// Scratch buffer, one read chunk long
    chunk: Vec<u8>,
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("program", &self.program)
            .field("master_fd", &self.master_fd)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl PtyHandle {
    /// Spawn the target program on a new PTY.
    ///
    /// The child becomes a session leader with the PTY slave as its
    /// controlling terminal and `TERM` set from `target.term`. The rest of
    /// the environment is inherited unchanged.
    ///
    /// Failing to create the PTY is an error. Failing to start the program is
    /// not: the handle is still returned, without a child, and its stream
    /// reads as ended from the first drain.
    ///
    /// # Example
    /// ```no_run
    /// use ptyprobe_core::ProbeConfig;
    /// use ptyprobe_session::{PtyHandle, Terminal};
    ///
    /// # fn example() -> ptyprobe_core::Result<()> {
    /// let config = ProbeConfig::default();
    /// let pty = PtyHandle::spawn(&config.target, &config.timing)?;
    /// println!("pid {:?}", pty.pid());
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(target: &TargetSettings, timing: &TimingSettings) -> Result<Self> {
        info!(
            "Spawning PTY: program='{}' args={:?}, dimensions={}x{}, TERM={}",
            target.program, target.args, target.rows, target.cols, target.term
        );

        let pty_system = native_pty_system();

        let pty_size = PtySize {
            rows: target.rows,
            cols: target.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        debug!("Opening PTY with native system");
        let pair = pty_system.openpty(pty_size).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::Pty(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = CommandBuilder::new(&target.program);
        for arg in &target.args {
            cmd.arg(arg);
        }
        cmd.env("TERM", &target.term);

        // portable-pty would otherwise start the child in $HOME.
        let cwd = target
            .working_directory
            .clone()
            .or_else(|| std::env::current_dir().ok());
        if let Some(dir) = cwd {
            debug!("Setting working directory to: {}", dir.display());
            cmd.cwd(dir);
        }

        let child = match pair.slave.spawn_command(cmd) {
            Ok(child) => Some(child),
            Err(e) => {
                let err = Error::Spawn {
                    program: target.program.clone(),
                    reason: e.to_string(),
                };
                error!("{}; the session will capture no output", err);
                None
            }
        };
        // The slave is dropped here so the master sees EOF when the child exits.
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(|e| {
            error!("Failed to take PTY writer: {}", e);
            Error::Pty(format!("Failed to take writer: {e}"))
        })?;

        let reader = pair.master.try_clone_reader().map_err(|e| {
            error!("Failed to clone PTY reader: {}", e);
            Error::Pty(format!("Failed to clone reader: {e}"))
        })?;

        let master_fd = pair
            .master
            .as_raw_fd()
            .ok_or_else(|| Error::Pty("PTY master has no file descriptor".to_string()))?;

        // O_NONBLOCK lives on the open file description, so the cloned
        // reader shares it.
        set_nonblocking(master_fd)?;
        debug!("Set master PTY FD {} to non-blocking mode", master_fd);

        let handle = Self {
            master: pair.master,
            master_fd,
            reader,
            writer,
            child,
            program: target.program.clone(),
            poll_timeout: timing.poll_timeout(),
            chunk: vec![0u8; timing.read_chunk_size],
        };

        if let Some(pid) = handle.pid() {
            info!("PTY spawned successfully: program='{}' pid={}", handle.program, pid);
        }

        Ok(handle)
    }

    /// Program this handle launched (as configured).
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether a child process was started and has not been killed.
    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    /// Check if the child process is still running.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }

    /// Current size reported by the PTY.
    pub fn size(&self) -> Result<PtySize> {
        self.master
            .get_size()
            .map_err(|e| Error::Pty(format!("Failed to get size: {e}")))
    }

    /// Wait until the master is readable (or hung up) for at most `timeout`.
    fn wait_readable(&self, timeout: Duration) -> bool {
        poll_readable(self.master_fd, timeout)
    }

    /// One read of at most a chunk, appended to `collected`.
    fn read_once(&mut self, collected: &mut Vec<u8>) -> ReadStep {
        loop {
            match self.reader.read(&mut self.chunk) {
                Ok(0) => return ReadStep::Ended,
                Ok(n) => {
                    collected.extend_from_slice(&self.chunk[..n]);
                    return ReadStep::Data;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadStep::Empty,
                Err(e) => {
                    // EIO once the slave side is gone.
                    debug!("PTY read ended: {}", e);
                    return ReadStep::Ended;
                }
            }
        }
    }

    fn reap(child: &mut Box<dyn Child + Send + Sync>) {
        let started = Instant::now();
        while started.elapsed() < REAP_TIMEOUT {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Child reaped: {:?}", status);
                    return;
                }
                Ok(None) => std::thread::sleep(REAP_POLL),
                Err(e) => {
                    debug!("Error waiting for child: {}", e);
                    return;
                }
            }
        }
        warn!("Child not reaped within {:?}", REAP_TIMEOUT);
    }
}

enum ReadStep {
    Data,
    Empty,
    Ended,
}

impl Terminal for PtyHandle {
    fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.process_id())
    }

    fn drain_available(&mut self, deadline: Instant) -> Drained {
        if !self.wait_readable(self.poll_timeout) {
            return Drained::Idle;
        }

        let mut collected = Vec::new();
        loop {
            match self.read_once(&mut collected) {
                ReadStep::Ended => return Drained::Ended(collected),
                ReadStep::Empty => break,
                ReadStep::Data => {}
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = self
                .poll_timeout
                .min(deadline.saturating_duration_since(now));
            if !self.wait_readable(wait) {
                break;
            }
        }

        if collected.is_empty() {
            Drained::Idle
        } else {
            debug!("Read {} bytes from PTY", collected.len());
            Drained::Output(collected)
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        debug!("Writing {} bytes to PTY", data.len());
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(data.len())
    }

    fn kill(&mut self) {
        let Some(mut child) = self.child.take() else {
            debug!("No child to kill");
            return;
        };

        match child.process_id() {
            Some(pid) => {
                info!("Killing PTY process: pid={}", pid);
                // SAFETY: plain syscall on a pid we spawned; ESRCH is fine.
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
                if rc != 0 {
                    debug!(
                        "kill({}, SIGKILL) failed: {}",
                        pid,
                        io::Error::last_os_error()
                    );
                }
            }
            None => {
                if let Err(e) = child.kill() {
                    debug!("Kill failed: {}", e);
                }
            }
        }

        Self::reap(&mut child);
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.kill();
        }
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    // SAFETY: fcntl on a descriptor owned by the master PTY.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags == -1 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            let err = io::Error::last_os_error();
            error!("Failed to set master PTY to non-blocking mode: {}", err);
            return Err(Error::Pty(format!("Failed to set O_NONBLOCK: {err}")));
        }
    }
    Ok(())
}

/// `poll(2)` for readability. Hang-up and error conditions count as readable
/// so the following read reports them.
fn poll_readable(fd: RawFd, timeout: Duration) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    loop {
        // SAFETY: one valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            debug!("poll failed: {}", err);
            return false;
        }
        return rc > 0 && pfd.revents != 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> TargetSettings {
        TargetSettings {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..TargetSettings::default()
        }
    }

    fn fast_timing() -> TimingSettings {
        TimingSettings {
            poll_timeout_ms: 50,
            ..TimingSettings::default()
        }
    }

    /// Drain until `want` shows up, the stream ends, or `limit` passes.
    fn drain_for(pty: &mut PtyHandle, limit: Duration, want: &[u8]) -> (Vec<u8>, bool) {
        let deadline = Instant::now() + limit;
        let mut out = Vec::new();
        while Instant::now() < deadline {
            let drained = pty.drain_available(deadline);
            let ended = drained.is_ended();
            out.extend(drained.into_bytes());
            if ended {
                return (out, true);
            }
            if !want.is_empty() && memchr::memmem::find(&out, want).is_some() {
                break;
            }
        }
        (out, false)
    }

    #[test]
    fn test_pty_spawn() {
        let mut pty = PtyHandle::spawn(&sh("sleep 5"), &fast_timing()).unwrap();
        assert!(pty.pid().is_some());
        assert!(pty.is_alive());
        pty.kill();
    }

    #[test]
    fn test_pty_dimensions() {
        let target = TargetSettings {
            rows: 30,
            cols: 100,
            ..sh("sleep 5")
        };
        let mut pty = PtyHandle::spawn(&target, &fast_timing()).unwrap();

        let size = pty.size().unwrap();
        assert_eq!(size.rows, 30);
        assert_eq!(size.cols, 100);
        pty.kill();
    }

    #[test]
    fn test_term_is_set() {
        let mut pty = PtyHandle::spawn(&sh("echo \"term=$TERM\"; sleep 5"), &fast_timing()).unwrap();
        let (out, _) = drain_for(&mut pty, Duration::from_secs(3), b"term=xterm-256color");
        assert!(
            String::from_utf8_lossy(&out).contains("term=xterm-256color"),
            "unexpected output: {:?}",
            String::from_utf8_lossy(&out)
        );
        pty.kill();
    }

    #[test]
    fn test_idle_drain_respects_poll_bound() {
        let mut pty = PtyHandle::spawn(&sh("sleep 5"), &fast_timing()).unwrap();
        // Let any startup output pass.
        drain_for(&mut pty, Duration::from_millis(200), b"");

        let started = Instant::now();
        let drained = pty.drain_available(Instant::now() + Duration::from_secs(5));
        assert_eq!(drained, Drained::Idle);
        assert!(started.elapsed() < Duration::from_millis(500));
        pty.kill();
    }

    #[test]
    fn test_pty_write_and_read() {
        let mut pty =
            PtyHandle::spawn(&sh("read line; echo \"got:$line\"; sleep 5"), &fast_timing()).unwrap();

        pty.write(b"/stats\r").unwrap();

        let (out, _) = drain_for(&mut pty, Duration::from_secs(3), b"got:/stats");
        assert!(String::from_utf8_lossy(&out).contains("got:/stats"));
        pty.kill();
    }

    #[test]
    fn test_exited_child_reads_as_ended() {
        let mut pty = PtyHandle::spawn(&sh("printf bye"), &fast_timing()).unwrap();

        let (out, ended) = drain_for(&mut pty, Duration::from_secs(3), b"");
        assert!(ended, "stream should end once the child exits");
        assert_eq!(out, b"bye");

        // Further drains stay ended and never panic.
        let again = pty.drain_available(Instant::now() + Duration::from_millis(100));
        assert!(again.is_ended() || again == Drained::Idle);
        pty.kill();
    }

    #[test]
    fn test_missing_program_is_not_fatal() {
        let target = TargetSettings {
            program: "/nonexistent/ptyprobe-target".to_string(),
            ..TargetSettings::default()
        };
        let mut pty = PtyHandle::spawn(&target, &fast_timing()).unwrap();
        assert!(pty.pid().is_none());
        assert!(!pty.is_alive());

        let (out, _) = drain_for(&mut pty, Duration::from_millis(300), b"");
        assert!(out.is_empty());
        pty.kill();
    }

    #[test]
    fn test_pty_kill() {
        let mut pty = PtyHandle::spawn(&sh("sleep 30"), &fast_timing()).unwrap();
        assert!(pty.is_alive());

        pty.kill();
        assert!(!pty.has_child());
        assert!(!pty.is_alive());
    }

    #[test]
    fn test_kill_after_exit_is_silent() {
        let mut pty = PtyHandle::spawn(&sh("exit 0"), &fast_timing()).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        pty.kill();
        pty.kill();
        assert!(!pty.has_child());
    }
}
