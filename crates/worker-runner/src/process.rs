//! Subprocess resource discipline: every spawned child runs in its own
//! process group (POSIX) so a signal-induced teardown can kill the whole
//! tree at once; on Windows the child is terminated directly since this
//! worker does not yet assign it to a job object.

use std::process::Stdio;

use tokio::process::{Child, Command};

/// A spawned child that can be torn down as a group.
pub struct GroupChild {
    child: Child,
    #[cfg(unix)]
    pgid: i32,
}

/// Spawns `program` with `args`, placing it in its own process group on
/// POSIX so `kill_group` can reap the whole tree in one call.
pub fn spawn_group(program: &str, args: &[String], cwd: &std::path::Path) -> std::io::Result<GroupChild> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt as _;
        command.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn()?;
    #[cfg(unix)]
    let pgid = child.id().map(|pid| pid as i32).unwrap_or(0);

    Ok(GroupChild {
        child,
        #[cfg(unix)]
        pgid,
    })
}

impl GroupChild {
    pub fn stdout(&mut self) -> Option<tokio::process::ChildStdout> {
        self.child.stdout.take()
    }

    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Kills the whole process group on POSIX (`kill(-pgid, SIGKILL)`); on
    /// Windows kills only the direct child, since job-object support is not
    /// implemented here.
    pub fn kill_group(&mut self) {
        #[cfg(unix)]
        {
            if self.pgid > 0 {
                unsafe {
                    libc::kill(-self.pgid, libc::SIGKILL);
                }
                return;
            }
        }
        let _ = self.child.start_kill();
    }
}
