// ABOUTME: Stand-in ssh and scp executables for shell backend tests.
// ABOUTME: They log their arguments and run the "remote" command on the local machine.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Login shell the fake remote host pretends to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteShell {
    Posix,
    Fish,
}

const SSH_POSIX: &str = r#"#!/bin/sh
log="$(dirname "$0")/ssh.log"
for arg in "$@"; do printf '%s\n' "$arg" >> "$log"; done
printf -- '--\n' >> "$log"
for last in "$@"; do :; done
exec /bin/sh -c "$last"
"#;

const SSH_FISH: &str = r#"#!/bin/sh
log="$(dirname "$0")/ssh.log"
for arg in "$@"; do printf '%s\n' "$arg" >> "$log"; done
printf -- '--\n' >> "$log"
for last in "$@"; do :; done
case "$last" in
  *"||"*|*"&&"*)
    echo "fish: Unsupported use of '||'. In fish, please use 'COMMAND; or COMMAND'." >&2
    exit 127
    ;;
esac
exec /bin/sh -c "$last"
"#;

const SCP: &str = r#"#!/bin/sh
log="$(dirname "$0")/scp.log"
for arg in "$@"; do printf '%s\n' "$arg" >> "$log"; done
printf -- '--\n' >> "$log"
src=""
last=""
for arg in "$@"; do src="$last"; last="$arg"; done
dst="${last#*:}"
# Local and "remote" temp directories can coincide.
[ "$src" -ef "$dst" ] && exit 0
exec cp "$src" "$dst"
"#;

pub struct FakeTools {
    dir: TempDir,
}

impl FakeTools {
    pub fn new(shell: RemoteShell) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ssh = match shell {
            RemoteShell::Posix => SSH_POSIX,
            RemoteShell::Fish => SSH_FISH,
        };
        write_executable(&dir.path().join("ssh"), ssh);
        write_executable(&dir.path().join("scp"), SCP);
        Self { dir }
    }

    pub fn ssh(&self) -> PathBuf {
        self.dir.path().join("ssh")
    }

    pub fn scp(&self) -> PathBuf {
        self.dir.path().join("scp")
    }

    /// Arguments of every ssh invocation so far.
    pub fn ssh_calls(&self) -> Vec<Vec<String>> {
        read_log(&self.dir.path().join("ssh.log"))
    }

    /// Arguments of every scp invocation so far.
    pub fn scp_calls(&self) -> Vec<Vec<String>> {
        read_log(&self.dir.path().join("scp.log"))
    }
}

fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn read_log(path: &Path) -> Vec<Vec<String>> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut calls = Vec::new();
    let mut current = Vec::new();
    for line in content.lines() {
        if line == "--" {
            calls.push(std::mem::take(&mut current));
        } else {
            current.push(line.to_string());
        }
    }
    calls
}
