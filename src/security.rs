#![forbid(unsafe_code)]

//! Shared security helpers used by the mediagrab binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to run a binary as root. Fetched files land wherever the spool
/// root points, and yt-dlp executes with the process privileges, so a
/// misconfigured root install could scribble over system paths.
pub fn ensure_not_root(process: &str) -> Result<()> {
    check_uid(Uid::current(), process)
}

fn check_uid(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("refusing to run {process} as root; start it as an unprivileged user");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_uid_passes() {
        assert!(check_uid(Uid::from_raw(1000), "tester").is_ok());
    }

    #[test]
    fn root_uid_is_refused() {
        let err = check_uid(Uid::from_raw(0), "tester").unwrap_err();
        assert!(err.to_string().contains("as root"));
    }
}
