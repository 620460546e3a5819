//! Non-signal PID liveness probe.

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// `kill(pid, None)` delivers no signal; it only checks permission/existence.
pub fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn pid_one_followed_by_an_implausible_pid_is_not_alive() {
        // A PID far beyond any plausible live process on a typical system.
        assert!(!is_alive(u32::MAX - 1));
    }
}
