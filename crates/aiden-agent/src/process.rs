//! Signal delivery to agent processes.

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe { libc::kill(pid, signal) == 0 }
}

/// SIGSTOP. Always false where job-control signals do not exist.
pub fn pause_process(pid: u32) -> bool {
    #[cfg(unix)]
    {
        send_signal(pid, libc::SIGSTOP)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// SIGCONT.
pub fn resume_process(pid: u32) -> bool {
    #[cfg(unix)]
    {
        send_signal(pid, libc::SIGCONT)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// SIGTERM. The caller escalates to a hard kill if the process lingers.
pub fn terminate_process(pid: u32) -> bool {
    #[cfg(unix)]
    {
        send_signal(pid, libc::SIGTERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

pub fn supports_job_control() -> bool {
    cfg!(unix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn signals_to_missing_pid_fail() {
        assert!(!resume_process(99_999_999));
        assert!(!terminate_process(99_999_999));
        assert!(!pause_process(99_999_999));
    }

    #[test]
    #[cfg(unix)]
    fn stop_continue_and_terminate_a_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id();

        assert!(pause_process(pid));
        assert!(resume_process(pid));
        assert!(terminate_process(pid));

        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
