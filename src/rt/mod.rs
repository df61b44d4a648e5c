use libc::{sched_param, sched_setscheduler, SCHED_FIFO};

#[derive(Debug, thiserror::Error)]
pub enum RtError {
    #[error("permission denied to set real-time priority")]
    PermissionDenied,
    #[error("CPU {0} is out of range")]
    InvalidCpu(usize),
    #[error("{call} failed: {source}")]
    Os {
        call: &'static str,
        source: std::io::Error,
    },
}

/// Priority used for the transfer thread. 99 is the top; audio sits a bit below.
pub const TRANSFER_PRIORITY: i32 = 90;

pub fn set_realtime_priority(priority: i32) -> Result<(), RtError> {
    let param = sched_param {
        sched_priority: priority,
    };

    let result = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };

    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(match err.raw_os_error() {
            Some(libc::EPERM) => RtError::PermissionDenied,
            _ => RtError::Os {
                call: "sched_setscheduler",
                source: err,
            },
        });
    }
    Ok(())
}

pub fn pin_to_cpu(core_id: usize) -> Result<(), RtError> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET};

    if core_id >= libc::CPU_SETSIZE as usize {
        return Err(RtError::InvalidCpu(core_id));
    }

    let mut set: cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe { CPU_SET(core_id, &mut set) };

    let result = unsafe { sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &set) };
    if result != 0 {
        return Err(RtError::Os {
            call: "sched_setaffinity",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Keeps transfer buffers out of swap.
pub fn lock_memory() -> Result<(), RtError> {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    // Raising the limit needs privileges; mlockall reports what matters.
    unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };

    let result = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if result != 0 {
        return Err(RtError::Os {
            call: "mlockall",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}
