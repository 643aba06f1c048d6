//! Real-time scheduling helpers (Linux SCHED_FIFO + mlockall).

#[cfg(target_os = "linux")]
pub fn setup_rt_once() {
    use libc::{mlockall, sched_param, sched_setscheduler, MCL_CURRENT, MCL_FUTURE, SCHED_FIFO};
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        // lock pages so the control loop never faults mid-tick
        let rc = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
        if rc != 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "mlockall failed; continuing without memory locking"
            );
        }

        let param = sched_param { sched_priority: 40 };
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "SCHED_FIFO unavailable; running with the default scheduler"
            );
        } else {
            tracing::info!(priority = 40, "SCHED_FIFO enabled for the control loop");
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once() {
    tracing::warn!("real-time setup is only implemented on Linux");
}
