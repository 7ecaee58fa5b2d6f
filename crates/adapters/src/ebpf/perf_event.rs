//! Perf events of tracepoint type, used as BPF attachment anchors.
//!
//! For each trace event created for a hook we open one perf event bound
//! to its id, enable it, and point it at the BPF program. Descriptors
//! stay open for the probe's lifetime and are disabled and closed in
//! teardown.

#![allow(unsafe_code)] // perf_event_open(2) and its ioctls

use std::io;
use std::os::fd::RawFd;

use anyhow::Context;
use tracing::debug;

const PERF_TYPE_TRACEPOINT: u32 = 2;
const PERF_SAMPLE_RAW: u64 = 1 << 10;
const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

// _IO('$', 0), _IO('$', 1), _IOW('$', 8, __u32).
const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;
const PERF_EVENT_IOC_DISABLE: libc::c_ulong = 0x2401;
const PERF_EVENT_IOC_SET_BPF: libc::c_ulong = 0x4004_2408;

/// `struct perf_event_attr`, PERF_ATTR_SIZE_VER6 layout. Only the
/// leading fields are populated; the kernel accepts any published size.
#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)] // trailing fields exist only to give the kernel the full ABI
struct PerfEventAttr {
    type_: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
    config2: u64,
    branch_sample_type: u64,
    sample_regs_user: u64,
    sample_stack_user: u32,
    clockid: i32,
    sample_regs_intr: u64,
    aux_watermark: u32,
    sample_max_stack: u16,
    reserved_2: u16,
    aux_sample_size: u32,
    reserved_3: u32,
}

/// Open perf event descriptors of one probe.
#[derive(Default)]
pub struct PerfEvents {
    fds: Vec<RawFd>,
}

impl PerfEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Open a perf event on tracepoint `trace_id`, enable it and attach
    /// the BPF program behind `prog_fd` to it.
    pub fn open_attach(&mut self, trace_id: u64, prog_fd: RawFd) -> anyhow::Result<()> {
        let mut attr: PerfEventAttr = unsafe { std::mem::zeroed() };
        attr.type_ = PERF_TYPE_TRACEPOINT;
        attr.size = std::mem::size_of::<PerfEventAttr>() as u32;
        attr.config = trace_id;
        attr.sample_period = 1;
        attr.sample_type = PERF_SAMPLE_RAW;
        attr.wakeup_events = 1;

        // All processes, CPU 0: the fd is only the attachment anchor,
        // the program itself runs wherever the tracepoint fires.
        let fd = unsafe {
            libc::syscall(
                libc::SYS_perf_event_open,
                &attr as *const PerfEventAttr,
                -1 as libc::pid_t,
                0 as libc::c_int,
                -1 as libc::c_int,
                PERF_FLAG_FD_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error()).context("perf_event_open");
        }
        let fd = fd as RawFd;
        // Track immediately so a failed ioctl still closes the fd later.
        self.fds.push(fd);

        ioctl(fd, PERF_EVENT_IOC_ENABLE, 0).context("enabling perf event")?;
        ioctl(fd, PERF_EVENT_IOC_SET_BPF, prog_fd as libc::c_ulong)
            .context("attaching BPF program to perf event")?;

        debug!(trace_id, perf_fd = fd, prog_fd, "perf event attached");
        Ok(())
    }

    /// Disable and close every descriptor, reverse of open order.
    pub fn close_all(&mut self) -> anyhow::Result<()> {
        while let Some(fd) = self.fds.pop() {
            ioctl(fd, PERF_EVENT_IOC_DISABLE, 0).context("disabling perf event")?;
            let rc = unsafe { libc::close(fd) };
            if rc != 0 {
                return Err(io::Error::last_os_error()).context("closing perf event fd");
            }
        }
        Ok(())
    }
}

fn ioctl(fd: RawFd, request: libc::c_ulong, arg: libc::c_ulong) -> io::Result<()> {
    let rc = unsafe { libc::ioctl(fd, request, arg) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
