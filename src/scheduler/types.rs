//! Scheduler type definitions
//!
//! Task handles as the kernel hands them to policy hooks, the CPU affinity
//! bitmap, hook flag words, and the per-task-group statistics record.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

/// Process / task-group identifier
pub type Pid = u32;

/// Length of the process name buffer, terminator included
pub const TASK_COMM_LEN: usize = 40;

/// Widest CPU id space a [`CpuMask`] can describe
pub const MAX_CPUS: usize = 256;

const MASK_WORDS: usize = MAX_CPUS / 64;

/// Default slice of the extensible scheduler class (20ms)
pub const SCX_SLICE_DFL: u64 = 20_000_000;

/// Scheduling weight of a nice-0 task
pub const DEFAULT_WEIGHT: u32 = 100;
pub const MIN_WEIGHT: u32 = 1;
pub const MAX_WEIGHT: u32 = 10_000;

/// Id of the one shared dispatch queue every policy uses
pub const SHARED_DSQ_ID: u64 = 0;

bitflags! {
    /// Per-task flags relevant to policy decisions
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TaskFlags: u32 {
        /// Kernel housekeeping thread
        const KTHREAD = 1 << 21;
    }
}

bitflags! {
    /// Flags passed to `enqueue` and to local-slot moves
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EnqueueFlags: u64 {
        /// Task is becoming runnable after a sleep
        const WAKEUP = 1 << 0;
        /// Insert at the head of a FIFO queue
        const HEAD = 1 << 4;
        /// Target CPU's current occupant may be preempted
        const PREEMPT = 1 << 32;
    }
}

/// Fixed-length, NUL-terminated process name
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Comm([u8; TASK_COMM_LEN]);

impl Comm {
    pub const fn empty() -> Self {
        Self([0; TASK_COMM_LEN])
    }

    /// Copies at most `TASK_COMM_LEN - 1` bytes of `name`.
    pub fn new(name: &str) -> Self {
        let mut buf = [0u8; TASK_COMM_LEN];
        let len = name.len().min(TASK_COMM_LEN - 1);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(TASK_COMM_LEN);
        &self.0[..end]
    }

    /// Name as text; a multi-byte character cut by truncation is dropped.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl Default for Comm {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for Comm {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU affinity bitmap (bit per CPU id)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuMask {
    bits: [u64; MASK_WORDS],
}

impl CpuMask {
    pub const fn empty() -> Self {
        Self {
            bits: [0; MASK_WORDS],
        }
    }

    /// Mask holding CPUs `0..n`, clamped to [`MAX_CPUS`].
    pub fn first_n(n: u32) -> Self {
        let mut mask = Self::empty();
        let n = (n as usize).min(MAX_CPUS);
        for word in 0..MASK_WORDS {
            let lo = word * 64;
            if n >= lo + 64 {
                mask.bits[word] = u64::MAX;
            } else if n > lo {
                mask.bits[word] = (1u64 << (n - lo)) - 1;
            }
        }
        mask
    }

    pub fn single(cpu: u32) -> Self {
        let mut mask = Self::empty();
        mask.set(cpu);
        mask
    }

    #[inline]
    pub fn test(&self, cpu: u32) -> bool {
        let cpu = cpu as usize;
        cpu < MAX_CPUS && self.bits[cpu / 64] & (1 << (cpu % 64)) != 0
    }

    /// Out-of-range ids are ignored.
    #[inline]
    pub fn set(&mut self, cpu: u32) {
        let cpu = cpu as usize;
        if cpu < MAX_CPUS {
            self.bits[cpu / 64] |= 1 << (cpu % 64);
        }
    }

    #[inline]
    pub fn clear(&mut self, cpu: u32) {
        let cpu = cpu as usize;
        if cpu < MAX_CPUS {
            self.bits[cpu / 64] &= !(1 << (cpu % 64));
        }
    }

    /// Number of CPUs in the mask
    pub fn weight(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..MAX_CPUS as u32).filter(move |&cpu| self.test(cpu))
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Task handle shared between the kernel, dispatch queues and hooks
pub type TaskRef = Arc<Task>;

/// The view of a kernel task a policy hook gets to see
pub struct Task {
    pub pid: Pid,
    pub tgid: Pid,
    pub comm: Comm,
    pub flags: TaskFlags,
    pub cpus_allowed: CpuMask,
    pub weight: u32, // 1..=10000, 100 for nice 0
    dsq_vtime: AtomicU64,
}

impl Task {
    /// A single-threaded user task allowed on `cpus_allowed`.
    pub fn new(pid: Pid, comm: &str, cpus_allowed: CpuMask) -> Self {
        Self {
            pid,
            tgid: pid,
            comm: Comm::new(comm),
            flags: TaskFlags::empty(),
            cpus_allowed,
            weight: DEFAULT_WEIGHT,
            dsq_vtime: AtomicU64::new(0),
        }
    }

    pub fn with_tgid(mut self, tgid: Pid) -> Self {
        self.tgid = tgid;
        self
    }

    pub fn with_flags(mut self, flags: TaskFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.clamp(MIN_WEIGHT, MAX_WEIGHT);
        self
    }

    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }

    #[inline]
    pub fn is_kthread(&self) -> bool {
        self.flags.contains(TaskFlags::KTHREAD)
    }

    #[inline]
    pub fn nr_cpus_allowed(&self) -> u32 {
        self.cpus_allowed.weight()
    }

    /// Virtual time used to order vtime queues. Written racily by hooks.
    #[inline]
    pub fn dsq_vtime(&self) -> u64 {
        self.dsq_vtime.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_dsq_vtime(&self, vtime: u64) {
        self.dsq_vtime.store(vtime, Ordering::Relaxed);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("tgid", &self.tgid)
            .field("comm", &self.comm)
            .field("flags", &self.flags)
            .field("nr_cpus_allowed", &self.nr_cpus_allowed())
            .field("weight", &self.weight)
            .field("dsq_vtime", &self.dsq_vtime())
            .finish()
    }
}

/// Per-task-group counters kept in the statistics table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskStat {
    pub comm: Comm,
    pub dispatches: u64,    // times the group was put on a CPU
    pub runtime_ns: u64,    // accumulated running time
    pub running: bool,      // between `running` and the matching `stopping`
    pub last_start_ns: u64, // timestamp of the last `running`
    pub ignored: bool,      // exempt from the core limit when first seen
}

impl TaskStat {
    /// Zeroed record for a group first observed through `task`.
    pub fn first_seen(task: &Task, ignored: bool) -> Self {
        Self {
            comm: task.comm,
            ignored,
            ..Self::default()
        }
    }
}

impl fmt::Display for TaskStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stat{{{}, runtime {}ns, dispatches {}",
            self.comm, self.runtime_ns, self.dispatches
        )?;
        if self.running {
            f.write_str(", running")?;
        }
        if self.ignored {
            f.write_str(", ignored")?;
        }
        f.write_str("}")
    }
}
