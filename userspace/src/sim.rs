//! Simulated kernel
//!
//! Runs a policy the way the extensible scheduler class would: one OS
//! thread per simulated CPU calls `dispatch` when its local slot is empty,
//! then `running`/`stopping` around a burst of the picked task, and
//! re-enqueues it either immediately (CPU-bound) or after a sleep
//! (interactive). All CPU threads share the policy context, so the hooks
//! race exactly as they would on real hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sonar_sched::scheduler::{
    CpuMask, DispatchQueue, DsqOrdering, DsqRegistry, Pid, TaskFlags, MAX_DSQS,
};
use sonar_sched::{
    EnqueueFlags, Policy, PolicyContext, PolicyKind, SchedOps, SchedResult, SchedRuntime,
    Settings, Task, TaskRef, TaskStat,
};

use crate::attach::Attachment;
use crate::config::SimConfig;
use crate::error::{Result, SonarError};
use crate::filter::ProcessEntry;

const IDLE_POLL: Duration = Duration::from_micros(200);
const SIM_ROOT_PID: Pid = 100;
const FIRST_TASK_PID: Pid = 1000;
const KTHREAD_PID: Pid = 2;

const NAMES: [&str; 6] = ["cruncher", "renderer", "indexer", "shell", "editor", "compiler"];

struct LocalSlot {
    task: TaskRef,
    slice_ns: u64,
}

/// Kernel services backed by the host
pub struct SimRuntime {
    start: Instant,
    nr_cpus: u32,
    dsqs: DsqRegistry,
    slots: Vec<Mutex<Option<LocalSlot>>>,
    rng: Mutex<StdRng>,
}

impl SimRuntime {
    pub fn new(nr_cpus: u32, seed: u64) -> Arc<Self> {
        Self::with_dsq_limit(nr_cpus, seed, MAX_DSQS)
    }

    pub fn with_dsq_limit(nr_cpus: u32, seed: u64, limit: usize) -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            nr_cpus,
            dsqs: DsqRegistry::with_limit(limit),
            slots: (0..nr_cpus).map(|_| Mutex::new(None)).collect(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    pub fn dsq_count(&self) -> usize {
        self.dsqs.len()
    }

    fn take_local(&self, cpu: u32) -> Option<LocalSlot> {
        self.slots.get(cpu as usize)?.lock().take()
    }
}

impl SchedRuntime for SimRuntime {
    fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn nr_cpu_ids(&self) -> u32 {
        self.nr_cpus
    }

    fn create_dsq(&self, id: u64, ordering: DsqOrdering) -> SchedResult<Arc<DispatchQueue>> {
        self.dsqs.create(id, ordering)
    }

    fn destroy_dsq(&self, id: u64) -> SchedResult<()> {
        self.dsqs.destroy(id)
    }

    fn move_to_local(&self, cpu: u32, task: &TaskRef, slice_ns: u64, _flags: EnqueueFlags) -> bool {
        let Some(slot) = self.slots.get(cpu as usize) else {
            return false;
        };
        let mut slot = slot.lock();
        // one task per local slot; the CPU thread empties it before dispatching again
        if slot.is_some() {
            return false;
        }
        *slot = Some(LocalSlot {
            task: Arc::clone(task),
            slice_ns,
        });
        true
    }

    fn prandom_u32(&self) -> u32 {
        self.rng.lock().gen()
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Uses the whole slice and is immediately runnable again
    CpuBound,
    /// Runs briefly, then sleeps
    Interactive { burst_ns: u64, sleep_ns: u64 },
}

struct Sleeper {
    wake_ns: u64,
    task: TaskRef,
}

/// State shared by the CPU threads
struct Shared {
    policy: Policy,
    ctx: PolicyContext,
    runtime: Arc<SimRuntime>,
    behavior: HashMap<Pid, Behavior>,
    sleepers: Mutex<Vec<Sleeper>>,
    live: AtomicBool,
}

impl Shared {
    fn wake_due(&self) {
        let now = self.runtime.now_ns();
        let due: Vec<TaskRef> = {
            let mut sleepers = self.sleepers.lock();
            let (due, waiting): (Vec<_>, Vec<_>) =
                sleepers.drain(..).partition(|s| s.wake_ns <= now);
            *sleepers = waiting;
            due.into_iter().map(|s| s.task).collect()
        };
        for task in due {
            self.policy.enqueue(&self.ctx, &task, EnqueueFlags::WAKEUP);
        }
    }

    fn cpu_loop(&self, cpu: u32) {
        let mut prev: Option<TaskRef> = None;
        while self.live.load(Ordering::Acquire) {
            self.wake_due();
            self.policy.dispatch(&self.ctx, cpu, prev.as_ref());

            let Some(slot) = self.runtime.take_local(cpu) else {
                thread::sleep(IDLE_POLL);
                continue;
            };

            let task = slot.task;
            let behavior = self
                .behavior
                .get(&task.pid)
                .copied()
                .unwrap_or(Behavior::CpuBound);
            let run_ns = match behavior {
                Behavior::CpuBound => slot.slice_ns,
                Behavior::Interactive { burst_ns, .. } => burst_ns.min(slot.slice_ns),
            };

            self.policy.running(&self.ctx, &task);
            thread::sleep(Duration::from_nanos(run_ns));
            self.policy.stopping(&self.ctx, &task, true);

            match behavior {
                Behavior::CpuBound => {
                    self.policy.enqueue(&self.ctx, &task, EnqueueFlags::empty());
                }
                Behavior::Interactive { sleep_ns, .. } => {
                    let wake_ns = self.runtime.now_ns().saturating_add(sleep_ns);
                    self.sleepers.lock().push(Sleeper {
                        wake_ns,
                        task: Arc::clone(&task),
                    });
                }
            }
            prev = Some(task);
        }
    }
}

/// A policy attached to the simulated kernel
pub struct SimAttachment {
    name: String,
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    processes: Vec<ProcessEntry>,
    detached: bool,
}

impl SimAttachment {
    pub fn attach(kind: PolicyKind, settings: Settings, sim: &SimConfig) -> Result<Self> {
        Self::attach_with_runtime(kind, settings, sim, SimRuntime::new(sim.cpus, sim.seed))
    }

    /// Initializes the policy on `runtime`, creates the synthetic workload
    /// and starts one thread per CPU. On error nothing keeps running.
    pub fn attach_with_runtime(
        kind: PolicyKind,
        settings: Settings,
        sim: &SimConfig,
        runtime: Arc<SimRuntime>,
    ) -> Result<Self> {
        let ctx = PolicyContext::new(runtime.clone(), settings);
        let policy = Policy::new(kind);
        policy.init(&ctx).map_err(SonarError::Attach)?;

        let workload = Workload::generate(sim, runtime.nr_cpu_ids());
        let shared = Arc::new(Shared {
            policy,
            ctx,
            runtime,
            behavior: workload.behavior,
            sleepers: Mutex::new(Vec::new()),
            live: AtomicBool::new(true),
        });

        for task in &workload.tasks {
            shared.policy.enable(&shared.ctx, task);
            shared.policy.enqueue(&shared.ctx, task, EnqueueFlags::WAKEUP);
        }

        let mut attachment = Self {
            name: shared.policy.name().to_string(),
            shared,
            threads: Vec::new(),
            processes: workload.processes,
            detached: false,
        };
        // a failed spawn drops `attachment`, which stops the threads already running
        for cpu in 0..sim.cpus {
            let shared = Arc::clone(&attachment.shared);
            let handle = thread::Builder::new()
                .name(format!("sim-cpu{}", cpu))
                .spawn(move || shared.cpu_loop(cpu))?;
            attachment.threads.push(handle);
        }

        log::info!(
            "attached {} to {} simulated cpus with {} tasks",
            attachment.name,
            sim.cpus,
            workload.tasks.len()
        );
        Ok(attachment)
    }

    pub fn context(&self) -> &PolicyContext {
        &self.shared.ctx
    }

    pub fn runtime(&self) -> &Arc<SimRuntime> {
        &self.shared.runtime
    }

    /// Process table of the synthetic workload
    pub fn processes(&self) -> Vec<ProcessEntry> {
        self.processes.clone()
    }
}

impl Attachment for SimAttachment {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_attached(&self) -> bool {
        !self.detached && self.shared.live.load(Ordering::Acquire) && self.shared.ctx.is_initialized()
    }

    fn task_stats(&self) -> Result<Vec<(Pid, TaskStat)>> {
        if self.detached {
            return Err(SonarError::Snapshot(format!("{} is detached", self.name)));
        }
        Ok(self.shared.ctx.stats().snapshot())
    }

    fn detach(&mut self) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        self.detached = true;
        self.shared.live.store(false, Ordering::Release);

        let mut failed = 0;
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("sim-cpu").to_string();
            if handle.join().is_err() {
                log::warn!("{} panicked before detach", name);
                failed += 1;
            }
        }

        self.shared.policy.exit(&self.shared.ctx);
        self.shared.sleepers.lock().clear();
        self.shared.ctx.stats().clear();
        log::info!("detached {}", self.name);

        if failed > 0 {
            return Err(SonarError::Detach(format!("{} cpu threads panicked", failed)));
        }
        Ok(())
    }
}

impl Drop for SimAttachment {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            log::warn!("{}", e);
        }
    }
}

struct Workload {
    tasks: Vec<TaskRef>,
    behavior: HashMap<Pid, Behavior>,
    processes: Vec<ProcessEntry>,
}

impl Workload {
    /// Seeded synthetic tasks: alternating CPU-bound and interactive, every
    /// fifth pinned to one CPU, every third a thread of the previous
    /// process, plus one kernel thread.
    fn generate(sim: &SimConfig, nr_cpus: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(sim.seed);
        let mut tasks = Vec::new();
        let mut behavior = HashMap::new();
        let mut processes = vec![
            ProcessEntry::new(KTHREAD_PID, 0, "kworker/0:1"),
            ProcessEntry::new(SIM_ROOT_PID, 1, "sonar-sim"),
        ];

        let kthread = Task::new(KTHREAD_PID, "kworker/0:1", CpuMask::first_n(nr_cpus))
            .with_flags(TaskFlags::KTHREAD)
            .into_ref();
        behavior.insert(
            KTHREAD_PID,
            Behavior::Interactive {
                burst_ns: 50_000,
                sleep_ns: 5_000_000,
            },
        );
        tasks.push(kthread);

        let mut tgid = FIRST_TASK_PID;
        for i in 0..sim.tasks {
            let pid = FIRST_TASK_PID + i;
            let comm = NAMES[i as usize % NAMES.len()];
            if i % 3 != 2 {
                tgid = pid;
                processes.push(ProcessEntry::new(pid, SIM_ROOT_PID, comm));
            }

            let mask = if i % 5 == 4 {
                CpuMask::single(i % nr_cpus.max(1))
            } else {
                CpuMask::first_n(nr_cpus)
            };
            let weight = rng.gen_range(50..=200);
            let task = Task::new(pid, comm, mask)
                .with_tgid(tgid)
                .with_weight(weight)
                .into_ref();

            let kind = if i % 2 == 0 {
                Behavior::CpuBound
            } else {
                Behavior::Interactive {
                    burst_ns: rng.gen_range(100_000..1_000_000),
                    sleep_ns: rng.gen_range(1_000_000..10_000_000),
                }
            };
            behavior.insert(pid, kind);
            tasks.push(task);
        }

        Self {
            tasks,
            behavior,
            processes,
        }
    }
}
