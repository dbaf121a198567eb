//! Process filter
//!
//! Decides which pids the ranking sees. A pid is visible when its command
//! contains one of the configured words, or when any of its ancestors'
//! does. With no words every listed pid is visible.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use sonar_sched::scheduler::Pid;

use crate::error::{Result, SonarError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub ppid: Pid,
    pub comm: String,
}

impl ProcessEntry {
    pub fn new(pid: Pid, ppid: Pid, comm: impl Into<String>) -> Self {
        Self {
            pid,
            ppid,
            comm: comm.into(),
        }
    }
}

/// Lists the processes currently alive
pub trait ProcessSource {
    fn list(&self) -> Result<Vec<ProcessEntry>>;
}

pub trait ProcessFilter {
    /// Recomputes the visible set. Called once per tick.
    fn refresh(&mut self) -> Result<()>;

    fn contains(&self, pid: Pid) -> bool;
}

/// Everything is visible
#[derive(Debug, Default, Clone, Copy)]
pub struct AllProcesses;

impl ProcessFilter for AllProcesses {
    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    fn contains(&self, _pid: Pid) -> bool {
        true
    }
}

/// Name filter that propagates down the process tree
pub struct ProcessTreeFilter<S> {
    source: S,
    words: Vec<String>,
    visible: HashSet<Pid>,
}

impl<S: ProcessSource> ProcessTreeFilter<S> {
    pub fn new(source: S, words: Vec<String>) -> Self {
        let words = words.into_iter().filter(|w| !w.is_empty()).collect();
        Self {
            source,
            words,
            visible: HashSet::new(),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    fn matches(&self, comm: &str) -> bool {
        self.words.iter().any(|w| comm.contains(w.as_str()))
    }
}

impl<S: ProcessSource> ProcessFilter for ProcessTreeFilter<S> {
    fn refresh(&mut self) -> Result<()> {
        let entries = self.source.list()?;
        self.visible.clear();

        if self.words.is_empty() {
            self.visible.extend(entries.iter().map(|e| e.pid));
            return Ok(());
        }

        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for entry in &entries {
            if entry.ppid != entry.pid {
                children.entry(entry.ppid).or_default().push(entry.pid);
            }
        }

        let mut stack: Vec<Pid> = entries
            .iter()
            .filter(|e| self.matches(&e.comm))
            .map(|e| e.pid)
            .collect();
        while let Some(pid) = stack.pop() {
            if self.visible.insert(pid) {
                if let Some(kids) = children.get(&pid) {
                    stack.extend(kids.iter().copied());
                }
            }
        }
        Ok(())
    }

    fn contains(&self, pid: Pid) -> bool {
        self.visible.contains(&pid)
    }
}

/// Reads the process table from procfs
#[derive(Debug, Clone)]
pub struct ProcfsSource {
    root: PathBuf,
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_entry(&self, pid: Pid) -> Option<ProcessEntry> {
        let dir = self.root.join(pid.to_string());
        let stat = fs::read_to_string(dir.join("stat")).ok()?;
        let (ppid, comm) = parse_stat(&stat)?;

        // argv[0] is longer than the 15-byte comm; kernel threads have none
        let comm = fs::read(dir.join("cmdline"))
            .ok()
            .and_then(|raw| {
                let argv0 = raw.split(|b| *b == 0).next()?;
                let argv0 = String::from_utf8_lossy(argv0);
                let base = argv0.rsplit('/').next()?.to_string();
                (!base.is_empty()).then_some(base)
            })
            .unwrap_or(comm);
        Some(ProcessEntry { pid, ppid, comm })
    }
}

/// Extracts `(ppid, comm)` from a `/proc/<pid>/stat` line. The command may
/// itself contain spaces and parentheses, so it ends at the last `)`.
pub fn parse_stat(line: &str) -> Option<(Pid, String)> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = line[open + 1..close].to_string();
    let mut rest = line[close + 1..].split_whitespace();
    let _state = rest.next()?;
    let ppid = rest.next()?.parse().ok()?;
    Some((ppid, comm))
}

impl ProcessSource for ProcfsSource {
    fn list(&self) -> Result<Vec<ProcessEntry>> {
        let dir = fs::read_dir(&self.root).map_err(|e| {
            SonarError::Filter(format!("cannot list {}: {}", self.root.display(), e))
        })?;

        let mut entries = Vec::new();
        for dirent in dir.flatten() {
            let Some(pid) = dirent.file_name().to_str().and_then(|n| n.parse::<Pid>().ok())
            else {
                continue;
            };
            // processes may exit between readdir and read
            if let Some(entry) = self.read_entry(pid) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

impl<T: ProcessSource + ?Sized> ProcessSource for &T {
    fn list(&self) -> Result<Vec<ProcessEntry>> {
        (**self).list()
    }
}

impl<T: ProcessSource + ?Sized> ProcessSource for std::sync::Arc<T> {
    fn list(&self) -> Result<Vec<ProcessEntry>> {
        (**self).list()
    }
}

impl ProcessSource for Vec<ProcessEntry> {
    fn list(&self) -> Result<Vec<ProcessEntry>> {
        Ok(self.clone())
    }
}
