use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Environment variable turning the test binary into a tracee.
const TRACEE_ENV: &str = "HWTRAP_TRACEE";

/// Memory location written by every call to [watched_function].
pub static COUNTER: AtomicU64 = AtomicU64::new(0);

#[inline(never)]
pub fn watched_function() {
    COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Body of the tracee process.
///
/// Two threads call [watched_function] in a loop. Unless the tracee is
/// quiet, short-lived threads calling it once are spawned periodically.
pub fn run_tracee() {
    let Ok(mode) = std::env::var(TRACEE_ENV) else {
        return;
    };

    for _ in 0..2 {
        std::thread::spawn(|| {
            loop {
                watched_function();
                std::thread::sleep(Duration::from_millis(1));
            }
        });
    }

    println!(
        "READY {:#x} {:#x}",
        watched_function as usize,
        &raw const COUNTER as usize
    );

    loop {
        if mode != "quiet" {
            std::thread::spawn(watched_function).join().unwrap();
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Running copy of the test binary, acting as a tracee.
pub struct Tracee {
    child: Child,
    _stdout: BufReader<ChildStdout>,
    pub function_addr: u64,
    pub counter_addr: u64,
}

impl Tracee {
    pub fn spawn() -> Self {
        Self::spawn_with_mode("busy")
    }

    /// Spawns a tracee which never spawns threads after starting.
    pub fn spawn_quiet() -> Self {
        Self::spawn_with_mode("quiet")
    }

    fn spawn_with_mode(mode: &str) -> Self {
        let mut child = Command::new(std::env::current_exe().unwrap())
            .args(["--exact", "tracee_entry", "--nocapture", "--test-threads=1"])
            .env(TRACEE_ENV, mode)
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();

        let mut stdout = BufReader::new(child.stdout.take().unwrap());

        let mut line = String::new();
        let (function_addr, counter_addr) = loop {
            line.clear();
            assert_ne!(stdout.read_line(&mut line).unwrap(), 0, "tracee exited");

            // printed right after the name of the running test
            if let Some((_, addrs)) = line.trim().split_once("READY ") {
                let mut addrs = addrs.split(' ').map(parse_hex);
                break (addrs.next().unwrap(), addrs.next().unwrap());
            }
        };

        Self {
            child,
            _stdout: stdout,
            function_addr,
            counter_addr,
        }
    }

    pub fn id(&self) -> u64 {
        self.child.id() as u64
    }

    /// Returns the PID of the tracer of the process, if any.
    pub fn tracer_id(&self) -> u64 {
        let status = std::fs::read_to_string(format!("/proc/{}/status", self.id())).unwrap();

        status
            .lines()
            .find_map(|line| line.strip_prefix("TracerPid:"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for Tracee {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn parse_hex(s: &str) -> u64 {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).unwrap()
}
