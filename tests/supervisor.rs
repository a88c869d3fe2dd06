//! Lifecycle tests for the process supervisor, driven by plain unix tools so
//! they run without any media toolchain installed.

#![cfg(unix)]

use std::{
    process::{Command, Stdio},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use cineforge::{CineforgeError, ProcessSupervisor};

fn quiet(mut cmd: Command) -> Command {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

fn sleeper(seconds: u32) -> Command {
    let mut cmd = Command::new("sleep");
    cmd.arg(seconds.to_string());
    quiet(cmd)
}

fn wait_for_empty(sup: &ProcessSupervisor, deadline: Duration) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if sup.process_count() == 0 {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    sup.process_count() == 0
}

#[test]
fn sigterm_ends_a_cooperative_process_quickly() {
    let sup = ProcessSupervisor::new();
    let spawned = sup.start(sleeper(30)).unwrap();
    assert_eq!(sup.process_count(), 1);
    assert!(spawned.process.is_running());

    let started = Instant::now();
    sup.terminate(spawned.process.pid()).unwrap();
    // Well under the 5s grace period: sleep dies on the first SIGTERM.
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(wait_for_empty(&sup, Duration::from_secs(2)));
    assert!(!spawned.process.is_running());
}

#[test]
fn sigkill_escalation_ends_a_term_ignoring_process() {
    let sup = ProcessSupervisor::new();
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "trap '' TERM; sleep 60"]);
    let spawned = sup.start(quiet(cmd)).unwrap();

    let started = Instant::now();
    sup.terminate(spawned.process.pid()).unwrap();
    // The grace period must elapse before the kill, but not much more.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(10));
    assert!(wait_for_empty(&sup, Duration::from_secs(2)));
}

#[test]
fn terminate_all_clears_every_registration() {
    let sup = ProcessSupervisor::new();
    for _ in 0..3 {
        sup.start(sleeper(30)).unwrap();
    }
    assert_eq!(sup.process_count(), 3);
    sup.terminate_all();
    assert!(wait_for_empty(&sup, Duration::from_secs(2)));
}

#[test]
fn close_is_idempotent_and_blocks_new_starts() {
    let sup = ProcessSupervisor::new();
    sup.start(sleeper(30)).unwrap();
    sup.close();
    sup.close();
    assert!(sup.is_closed());
    assert!(wait_for_empty(&sup, Duration::from_secs(2)));
    assert!(matches!(
        sup.start(sleeper(1)).unwrap_err(),
        CineforgeError::State(_)
    ));
}

#[test]
fn close_racing_starts_leaves_no_survivors() {
    // A close() that overlaps in-flight start() calls must terminate every
    // child that was successfully registered, with none slipping through
    // between the registration and the shutdown sweep.
    let sup = Arc::new(ProcessSupervisor::new());
    let spawner = {
        let sup = Arc::clone(&sup);
        thread::spawn(move || {
            let mut handles = Vec::new();
            for _ in 0..20 {
                match sup.start(sleeper(30)) {
                    Ok(spawned) => handles.push(spawned.process),
                    Err(CineforgeError::State(_)) => break,
                    Err(e) => panic!("unexpected start error: {e}"),
                }
            }
            handles
        })
    };

    thread::sleep(Duration::from_millis(5));
    sup.close();
    let handles = spawner.join().unwrap();

    for handle in handles {
        let exit = handle
            .wait_timeout(Duration::from_secs(8))
            .expect("every started child must be terminated by close");
        assert!(!exit.success());
    }
    assert_eq!(sup.process_count(), 0);
}

#[test]
fn drop_terminates_outstanding_processes() {
    let handle;
    {
        let sup = ProcessSupervisor::new();
        let spawned = sup.start(sleeper(30)).unwrap();
        handle = spawned.process;
    }
    // Supervisor dropped; its shutdown must reach the child.
    let exit = handle
        .wait_timeout(Duration::from_secs(8))
        .expect("child should die with its supervisor");
    assert!(!exit.success());
}

#[test]
fn shared_handles_all_observe_completion() {
    let sup = Arc::new(ProcessSupervisor::new());
    let spawned = sup.start(quiet(Command::new("true"))).unwrap();

    let mut joins = Vec::new();
    for _ in 0..4 {
        let h = spawned.process.clone();
        joins.push(thread::spawn(move || h.wait().success()));
    }
    for j in joins {
        assert!(j.join().unwrap());
    }
}
