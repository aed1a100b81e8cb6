//! Signal handling of the real runner.
//!
//! Signals are process wide and every `SystemRunner` in the process sees
//! them, so these run in their own test binary, one at a time.

use std::io;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use devnet_bootstrap::process::interrupted_signal;
use devnet_bootstrap::{CommandSpec, ExitStatus, ProcessRunner, SystemRunner};
use nix::sys::signal::{kill, Signal};
use nix::unistd::getpid;

static SERIAL: Mutex<()> = Mutex::new(());

/// Send `sig` to this process after `delay`, from another thread.
fn signal_self_after(sig: Signal, delay: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(delay);
        kill(getpid(), sig).unwrap();
    })
}

#[tokio::test]
async fn test_signal_reaches_running_child() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let runner = SystemRunner::new().unwrap();

    let sender = signal_self_after(Signal::SIGTERM, Duration::from_millis(500));
    let cmd = CommandSpec::new("sh").args(["-c", "trap 'exit 42' TERM; sleep 5 & wait"]);
    let status = runner.run_attached(&cmd).await.unwrap();
    sender.join().unwrap();

    assert_eq!(status, ExitStatus::Code(42));
}

#[tokio::test]
async fn test_signal_between_children_interrupts_next_spawn() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let runner = SystemRunner::new().unwrap();

    kill(getpid(), Signal::SIGTERM).unwrap();

    // Delivery goes through the runtime's signal driver, so give it a few
    // turns before expecting the spawn to be refused.
    let cmd = CommandSpec::new("true");
    let mut refused = None;
    for _ in 0..50 {
        thread::sleep(Duration::from_millis(10));
        tokio::task::yield_now().await;
        match runner.run(&cmd).await {
            Ok(output) => assert!(output.status.success()),
            Err(e) => {
                refused = Some(e);
                break;
            }
        }
    }

    let err = refused.expect("spawn was never refused after SIGTERM");
    assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    assert_eq!(interrupted_signal(&err), Some(Signal::SIGTERM as i32));
}
