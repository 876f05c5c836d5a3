use anyhow::{Context, Result, anyhow};
use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::cli::TestOpts;
use crate::driver::TestDriver;
use crate::driver::cancel::CancelToken;
use crate::driver::event::TestEvent;
use crate::error::LoopbackError;
use crate::report::Report;
use crate::session::TestSession;

pub fn run(opts: TestOpts) -> Result<()> {
    let config = opts.session_config();
    let mut report = Report::new(&config, Duration::from_secs(1));
    let session = TestSession::open(config).context("initializing serial port")?;
    info!("{} (type q + Enter to quit)", report.title());

    let cancel = CancelToken::new();
    watch_quit_key(cancel.clone());

    let (tx, rx) = mpsc::channel::<TestEvent>();
    let driver = thread::spawn(move || {
        let mut tx = tx;
        let mut driver = TestDriver::new(session, cancel);
        driver.run(&mut tx)?;
        Ok::<_, LoopbackError>((driver.state(), driver.stats().clone()))
    });

    for event in rx {
        let done = event.is_terminal();
        report.handle(&event);
        if done {
            break;
        }
    }

    let (state, stats) = driver.join().map_err(|_| anyhow!("driver thread panicked"))??;
    info!(?state, "loopback test ended");
    report.print_summary(&stats).context("writing report")?;
    Ok(())
}

/// `q`/`quit` on stdin raises the quit signal. EOF just stops watching.
fn watch_quit_key(cancel: CancelToken) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if matches!(line.trim(), "q" | "quit") {
                debug!("quit requested");
                cancel.cancel();
                break;
            }
        }
    });
}
