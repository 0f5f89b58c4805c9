//! A dedicated single-threaded Tokio runtime parked on its own OS thread.
//!
//! One of these backs every [`crate::client::Client`] and [`crate::server::Server`]
//! once started, matching the original's one `asio::io_context` + `std::thread`
//! per session (§5). The runtime is kept alive by `block_on`-ing a oneshot
//! receiver; dropping the `IoWorker` fires the oneshot and joins the thread,
//! which drops the runtime and cancels whatever tasks were still in flight
//! (the accept loop, a stalled connect, an idle reader/writer pair).

use tokio::sync::oneshot;

pub(crate) struct IoWorker {
    pub(crate) handle: tokio::runtime::Handle,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl IoWorker {
    pub(crate) fn spawn(thread_name: &str) -> Self {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("build I/O worker runtime");
                let _ = handle_tx.send(runtime.handle().clone());
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .expect("spawn I/O worker thread");

        let handle = handle_rx.recv().expect("I/O worker failed to start");
        Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
