//! Background liveness sweep: periodically reaps exited runner processes
//! from the registry so `ListLoopRunners` never reports a dead child as
//! running between polls.

use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

pub async fn run(registry: Arc<Registry>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let runners = registry.reap_and_list().await;
                debug!(live = runners.len(), "sweep: reconciled runner registry");
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("sweep: shutdown signaled, stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_reaps_an_exited_runner_without_a_list_call() {
        use std::process::Stdio;
        use tokio::process::Command;

        let registry = Arc::new(Registry::new());
        let child = Command::new("true").stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).spawn().unwrap();
        registry.insert("loop-1".into(), child).await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::clone(&registry), Duration::from_millis(20), rx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(registry.reap_and_list().await.is_empty());
    }
}
