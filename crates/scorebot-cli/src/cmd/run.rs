use scorebot_engine::RoundScheduler;
use std::path::Path;
use tokio::sync::watch;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let scheduler = super::build_scheduler(root)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(scheduler))
}

/// Drive rounds until Ctrl-C. A round already in flight is allowed to close.
async fn serve(scheduler: RoundScheduler) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let rounds = scheduler.run(shutdown_rx);
    tokio::pin!(rounds);

    tokio::select! {
        res = &mut rounds => {
            res?;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, finishing the current round");
        }
    }

    let _ = shutdown_tx.send(true);
    rounds.await?;
    Ok(())
}
