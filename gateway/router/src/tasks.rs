use crate::Inner;
use futures::StreamExt;
use gateway_registry::Event;
use std::sync::Arc;
use tokio::{sync::watch, time};
use tracing::error;

const REFRESH_INTERVAL: time::Duration = time::Duration::from_secs(600);

/// Consumes the registry change feed, rebuilding index entries per event.
/// Reopens the stream with linear backoff on failure; the attempt counter
/// resets once a stream opens.
pub(crate) async fn watch(inner: Arc<Inner>) {
    let mut closed = inner.closed_rx.clone();
    let mut attempts = 0;

    loop {
        if *closed.borrow() {
            return;
        }

        let mut events = match inner.opts.registry.watch().await {
            Ok(events) => events,
            Err(error) => {
                attempts += 1;
                error!(%error, "error watching endpoints");
                if backoff(&mut closed, attempts).await {
                    return;
                }
                continue;
            }
        };

        attempts = 0;

        loop {
            tokio::select! {
                // Router closed: dropping the stream stops the watch.
                _ = closed.changed() => return,
                event = events.next() => match event {
                    Some(Ok(event)) => process(&inner, event).await,
                    Some(Err(error)) => {
                        error!(%error, "error getting next event");
                        break;
                    }
                    None => break,
                },
            }
        }
    }
}

/// Applies one change event: the full current snapshot of the named service
/// is fetched and stored. Event failures are logged and skipped.
async fn process(inner: &Inner, event: Event) {
    let service = match event.service {
        Some(service) => service,
        None => return,
    };

    match inner.cache.get(&service.name).await {
        Ok(snapshot) => inner.index.store(&snapshot),
        Err(error) => error!(%error, service = %service.name, "unable to get service"),
    }
}

/// Rebuilds every service's index entries from a full registry listing,
/// immediately on startup and every ten minutes after. The watcher provides
/// low-latency updates; this sweep recovers from missed events.
pub(crate) async fn refresh(inner: Arc<Inner>) {
    let mut closed = inner.closed_rx.clone();
    let mut attempts = 0;

    loop {
        if *closed.borrow() {
            return;
        }

        let services = match inner.opts.registry.list_services().await {
            Ok(services) => services,
            Err(error) => {
                attempts += 1;
                error!(%error, "unable to list services");
                if backoff(&mut closed, attempts).await {
                    return;
                }
                continue;
            }
        };

        attempts = 0;

        for service in services {
            match inner.cache.get(&service.name).await {
                Ok(snapshot) => inner.index.store(&snapshot),
                Err(error) => {
                    error!(%error, service = %service.name, "unable to get service");
                    continue;
                }
            }
        }

        tokio::select! {
            _ = closed.changed() => return,
            _ = time::sleep(REFRESH_INTERVAL) => {}
        }
    }
}

// Linear backoff: attempt n waits n seconds. Returns true when the router
// closed during the wait.
async fn backoff(closed: &mut watch::Receiver<bool>, attempts: u64) -> bool {
    tokio::select! {
        _ = closed.changed() => true,
        _ = time::sleep(time::Duration::from_secs(attempts)) => false,
    }
}
