//! Sync flushes and shutdown behaviour.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;

use graft_overlay::vfs::{Filesystem, MemoryFs};
use graft_overlay::{Overlay, OverlayError};

#[tokio::test]
async fn sync_copies_generated_and_backing_files() {
    let backing = Arc::new(MemoryFs::new());
    backing.write(Path::new("src/app.txt"), b"source").await.unwrap();
    let overlay = Overlay::new(backing.clone());

    overlay
        .generate_file("gen/out.txt", |_fs, file| {
            async move {
                file.data = b"generated".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    let dest = Arc::new(MemoryFs::new());
    overlay.sync(dest.clone(), ".").await.unwrap();

    assert_eq!(dest.read(Path::new("gen/out.txt")).await.unwrap(), b"generated");
    assert_eq!(dest.read(Path::new("src/app.txt")).await.unwrap(), b"source");
}

#[tokio::test]
async fn sync_of_subtree_copies_only_that_subtree() {
    let backing = Arc::new(MemoryFs::new());
    backing.write(Path::new("keep/a.txt"), b"a").await.unwrap();
    backing.write(Path::new("skip/b.txt"), b"b").await.unwrap();
    let overlay = Overlay::new(backing.clone());

    let dest = Arc::new(MemoryFs::new());
    overlay.sync(dest.clone(), "keep").await.unwrap();

    assert_eq!(dest.read(Path::new("keep/a.txt")).await.unwrap(), b"a");
    assert!(!dest.exists(Path::new("skip/b.txt")).await);
}

#[tokio::test]
async fn sync_restores_the_live_backing() {
    let backing = Arc::new(MemoryFs::new());
    backing.write(Path::new("in"), b"v1").await.unwrap();
    let overlay = Overlay::new(backing.clone());

    overlay
        .generate_file("out", |fs, file| {
            async move {
                file.data = fs.read("in").await?;
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    overlay.sync(Arc::new(MemoryFs::new()), ".").await.unwrap();

    // The throwaway caching wrapper must be gone: a mutation plus a change
    // sweep is observed through the restored backing.
    backing.write(Path::new("in"), b"v2").await.unwrap();
    overlay.change(["in"]).await.unwrap();
    assert_eq!(overlay.read("out").await.unwrap(), b"v2");
}

#[tokio::test]
async fn sync_does_not_rerun_cached_generators() {
    let overlay = Overlay::new(Arc::new(MemoryFs::new()));
    let count = Arc::new(AtomicUsize::new(0));

    let calls = count.clone();
    overlay
        .generate_file("g.txt", move |_fs, file| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                file.data = b"g".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    overlay.read("g.txt").await.unwrap();
    overlay.sync(Arc::new(MemoryFs::new()), ".").await.unwrap();
    overlay.read("g.txt").await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn close_runs_deferred_hooks_in_reverse_order() {
    let overlay = Overlay::new(Arc::new(MemoryFs::new()));
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = order.clone();
    overlay
        .generate_file("spawning.txt", move |fs, file| {
            let log = log.clone();
            async move {
                let first = log.clone();
                fs.defer(move || {
                    first.lock().unwrap().push("first");
                    Ok(())
                });
                let second = log.clone();
                fs.defer(move || {
                    second.lock().unwrap().push("second");
                    Ok(())
                });
                file.data = b"done".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    overlay.read("spawning.txt").await.unwrap();
    overlay.close().unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
}

#[tokio::test]
async fn close_is_idempotent_and_reports_first_failure() {
    let overlay = Overlay::new(Arc::new(MemoryFs::new()));

    overlay
        .generate_file("h.txt", |fs, file| {
            async move {
                fs.defer(|| anyhow::bail!("teardown failed"));
                file.data = b"h".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();
    overlay.read("h.txt").await.unwrap();

    let err = overlay.close().unwrap_err();
    assert!(matches!(err, OverlayError::Close(_)));

    // Second close is a no-op.
    overlay.close().unwrap();
}

#[tokio::test]
async fn operations_after_close_fail() {
    let overlay = Overlay::new(Arc::new(MemoryFs::new()));
    overlay.close().unwrap();

    assert!(matches!(
        overlay.open("x").await.unwrap_err(),
        OverlayError::Closed
    ));
    assert!(matches!(
        overlay.readdir(".").await.unwrap_err(),
        OverlayError::Closed
    ));
    assert!(matches!(
        overlay.change(["x"]).await.unwrap_err(),
        OverlayError::Closed
    ));
    assert!(matches!(
        overlay
            .generate_file("y", |_fs, file| {
                async move {
                    file.data = Vec::new();
                    Ok(())
                }
                .boxed()
            })
            .await
            .unwrap_err(),
        OverlayError::Closed
    ));
}

#[tokio::test]
async fn close_cancels_the_ambient_context() {
    let overlay = Overlay::new(Arc::new(MemoryFs::new()));
    let token = Arc::new(Mutex::new(None));

    let slot = token.clone();
    overlay
        .generate_file("ctx.txt", move |fs, file| {
            let slot = slot.clone();
            async move {
                *slot.lock().unwrap() = Some(fs.context());
                file.data = b"ctx".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    overlay.read("ctx.txt").await.unwrap();
    let token = token.lock().unwrap().take().unwrap();
    assert!(!token.is_cancelled());

    overlay.close().unwrap();
    assert!(token.is_cancelled());
}
