//! Generation and read-path behaviour of the overlay.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;

use graft_overlay::vfs::{Filesystem, MemoryFs};
use graft_overlay::{EmbedFile, Overlay, OverlayError};

fn overlay_over(backing: MemoryFs) -> Overlay {
    Overlay::new(Arc::new(backing))
}

#[tokio::test]
async fn generates_file_and_memoises() {
    let overlay = overlay_over(MemoryFs::new());
    let count = Arc::new(AtomicUsize::new(0));

    let calls = count.clone();
    overlay
        .generate_file("a.txt", move |_fs, file| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                file.data = b"hello".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(overlay.read("a.txt").await.unwrap(), b"hello");
    assert_eq!(overlay.read("a.txt").await.unwrap(), b"hello");
    assert_eq!(count.load(Ordering::SeqCst), 1, "second read must hit the cache");
}

#[tokio::test]
async fn generator_sees_backing_files() {
    let backing = MemoryFs::new();
    backing.write(Path::new("in"), b"v1").await.unwrap();
    let overlay = overlay_over(backing);

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

    assert_eq!(overlay.read("out").await.unwrap(), b"v1");
}

#[tokio::test]
async fn generators_observe_each_other() {
    let overlay = overlay_over(MemoryFs::new());

    overlay
        .generate_file("base.txt", |_fs, file| {
            async move {
                file.data = b"base".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    overlay
        .generate_file("derived.txt", |fs, file| {
            async move {
                let mut data = fs.read("base.txt").await?;
                data.extend_from_slice(b"+derived");
                file.data = data;
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(overlay.read("derived.txt").await.unwrap(), b"base+derived");
}

#[tokio::test]
async fn embedded_file_serves_fixed_bytes() {
    let overlay = overlay_over(MemoryFs::new());
    overlay
        .file_generator("embed.bin", EmbedFile::new(&b"\x00\x01\x02"[..]))
        .await
        .unwrap();
    assert_eq!(overlay.read("embed.bin").await.unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn failure_does_not_populate_cache() {
    let overlay = overlay_over(MemoryFs::new());
    let count = Arc::new(AtomicUsize::new(0));

    let calls = count.clone();
    overlay
        .generate_file("flaky", move |_fs, file| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("transient failure");
                }
                file.data = b"recovered".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    let err = overlay.read("flaky").await.unwrap_err();
    assert!(matches!(err, OverlayError::Generator { .. }));

    // A retry after the failure re-runs the generator.
    assert_eq!(overlay.read("flaky").await.unwrap(), b"recovered");
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dir_generator_populates_once() {
    let overlay = overlay_over(MemoryFs::new());
    let count = Arc::new(AtomicUsize::new(0));

    let calls = count.clone();
    overlay
        .generate_dir("codegen", move |_fs, dir| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                dir.generate_file("main.go", |_fs, file| {
                    async move {
                        file.data = b"package main".to_vec();
                        Ok(())
                    }
                    .boxed()
                })
                .await?;
                dir.generate_file("app.go", |_fs, file| {
                    async move {
                        file.data = b"package app".to_vec();
                        Ok(())
                    }
                    .boxed()
                })
                .await?;
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    // A descendant read triggers the callback, then resolves in the tree.
    assert_eq!(overlay.read("codegen/main.go").await.unwrap(), b"package main");
    assert_eq!(overlay.read("codegen/app.go").await.unwrap(), b"package app");
    assert_eq!(count.load(Ordering::SeqCst), 1, "directory materialises once");

    // Listing preserves registration order.
    let names: Vec<String> = overlay
        .readdir("codegen")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["main.go", "app.go"]);

    // Paths the callback never registered stay absent.
    assert!(overlay.read("codegen/missing.go").await.unwrap_err().is_not_found());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn nested_dir_generators_resolve_lazily() {
    let overlay = overlay_over(MemoryFs::new());

    overlay
        .generate_dir("gen", |_fs, dir| {
            async move {
                dir.generate_dir("inner", |_fs, dir| {
                    async move {
                        dir.generate_file("deep.txt", |_fs, file| {
                            async move {
                                file.data = b"deep".to_vec();
                                Ok(())
                            }
                            .boxed()
                        })
                        .await?;
                        Ok(())
                    }
                    .boxed()
                })
                .await?;
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(overlay.read("gen/inner/deep.txt").await.unwrap(), b"deep");
}

#[tokio::test]
async fn file_server_serves_per_target() {
    let overlay = overlay_over(MemoryFs::new());

    overlay
        .serve_file("view", |_fs, file| {
            async move {
                assert_eq!(file.path(), "view");
                let page = format!("page:{}", file.relative());
                file.data = page.into_bytes();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(
        overlay.read("view/index.html").await.unwrap(),
        b"page:index.html"
    );
    assert_eq!(
        overlay.read("view/users/show.html").await.unwrap(),
        b"page:users/show.html"
    );

    // The server directory itself is not a servable target.
    let err = overlay.open("view").await.unwrap_err();
    assert!(matches!(err, OverlayError::InvalidPath(_)));
}

#[tokio::test]
async fn mount_merges_with_backing() {
    let backing = MemoryFs::new();
    backing.write(Path::new("r/a"), b"A").await.unwrap();
    let overlay = overlay_over(backing);

    let mounted = MemoryFs::new();
    mounted.write(Path::new("b"), b"B").await.unwrap();
    overlay.mount("r", Arc::new(mounted)).await.unwrap();

    // Union with tree entries first, then backing.
    let names: Vec<String> = overlay
        .readdir("r")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["b", "a"]);

    assert_eq!(overlay.read("r/a").await.unwrap(), b"A");
    assert_eq!(overlay.read("r/b").await.unwrap(), b"B");
}

#[tokio::test]
async fn mount_resolves_descendants_lazily() {
    let overlay = overlay_over(MemoryFs::new());

    let mounted = MemoryFs::new();
    mounted.write(Path::new("docs/guide.md"), b"# Guide").await.unwrap();
    overlay.mount("m", Arc::new(mounted)).await.unwrap();

    assert_eq!(overlay.read("m/docs/guide.md").await.unwrap(), b"# Guide");

    let names: Vec<String> = overlay
        .readdir("m/docs")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["guide.md"]);
}

#[tokio::test]
async fn readdir_prefers_tree_on_conflict() {
    let backing = MemoryFs::new();
    backing.write(Path::new("both"), b"backing").await.unwrap();
    backing.write(Path::new("only-backing"), b"x").await.unwrap();
    let overlay = overlay_over(backing);

    overlay
        .generate_file("both", |_fs, file| {
            async move {
                file.data = b"generated".to_vec();
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    let names: Vec<String> = overlay
        .readdir(".")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["both", "only-backing"]);

    // The tree side also wins the open.
    assert_eq!(overlay.read("both").await.unwrap(), b"generated");
}

#[tokio::test]
async fn missing_everywhere_is_not_found() {
    let overlay = overlay_over(MemoryFs::new());
    assert!(overlay.open("ghost.txt").await.unwrap_err().is_not_found());
    assert!(overlay.readdir("ghost-dir").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn malformed_paths_are_rejected() {
    let overlay = overlay_over(MemoryFs::new());
    for bad in ["/abs", "a/../b", "a//b"] {
        let err = overlay.open(bad).await.unwrap_err();
        assert!(matches!(err, OverlayError::InvalidPath(_)), "path {bad}");
    }
}

#[tokio::test]
async fn read_of_directory_is_invalid() {
    let backing = MemoryFs::new();
    backing.write(Path::new("d/f"), b"x").await.unwrap();
    let overlay = overlay_over(backing);

    let err = overlay.read("d").await.unwrap_err();
    assert!(matches!(err, OverlayError::InvalidPath(_)));

    // Opening the directory still works and lists its entries.
    let entry = overlay.open("d").await.unwrap();
    assert!(entry.is_dir());
    assert_eq!(entry.entries().unwrap().len(), 1);
}

#[tokio::test]
async fn generated_file_write_appends() {
    let overlay = overlay_over(MemoryFs::new());
    overlay
        .generate_file("code.go", |_fs, file| {
            async move {
                file.write(b"package main\n");
                file.write(b"func main() {}\n");
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(
        overlay.read("code.go").await.unwrap(),
        b"package main\nfunc main() {}\n"
    );
}
