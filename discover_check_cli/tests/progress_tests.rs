use discover_check_cli::progress::{
    ProgressRenderer, create_progress_infrastructure, finish_rendering, format_bytes,
    format_throughput, render_progress,
};
use discover_check_core::progress::{CheckKind, ProgressUpdate};
use std::path::PathBuf;
use std::time::Duration;

fn car(name: &str) -> PathBuf {
    PathBuf::from("/mnt/drive/set-a").join(name)
}

#[test]
fn test_renderer_counts_failed_checks() {
    let mut renderer = ProgressRenderer::new();

    renderer.handle_update(ProgressUpdate::BatchProgress {
        current: 0,
        total: 2,
        current_file: None,
    });
    for check in [CheckKind::Commitment, CheckKind::Structure] {
        renderer.handle_update(ProgressUpdate::FileProgress {
            path: car("bafyreia.car"),
            check,
            bytes_processed: 512,
            total_bytes: 1024,
        });
    }
    renderer.handle_update(ProgressUpdate::CheckFinished {
        path: car("bafyreia.car"),
        check: CheckKind::Commitment,
        passed: true,
    });
    renderer.handle_update(ProgressUpdate::CheckFinished {
        path: car("bafyreia.car"),
        check: CheckKind::Structure,
        passed: false,
    });
    // a finish without any progress beforehand
    renderer.handle_update(ProgressUpdate::CheckFinished {
        path: car("bafyreib.car"),
        check: CheckKind::Structure,
        passed: false,
    });
    renderer.handle_update(ProgressUpdate::BatchProgress {
        current: 2,
        total: 2,
        current_file: Some("bafyreib.car".to_string()),
    });
    renderer.handle_update(ProgressUpdate::Status {
        message: "done".to_string(),
    });

    assert_eq!(renderer.failed_checks(), 2);
    renderer.finish();
}

#[test]
fn test_finish_without_batch_is_quiet() {
    let mut renderer = ProgressRenderer::default();
    renderer.handle_update(ProgressUpdate::FileProgress {
        path: car("bafyreic.car"),
        check: CheckKind::Commitment,
        bytes_processed: 1,
        total_bytes: 10,
    });
    assert_eq!(renderer.failed_checks(), 0);
    renderer.finish();
}

#[tokio::test]
async fn test_render_task_ends_after_complete() {
    let (provider, rx) = create_progress_infrastructure();
    let task = tokio::spawn(render_progress(rx));

    {
        let child = provider.create_child("validate");
        child.report(ProgressUpdate::BatchProgress {
            current: 1,
            total: 1,
            current_file: Some("bafyreid.car".to_string()),
        });
        child.complete();
    }
    provider.complete();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("renderer did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_panicking_renderer_is_reported() {
    let task = tokio::spawn(async { panic!("terminal went away") });
    assert!(!finish_rendering(task).await);

    let task = tokio::spawn(async {});
    assert!(finish_rendering(task).await);
}

#[test]
fn test_drive_sized_totals() {
    assert_eq!(format_bytes(8_001_563_222_016), "7.28 TiB");
    assert_eq!(format_bytes(34_359_738_368), "32.00 GiB");
    assert_eq!(
        format_throughput(34_359_738_368, Duration::from_secs(64)),
        "512.0 MiB/s"
    );
}
