//! The instance ceiling holds under concurrent load.

use render_control::{RenderAdmissionController, RenderError, TimeSliceAssigner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use terrain_common::BusyReason;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ceiling_never_exceeded() {
    let controller = Arc::new(RenderAdmissionController::new(3, None));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..64 {
        let controller = controller.clone();
        let running = running.clone();
        let peak = peak.clone();
        let rejected = rejected.clone();
        tasks.push(tokio::spawn(async move {
            match controller.admit(&format!("~{}", i)).await {
                Ok(_permit) => {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
                Err(RenderError::Busy(BusyReason::InstanceCeiling)) => {
                    rejected.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 1);
    assert_eq!(controller.active(), 0);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.admitted + snapshot.rejected_ceiling, 64);
    assert_eq!(snapshot.rejected_ceiling as usize, rejected.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_slices_spread_renders_over_time() {
    let slices = TimeSliceAssigner::new(Duration::from_millis(100), 3);
    let controller = Arc::new(RenderAdmissionController::new(10, Some(slices)));
    let start = tokio::time::Instant::now();

    let mut tasks = Vec::new();
    for i in 0..5 {
        let controller = controller.clone();
        tasks.push(tokio::spawn(async move {
            controller
                .admit(&format!("~{}", i))
                .await
                .map(|permit| permit.waited())
        }));
    }

    let mut waits = Vec::new();
    let mut busy = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(waited) => waits.push(waited),
            Err(RenderError::Busy(BusyReason::NoTimeSlice)) => busy += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    // three outstanding slices at most: now, +100 ms, +200 ms
    assert_eq!(waits.len(), 3);
    assert_eq!(busy, 2);
    waits.sort();
    assert_eq!(waits[0], Duration::ZERO);
    assert_eq!(waits[2], Duration::from_millis(200));
    assert!(start.elapsed() >= Duration::from_millis(200));
}
