use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::column::ColumnId;

/// A width to store for a column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeWrite {
    pub column: ColumnId,
    pub width: f32,
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    column: ColumnId,
    start_x: f32,
    start_width: f32,
}

/// Drag-resize batched to one width write per frame
///
/// Mouse moves only record a pending width. The first move of a frame spawns
/// a task that sleeps one frame, then sends whatever width is pending at that
/// point and clears the in-flight flag.
#[derive(Debug)]
pub struct ColumnResizer {
    frame: Duration,
    min_width: f32,
    drag: Option<Drag>,
    pending: Arc<Mutex<Option<ResizeWrite>>>,
    in_flight: Arc<AtomicBool>,
    writes: mpsc::UnboundedSender<ResizeWrite>,
    task: Option<JoinHandle<()>>,
}

impl ColumnResizer {
    pub fn new(frame: Duration, min_width: f32) -> (Self, mpsc::UnboundedReceiver<ResizeWrite>) {
        let (writes, rx) = mpsc::unbounded_channel();
        let resizer = Self {
            frame,
            min_width,
            drag: None,
            pending: Arc::new(Mutex::new(None)),
            in_flight: Arc::new(AtomicBool::new(false)),
            writes,
            task: None,
        };
        (resizer, rx)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn start(&mut self, column: ColumnId, x: f32, width: f32) {
        self.drag = Some(Drag {
            column,
            start_x: x,
            start_width: width,
        });
    }

    fn width_at(&self, drag: &Drag, x: f32) -> f32 {
        (drag.start_width + (x - drag.start_x)).max(self.min_width)
    }

    /// Records the width under the pointer. Must run inside a tokio runtime.
    pub fn move_to(&mut self, x: f32) {
        let Some(drag) = self.drag else {
            return;
        };
        let write = ResizeWrite {
            column: drag.column,
            width: self.width_at(&drag, x),
        };
        *self.pending.lock() = Some(write);

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = Arc::clone(&self.pending);
        let in_flight = Arc::clone(&self.in_flight);
        let writes = self.writes.clone();
        let frame = self.frame;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(frame).await;
            let latest = pending.lock().take();
            if let Some(write) = latest {
                deliver(&writes, write);
            }
            in_flight.store(false, Ordering::SeqCst);
        }));
    }

    /// Ends the drag and writes the final width immediately
    pub fn end(&mut self, x: f32) -> Option<ResizeWrite> {
        let drag = self.drag.take()?;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.pending.lock().take();
        self.in_flight.store(false, Ordering::SeqCst);

        let write = ResizeWrite {
            column: drag.column,
            width: self.width_at(&drag, x),
        };
        deliver(&self.writes, write);
        Some(write)
    }
}

fn deliver(writes: &mpsc::UnboundedSender<ResizeWrite>, write: ResizeWrite) {
    if writes.send(write).is_err() {
        tracing::trace!(column = %write.column, width = write.width, "resize receiver closed, width dropped");
    }
}

impl Drop for ColumnResizer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
