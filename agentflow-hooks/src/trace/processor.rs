// ABOUTME: Span processor and exporter capabilities with a batching implementation
// ABOUTME: Batch processor flushes on size or elapsed export interval

use super::Span;
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Sink receiving batches of finished spans.
pub trait SpanExporter: Send + Sync {
    fn export(&self, spans: Vec<Span>) -> Result<()>;
}

/// Exporter that writes spans to the log. Useful as a default sink.
#[derive(Debug, Default)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    fn export(&self, spans: Vec<Span>) -> Result<()> {
        for span in &spans {
            info!(
                trace_id = %span.context.trace_id,
                span_id = %span.context.span_id,
                name = %span.name,
                status = ?span.status,
                "span exported"
            );
        }
        Ok(())
    }
}

/// Receives span lifecycle callbacks from instrumented code.
pub trait SpanProcessor: Send + Sync {
    fn on_start(&self, span: &Span);

    /// Called with the finished span. May flush synchronously when buffer
    /// thresholds are reached.
    fn on_end(&self, span: Span);

    fn force_flush(&self) -> Result<()>;

    fn shutdown(&self) -> Result<()>;
}

/// Buffers finished spans and exports them in batches, flushing when the
/// buffer reaches `max_batch` or the export interval has elapsed.
pub struct BatchSpanProcessor {
    exporter: Arc<dyn SpanExporter>,
    max_batch: usize,
    export_interval: Duration,
    buffer: Mutex<Vec<Span>>,
    last_flush: Mutex<Instant>,
}

impl BatchSpanProcessor {
    pub fn new(exporter: Arc<dyn SpanExporter>) -> Self {
        Self::with_limits(exporter, 64, Duration::from_secs(5))
    }

    pub fn with_limits(
        exporter: Arc<dyn SpanExporter>,
        max_batch: usize,
        export_interval: Duration,
    ) -> Self {
        Self {
            exporter,
            max_batch: max_batch.max(1),
            export_interval,
            buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    fn flush(&self) -> Result<()> {
        let batch: Vec<Span> = std::mem::take(&mut *self.buffer.lock());
        *self.last_flush.lock() = Instant::now();
        if batch.is_empty() {
            return Ok(());
        }
        debug!(spans = batch.len(), "flushing span batch");
        self.exporter.export(batch)
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &Span) {}

    fn on_end(&self, span: Span) {
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(span);
            buffer.len() >= self.max_batch
                || self.last_flush.lock().elapsed() >= self.export_interval
        };

        if should_flush {
            if let Err(err) = self.flush() {
                debug!(error = %err, "span batch export failed");
            }
        }
    }

    fn force_flush(&self) -> Result<()> {
        self.flush()
    }

    fn shutdown(&self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanKind, SpanStatus};

    #[derive(Default)]
    struct CollectingExporter {
        batches: Mutex<Vec<Vec<Span>>>,
    }

    impl SpanExporter for CollectingExporter {
        fn export(&self, spans: Vec<Span>) -> Result<()> {
            self.batches.lock().push(spans);
            Ok(())
        }
    }

    fn finished_span(name: &str) -> Span {
        let mut span = Span::start(name, SpanKind::Internal);
        span.set_status(SpanStatus::Ok, None);
        span.end();
        span
    }

    #[test]
    fn test_flush_on_batch_size() {
        let exporter = Arc::new(CollectingExporter::default());
        let processor =
            BatchSpanProcessor::with_limits(exporter.clone(), 2, Duration::from_secs(3600));

        processor.on_end(finished_span("a"));
        assert_eq!(exporter.batches.lock().len(), 0);
        assert_eq!(processor.buffered(), 1);

        processor.on_end(finished_span("b"));
        let batches = exporter.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(processor.buffered(), 0);
    }

    #[test]
    fn test_flush_on_elapsed_interval() {
        let exporter = Arc::new(CollectingExporter::default());
        let processor =
            BatchSpanProcessor::with_limits(exporter.clone(), 1000, Duration::from_millis(10));

        std::thread::sleep(Duration::from_millis(20));
        processor.on_end(finished_span("a"));

        assert_eq!(exporter.batches.lock().len(), 1);
    }

    #[test]
    fn test_force_flush_and_shutdown() {
        let exporter = Arc::new(CollectingExporter::default());
        let processor =
            BatchSpanProcessor::with_limits(exporter.clone(), 1000, Duration::from_secs(3600));

        processor.on_end(finished_span("a"));
        processor.force_flush().unwrap();
        assert_eq!(exporter.batches.lock().len(), 1);

        processor.on_end(finished_span("b"));
        processor.shutdown().unwrap();
        assert_eq!(exporter.batches.lock().len(), 2);
    }
}
