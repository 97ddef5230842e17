//! Setup routines for tracing and logging of the braiding process.
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use tqc_braid::record::{LOG_TARGET, METRICS_TARGET, PROGRESS_TARGET};

use tracing::{Metadata, Subscriber};
use tracing_appender::non_blocking;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

fn log_filter(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with(LOG_TARGET)
}

fn verbose_filter(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with(LOG_TARGET) || metadata.target().starts_with(PROGRESS_TARGET)
}

fn metrics_filter(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with(METRICS_TARGET)
}

#[derive(Debug, Default)]
pub struct Tracer {
    pub logfile: Option<non_blocking::WorkerGuard>,
}

impl Tracer {
    /// Setup tracing subscribers for stdout and file logging.
    pub fn setup_tracing(logfile: Option<PathBuf>) -> io::Result<Self> {
        let mut tracer = Self::default();
        let file_layer = logfile.map(|f| tracer.logfile_layer(f)).transpose()?;
        tracing_subscriber::registry()
            .with(tracer.stdout_layer())
            .with(file_layer)
            .init();
        Ok(tracer)
    }

    /// Initialize a file logger handle and non-blocking worker.
    fn init_writer(&self, file: PathBuf) -> io::Result<(non_blocking::NonBlocking, non_blocking::WorkerGuard)> {
        let writer = BufWriter::new(File::create(file)?);
        Ok(non_blocking(writer))
    }

    /// Clean log with the most important events.
    fn stdout_layer<S>(&mut self) -> impl Layer<S>
    where
        S: Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        tracing_subscriber::fmt::layer()
            .without_time()
            .with_target(false)
            .with_level(false)
            .with_filter(filter_fn(log_filter))
    }

    fn logfile_layer<S>(&mut self, logfile: PathBuf) -> io::Result<impl Layer<S>>
    where
        S: Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        let (non_blocking, guard) = self.init_writer(logfile)?;
        self.logfile = Some(guard);
        Ok(tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter_fn(|m| verbose_filter(m) || metrics_filter(m))))
    }
}
