mod tracer_engine;

pub use tracer_engine::{TracerEngine, TracerOptions};

/// Should be called at the start of each component.
/// Initialises the global subscriber and announces the component.
#[macro_export]
macro_rules! init_tracer {
    ($options:expr) => {{
        let tracer = $crate::tracer::TracerEngine::new($options, env!("CARGO_BIN_NAME"));
        // Emitted here rather than in `TracerEngine::new` so the event
        // carries the calling module's target.
        tracing::info!("{} {} started", env!("CARGO_BIN_NAME"), env!("CARGO_PKG_VERSION"));
        tracer
    }};
}
