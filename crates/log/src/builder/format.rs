//! Format layer construction.
//!
//! Each format yields a different layer type, so the shared options are
//! applied by macro instead of a helper function.

macro_rules! create_fmt_layer {
    ($kind:ident, $config:expr) => {
        tracing_subscriber::fmt::layer()
            .$kind()
            .with_writer(std::io::stderr)
            .with_ansi($config.ansi)
            .with_target(true)
            .with_file($config.source)
            .with_line_number($config.source)
    };
}

macro_rules! create_json_layer {
    ($config:expr) => {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .with_file($config.source)
            .with_line_number($config.source)
    };
}
