use clap::ValueEnum;
use tracing_subscriber::filter::EnvFilter;

/// Full filter directive, e.g. `gsectl_console=trace,gsectl_frame=warn`.
/// Overrides `--log-level` when set.
pub const LOG_ENV: &str = "GSECTL_LOG";

/// Crates whose events `--log-level` governs; everything else stays at warn.
const CRATES: [&str; 4] = ["gsectl", "gsectl_console", "gsectl_frame", "gsectl_transport"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// `warn` for dependencies, `level` for the gsectl crates.
pub fn default_directives(level: LogLevel) -> String {
    CRATES.iter().fold(String::from("warn"), |mut acc, krate| {
        acc.push(',');
        acc.push_str(krate);
        acc.push('=');
        acc.push_str(level.as_str());
        acc
    })
}

fn build_filter(level: LogLevel, directive: Option<&str>) -> EnvFilter {
    let fallback = || EnvFilter::new(default_directives(level));
    match directive {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); using --log-level {}", level.as_str());
            fallback()
        }),
        None => fallback(),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directive = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, directive.as_deref()))
        .with_ansi(false)
        .with_target(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    if let Err(err) = installed {
        eprintln!("logging disabled: {err}");
    }
}
