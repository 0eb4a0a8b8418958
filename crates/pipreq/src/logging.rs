use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_tree::time::Uptime;
use tracing_tree::HierarchicalLayer;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    /// Show warnings, such as ignored nested files.
    #[default]
    Default,
    /// Suppress all log output.
    Quiet,
    /// Show all messages, including debug messages from the parser.
    Verbose,
}

/// Configure `tracing` for the given [`Level`], taking into account the `RUST_LOG` environment
/// variable.
///
/// `RUST_LOG` overrides the default filter of every level. [`Level::Verbose`] also switches to a
/// hierarchical layout with uptime and targets.
pub(crate) fn setup_logging(level: Level) -> anyhow::Result<()> {
    match level {
        Level::Default | Level::Quiet => {
            let default = if level == Level::Quiet {
                LevelFilter::OFF
            } else {
                LevelFilter::WARN
            };
            let filter = EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy();

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .without_time()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        Level::Verbose => {
            // Every workspace crate shares the `pipreq` prefix.
            let filter = match EnvFilter::try_from_default_env() {
                Ok(filter) => filter,
                Err(_) => EnvFilter::try_new("pipreq=debug")?,
            };

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    HierarchicalLayer::default()
                        .with_targets(true)
                        .with_timer(Uptime::default())
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }
    Ok(())
}
