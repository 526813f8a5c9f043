use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Baseline verbosity for this service's own spans; `RUST_LOG` still wins.
const DEFAULT_DIRECTIVE: &str = "poller_service=info";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(false)
        .init();
}

fn default_filter() -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_DIRECTIVE.parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    filter
}
