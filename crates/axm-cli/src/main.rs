use axm_cli::{command, log_format, run};
use axm_core::init_tracing;

fn main() -> anyhow::Result<()> {
    let matches = command().get_matches();
    init_tracing(log_format(&matches), "axm=info,warn");
    let stdout = std::io::stdout();
    run(&matches, &mut stdout.lock())
}
