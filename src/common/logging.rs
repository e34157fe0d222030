use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Initialize logging with `[HH:MM:SS] [LEVEL] message` lines.
///
/// Defaults to INFO; `RUST_LOG` overrides the filter.
pub fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}
