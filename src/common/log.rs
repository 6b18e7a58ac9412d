//! Logging helpers
//!
//! flowtap logs through the `log` facade; the binary installs `env_logger`.

/// Initialize the global logger
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Parameters
///
/// * `level` - Default log level (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding apps) is not an error for us.
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Render at most `limit` bytes of `data` as a hex preview for log lines
pub fn hex_preview(data: &[u8], limit: usize) -> String {
    let shown = &data[..data.len().min(limit)];
    let mut out = String::with_capacity(shown.len() * 3 + 4);
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", byte));
    }
    if data.len() > limit {
        out.push_str(" ...");
    }
    out
}
