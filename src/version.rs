/// Crate version, baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `User-Agent` sent on every outbound HTTP request.
pub fn user_agent() -> String {
    format!("prometheus-mcp/{}", VERSION)
}
