use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Shared secret used to verify HS256 bearer tokens.
    pub jwt_secret: String,
}
