/// Errors produced by the feature source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid service URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Service supports neither PBF nor GeoJSON queries (advertised: {0})")]
    UnsupportedFormat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PBF decoding error: {0}")]
    Pbf(#[from] prost::DecodeError),

    #[error("Tile decoding error: {0}")]
    Decode(String),

    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Extent reprojection failed: {0}")]
    Projection(String),

    #[error("Source not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, SourceError>;
