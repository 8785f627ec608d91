use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    #[error("Procedure {procedure} failed: {message}")]
    Procedure { procedure: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}
