use thiserror::Error;
use url::ParseError;

pub type Result<T, E = KucoinError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum KucoinError {
    #[error("Endpoint Error: code={code}, message={message}")]
    EndpointError { code: String, message: String },

    #[error("Parameter Required Error: Missing required parameter '{param}'")]
    ParameterRequiredError { param: String },

    #[error("Parameter Value Error: Invalid value '{value}' for parameter '{param}'. Allowed values: {allowed:?}")]
    ParameterValueError {
        param: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Connect Error: {0}")]
    ConnectError(String),

    #[error("WebSocket Error: {0}")]
    WebsocketError(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Authentication Error: {0}")]
    AuthenticationError(String),

    #[error("HTTP Request Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON Serialization/Deserialization Error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL Parsing Error: {0}")]
    UrlParseError(#[from] ParseError),

    #[error("Invalid HTTP Header Value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("System Time Error: {0}")]
    TimestampError(#[from] std::time::SystemTimeError),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
}
