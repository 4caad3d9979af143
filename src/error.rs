use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No gradient reached layer '{layer}'")]
    MissingGradient { layer: String },

    #[error("Gradient at layer '{layer}' is zero everywhere")]
    ZeroGradient { layer: String },

    #[error("Target index {index} out of range for {count} labels")]
    TargetOutOfRange { index: usize, count: usize },

    #[error("Report error: {0}")]
    Report(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = Error::MissingGradient {
            layer: "features.norm5".to_string(),
        };
        assert_eq!(err.to_string(), "No gradient reached layer 'features.norm5'");

        let err = Error::ZeroGradient {
            layer: "features.norm5".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Gradient at layer 'features.norm5' is zero everywhere"
        );

        let err = Error::TargetOutOfRange { index: 20, count: 14 };
        assert_eq!(err.to_string(), "Target index 20 out of range for 14 labels");

        assert_eq!(
            Error::invalid_input("empty upload").to_string(),
            "Invalid input: empty upload"
        );
    }
}
