// Device-level failure taxonomy
//
// Subsystem errors fold into these five kinds. Network and fetch
// failures are handed to the retry ledger and validation failures go
// back to the portal caller. Panel busy-wait overruns are only logged.

use crate::bmp::DecodeError;
use crate::config::ConfigError;
use crate::net::{HttpError, LinkError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    NetworkAcquisition(LinkError),
    RemoteFetch(HttpError),
    /// Body stalled past the idle bound or ended early.
    StreamTimeout,
    ConfigValidation(ConfigError),
    /// Panel busy line stayed high past its bound.
    HardwareTimeout,
}

impl Error {
    /// Text for the on-panel failure screen.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NetworkAcquisition(_) => "WiFi failed",
            Self::RemoteFetch(_) | Self::StreamTimeout => "Server error",
            Self::ConfigValidation(_) => "Bad config",
            Self::HardwareTimeout => "Display error",
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NetworkAcquisition(e) => write!(f, "network: {}", e),
            Self::RemoteFetch(e) => write!(f, "fetch: {}", e),
            Self::StreamTimeout => write!(f, "stream stalled"),
            Self::ConfigValidation(e) => write!(f, "config: {}", e),
            Self::HardwareTimeout => write!(f, "hardware timeout"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::NetworkAcquisition(e)
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Self::RemoteFetch(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::ConfigValidation(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Timeout | DecodeError::Truncated => Self::StreamTimeout,
            DecodeError::BadMagic | DecodeError::BadOffset | DecodeError::ShortBody => {
                Self::RemoteFetch(HttpError::BadResponse)
            }
            DecodeError::Io => Self::RemoteFetch(HttpError::Io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons() {
        let e: Error = LinkError::Timeout.into();
        assert_eq!(e.reason(), "WiFi failed");

        let e: Error = DecodeError::Truncated.into();
        assert_eq!(e, Error::StreamTimeout);
        assert_eq!(e.reason(), "Server error");

        let e: Error = DecodeError::BadMagic.into();
        assert_eq!(e, Error::RemoteFetch(HttpError::BadResponse));

        let e: Error = ConfigError::BadServerUrl.into();
        assert_eq!(e.reason(), "Bad config");
    }
}
