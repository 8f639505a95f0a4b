use crate::error::{AppError, AppResult, ErrorReason};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Borrow,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use url::Url;

/// Trust store key: the authority of a requested URL without scheme or port.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host(String);

impl Host {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    pub fn from_url(requested_url: &str) -> AppResult<Self> {
        let url = Url::parse(requested_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| ErrorReason::MissingHost(requested_url.to_owned()))?;

        Ok(Self(host.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Host {
    type Err = AppError;

    fn from_str(requested_url: &str) -> Result<Self, Self::Err> {
        Self::from_url(requested_url)
    }
}

impl Borrow<str> for Host {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_scheme_port_and_path() {
        let host = Host::from_url("https://chat.example.com:8443/channel/general").unwrap();
        assert_eq!(host.as_str(), "chat.example.com");
    }

    #[test]
    fn ip_literals_keep_their_brackets() {
        assert_eq!(Host::from_url("https://[::1]:3000/").unwrap().as_str(), "[::1]");
        assert_eq!(Host::from_url("https://10.0.0.2/").unwrap().as_str(), "10.0.0.2");
    }

    #[test]
    fn url_without_host_is_rejected() {
        let err = Host::from_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err.reason(), ErrorReason::MissingHost(_)));
        assert!(Host::from_url("not a url").is_err());
    }
}
