use serde::{Deserialize, Serialize};
use std::io::Result as IoResult;
use std::{convert::Infallible, path::PathBuf, str::FromStr};
use tokio::fs;

/// PEM material given either inline in the configuration or by path.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileContent {
    Inline {
        #[serde(with = "serde_bytes")]
        content: Vec<u8>,
    },
    Path {
        path: PathBuf,
    },
}

impl FileContent {
    pub async fn load_file(&self) -> IoResult<Vec<u8>> {
        match self {
            FileContent::Inline { content } => Ok(content.clone()),
            FileContent::Path { path } => fs::read(path).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FileContent::Inline { content } => format!("<inline {} bytes>", content.len()),
            FileContent::Path { path } => path.display().to_string(),
        }
    }
}

impl FromStr for FileContent {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::Path {
            path: PathBuf::from(s),
        })
    }
}

impl From<PathBuf> for FileContent {
    fn from(path: PathBuf) -> Self {
        Self::Path { path }
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(content: Vec<u8>) -> Self {
        Self::Inline { content }
    }
}
