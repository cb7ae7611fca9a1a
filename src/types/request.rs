//! Classification request payload

use serde::Deserialize;

/// Form-encoded body of `POST /image`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyForm {
    /// Base64 (standard alphabet) encoded image
    #[serde(default)]
    pub img: Option<String>,
}
