//! JSON output formats.

use serde::Serialize;

#[derive(Serialize)]
pub struct FingerprintJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub key: String,
    pub fingerprint: String,
}

/// Setup failure: the `{ok, error}` fields of a verification result plus the
/// error's cause chain.
#[derive(Serialize)]
pub struct ErrorJson {
    pub ok: bool,
    pub error: String,
    pub causes: Vec<String>,
}
