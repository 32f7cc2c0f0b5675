#[derive(thiserror::Error, Debug)]
pub enum GitgateError {
    #[error("failed to parse URL: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("URL contains no host")]
    NoHostInUrl,
    #[error("$HOME is not set and no host key path was configured")]
    HomeUnknown,
}
