use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),
}
