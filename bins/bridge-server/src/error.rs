#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] bridge_engine::EngineError),

    #[error("api server: {0}")]
    Api(#[from] bridge_api_server::ApiError),

    #[error("api server task: {0}")]
    ApiTask(#[from] tokio::task::JoinError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
