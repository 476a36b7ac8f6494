use server_api::{auth::AuthConfig, ApiContext};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) auth: AuthConfig,
}
