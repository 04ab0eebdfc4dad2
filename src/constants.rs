pub mod network {
    pub const TIMEOUT_BRIDGE_CALL_MS: u64 = 10_000;
    pub const TIMEOUT_BRIDGE_LONG_CALL_MS: u64 = 120_000;
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_SPEC_FETCH_MS: u64 = 15_000;
}

pub mod history {
    pub const DEFAULT_LIMIT: usize = 10;
}

pub mod buffers {
    pub const CRYPTO_KEY_SIZE: usize = 32;
    pub const CRYPTO_IV_SIZE: usize = 12;
    pub const CRYPTO_TAG_SIZE: usize = 16;
}

pub mod localhost {
    pub const NAMES: &[&str] = &["localhost", "127.0.0.1"];
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http:", "https:"];
}

pub mod keys {
    pub const SPEC_URLS: &str = "callsign.specUrls";
    pub const CREDENTIALS: &str = "auth.credentials";
    pub const REQUEST_HISTORY: &str = "callsign.requestHistory";
    pub const HISTORY_LIMIT: &str = "callsign.historyLimit";
    pub const CACHED_SPEC: &str = "callsign.cachedSpec";
    pub const LAST_SELECTED_SPEC_URL: &str = "callsign.lastSelectedSpecUrl";
    pub const PINNED_ROUTES: &str = "callsign.pinnedRoutes";
    pub const SELECTED_ROUTE: &str = "callsign.selectedRoute";
}

pub mod codegen {
    pub const TYPESCRIPT_CODEGEN: &str = "openapi-typescript-codegen";
    pub const OPENAPI_GENERATOR_CLI: &str = "@openapitools/openapi-generator-cli";
    pub const OPENAPI_GENERATOR_IMAGE: &str = "openapitools/openapi-generator-cli:latest";
}
