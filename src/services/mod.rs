pub mod base_url;
pub mod cipher;
pub mod codegen;
pub mod credentials;
pub mod dispatcher;
pub mod history;
pub mod logger;
pub mod pins;
pub mod secret_store;
pub mod spec_loader;
pub mod spec_urls;
pub mod state;
