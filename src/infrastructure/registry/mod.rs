mod http;

pub use http::HttpRegistryNotifier;
