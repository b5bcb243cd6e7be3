pub mod address;
pub mod attachment;
pub mod config;
pub mod context;
pub mod directive;
pub mod error;
pub mod fetch;
pub mod inline;
pub mod mime;
pub mod multipart;
pub mod pipeline;
pub mod relay;
pub mod smtp;
pub mod template;
pub mod tls;
pub mod transport;

pub use address::*;
pub use attachment::*;
pub use config::*;
pub use context::*;
pub use directive::*;
pub use error::*;
pub use fetch::*;
pub use inline::*;
pub use mime::*;
pub use multipart::*;
pub use pipeline::*;
pub use relay::*;
pub use smtp::*;
pub use template::*;
pub use tls::*;
pub use transport::*;
