pub mod http;
pub mod realtime;
pub mod store;
pub mod traits;
pub mod web;

pub use http::{HttpPageRenderer, HttpTransport};
pub use realtime::WsConnector;
pub use store::{StoreKind, TcpStoreProbe};
pub use traits::{
    ChannelConnector, PageRenderer, RealtimeChannel, ReachabilityProbe, RenderedPage, Response,
    Transport, TransportRequest, SENTINEL_STATUS,
};
