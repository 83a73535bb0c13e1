// ruuvigate-api: Async client for the hub service (provisioning + device session)

pub mod error;
pub mod message;
pub mod provisioning;
pub mod session;
pub mod transport;

pub use error::Error;
pub use message::{MethodRequest, MethodResponse, TelemetryMessage};
pub use provisioning::{Assignment, ProvisioningClient, Registration};
pub use session::{HubSession, MethodRequests, session_url};
pub use transport::{TlsMode, TransportConfig};
