#![doc = include_str!("../README.md")]

pub mod backend;
pub mod channel;
pub mod communicator;
pub mod config;
pub mod delegate;
pub mod error;
pub mod pkce;
pub mod query;
pub mod registry;
pub mod resolver;
#[cfg(feature = "routes")]
pub mod routes;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use backend::HttpBackend;
pub use backend::{BackendConfig, ProviderAuthorization, RegistrationBackend};
pub use channel::{
    BridgeChannel, BridgeEndpoint, ChainAdapter, ConnectOptions, Ethereum, InjectedChannel,
    InjectedProvider, ProtocolDefinition, ProviderChannel, RpcRequest,
};
pub use communicator::{
    FrameMessage, OriginFrameCommunicator, PostMessageCommunicator, RedirectCommunicator,
    ResponseMessageCallbackArgument,
};
pub use config::{AuthSettings, ChainAuthConfig};
pub use delegate::{
    AuthenticationDelegate, ConfigurationSource, DelegateDeps, DelegatePhase, FlowOutcome,
};
pub use error::Error;
pub use query::{ConfigKey, QueryParam};
pub use registry::{CommunicatorRegistry, Registry, ResolverRegistry};
pub use resolver::{IdentityResolver, OAuthResolver, WalletResolver};
#[cfg(feature = "routes")]
pub use routes::auth_routes;
pub use storage::{FileStore, KeyValueStore, KeyValueStoreExt, MemoryStore};
pub use types::{
    AuthTokens, AuthenticationDelegateInitArgs, ProjectId, Session, UserIdentifier,
    UserRegistrationArgument,
};
