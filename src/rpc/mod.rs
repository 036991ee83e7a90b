//! gRPC surfaces towards sub-controllers: placement and action controllers,
//! the sync engine, and the readiness stream it publishes.

pub mod contextupdate;
pub mod controller;
pub mod pool;
pub mod readynotify;
pub mod sync;

pub use contextupdate::{ContextUpdateHandler, ContextUpdateService};
pub use controller::GrpcControllerInvoker;
pub use pool::RpcConnections;
pub use readynotify::{ReadyEvent, ReadySubscription};
pub use sync::RsyncClient;

/// Generated types for the sub-controller protocols.
#[allow(clippy::all)]
pub mod proto {
    pub mod contextupdate {
        #![doc(hidden)]
        tonic::include_proto!("contextupdate");
    }

    pub mod placementcontroller {
        #![doc(hidden)]
        tonic::include_proto!("placementcontroller");
    }

    pub mod installapp {
        #![doc(hidden)]
        tonic::include_proto!("installapp");
    }

    pub mod updateapp {
        #![doc(hidden)]
        tonic::include_proto!("updateapp");
    }

    pub mod readynotify {
        #![doc(hidden)]
        tonic::include_proto!("readynotify");
    }
}
