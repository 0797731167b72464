pub mod dispatcher;
pub mod failover;
pub mod host;
pub mod owner_cache;
pub mod owner_resolver;
pub mod process_id;
pub mod selector;

pub use dispatcher::{DispatchError, RequestDispatcher};
pub use failover::{BufferedRequest, Dispatched, FailoverError, FailoverExecutor};
pub use host::{Host, HostError, HostPool, HostUrl};
pub use owner_cache::{NoopOwnerCache, TtlOwnerCache};
pub use owner_resolver::{OwnerResolver, RouteDecision, SubrouterPolicy};
pub use process_id::{ProcessId, ProcessIdExtractor};
pub use selector::{CandidateSequence, DeterministicSelector};
