//! 能力层：Capability 抽象、注册表、执行器、策略钩子与各能力提供方

pub mod executor;
pub mod noop_browser;
pub mod policy;
pub mod registry;
pub mod schema;

#[cfg(feature = "browser")]
pub mod browser;

pub use executor::Executor;
pub use noop_browser::{DryRunBrowser, DryRunSession};
pub use policy::{
    extract_domain, policy_from_config, AllOf, DenyActions, DomainAllowlist, Policy,
};
pub use registry::{
    Capability, CapabilityNotFound, CapabilityProvider, CapabilityRegistry, FnCapability,
};
pub use schema::{action_list_schema_json, finish_capability_spec, FinishTaskArgs};

#[cfg(feature = "browser")]
pub use browser::ChromeBrowser;
