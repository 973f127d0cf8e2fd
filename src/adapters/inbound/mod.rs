mod agent_api;
mod dns_server;
mod event_api;

pub use agent_api::{AgentApi, AgentState, CommandRequest, CommandStatus};
pub use dns_server::{to_records, DnsHandler, DnsServer, Resolution};
pub use event_api::{EventApi, EventState, EventTimeouts};
